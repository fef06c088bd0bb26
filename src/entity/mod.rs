//! Entity type declarations, the handler registry and entity handles.
//!
//! An [`EntityType`] is the static field table of one root table, built from
//! an [`EntityTypeBuilder`] and validated against the primitive registry.
//! Handlers are registered on the type and invoked with the affected
//! [`Entity`].

mod entity_type;
mod field;
mod handle;
mod handlers;
pub use entity_type::*;
pub use field::*;
pub use handle::*;
pub use handlers::HandlerResult;
pub(crate) use handlers::*;
