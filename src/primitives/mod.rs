//! Primitive value types and their canonical text codecs.
//!
//! Every persisted scalar passes through the [`PrimitiveRegistry`] on its way
//! to and from the stores. Typed field handles convert through the
//! [`Primitive`] trait; non-primitive application types plug in through a
//! [`ValueSerializer`].

mod registry;
mod serializer;
mod value;

pub use registry::*;
pub use serializer::*;
pub use value::*;

#[cfg(test)]
mod registry_test;
