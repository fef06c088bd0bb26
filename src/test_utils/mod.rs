//! In-memory stores shared by unit tests and downstream integration tests.
#[cfg(test)]
mod fixture;
mod memory_cache;
mod memory_database;

#[cfg(test)]
pub(crate) use fixture::*;
pub use memory_cache::*;
pub use memory_database::*;

use crate::key::TableRef;

/// Table in the `public` schema.
pub fn table(name: &str) -> TableRef {
    TableRef::new("public", name)
}
