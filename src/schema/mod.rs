//! Relational schema plumbing: change trigger DDL and the per-table column
//! cache.

mod schema_cache;
mod trigger;
pub use schema_cache::*;
pub use trigger::*;
#[cfg(test)]
mod schema_cache_test;
