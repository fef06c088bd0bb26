//! Process-local value cache.
//!
//! The single source of truth for every `get()` on a field handle. Writers
//! are the two listeners (remote changes) and local `set()` calls (optimistic
//! apply before the write path confirms). All mutation is key-level
//! upsert/replace on one concurrent map, so per-key last-writer-wins holds
//! without a lock per key.

mod value_cache;

pub use value_cache::*;

#[cfg(test)]
mod value_cache_test;
