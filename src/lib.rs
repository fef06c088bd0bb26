//! Keeps typed in-process object graphs coherent with a relational database
//! and a key/value cache, across every process that shares them.
//!
//! Entity types are declared once with an [`EntityTypeBuilder`] and
//! registered on a [`SyncEngine`]. Reads are served from the engine's value
//! cache; writes update the cache immediately and reach the stores through
//! per-row ordered queues. Changes made by other processes arrive as
//! database trigger notifications and key-space events and are applied to
//! the cache before the registered handlers run.

pub mod cache;
pub mod cascade;
pub mod config;
pub mod engine;
pub mod entity;
mod errors;
pub mod key;
pub mod listener;
pub mod metrics;
pub mod primitives;
pub mod schema;
pub mod store;
pub mod value;
pub mod write_path;

pub use cascade::DeleteStrategy;
pub use cascade::InsertStrategy;
pub use config::SyncConfig;
pub use engine::InsertBuilder;
pub use engine::SyncEngine;
pub use engine::SyncEngineBuilder;
pub use entity::Entity;
pub use entity::EntityType;
pub use entity::EntityTypeBuilder;
pub use entity::HandlerResult;
pub use errors::*;
pub use key::TableRef;
pub use primitives::Primitive;
pub use primitives::PrimitiveRegistry;
pub use primitives::PrimitiveType;
pub use primitives::Value;
pub use store::CacheStore;
pub use store::RelationalStore;
pub use write_path::InsertMode;
pub use write_path::UpdateInterval;
pub use write_path::WriteMode;

#[cfg(test)]
mod errors_test;

//-----------------------------------------------------------
// Test utils

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
