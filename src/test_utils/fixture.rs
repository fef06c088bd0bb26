//! A small social schema shared by the engine tests.

use std::sync::Arc;
use std::time::Duration;

use super::table;
use super::MemoryCacheStore;
use super::MemoryDatabase;
use crate::cascade::DeleteStrategy;
use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::entity::EntityType;
use crate::entity::EntityTypeBuilder;
use crate::entity::Field;
use crate::entity::Link;
use crate::primitives::PrimitiveType;

pub(crate) fn social_database() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new();
    db.create_table(table("users"), &["id", "name", "age", "manager_id"], &[&["id"]]);
    db.create_table(table("profiles"), &["user_id", "bio"], &[&["user_id"]]);
    db.create_table(table("posts"), &["id", "author_id", "title"], &[&["id"]]);
    db.create_table(table("groups"), &["id", "title"], &[&["id"]]);
    db.create_table(
        table("memberships"),
        &["user_id", "group_id"],
        &[&["user_id", "group_id"]],
    );
    Arc::new(db)
}

/// user: scalar columns, a foreign bio, two cache-backed values, a manager
/// reference, posts (CASCADE) and groups (UNLINK).
pub(crate) fn user_type() -> EntityTypeBuilder {
    EntityType::builder("user", table("users"), "id")
        .column("name", PrimitiveType::Text)
        .column("age", PrimitiveType::Int32)
        .field(
            Field::foreign_column(
                "bio",
                PrimitiveType::Text,
                table("profiles"),
                Link::new("id", "user_id"),
            )
            .delete_strategy(DeleteStrategy::Cascade),
        )
        .field(Field::cached("online", PrimitiveType::Bool))
        .field(
            Field::cached("status", PrimitiveType::Text)
                .expire_after(Duration::from_secs(5))
                .fallback("offline"),
        )
        .field(Field::reference("manager", "user", Link::new("manager_id", "id")))
        .field(Field::one_to_many("posts", "post", "author_id").delete_strategy(DeleteStrategy::Cascade))
        .field(
            Field::many_to_many("groups", "group", table("memberships"), "user_id", "group_id")
                .delete_strategy(DeleteStrategy::Unlink),
        )
}

pub(crate) fn post_type() -> EntityTypeBuilder {
    EntityType::builder("post", table("posts"), "id")
        .column("title", PrimitiveType::Text)
        .field(Field::reference("author", "user", Link::new("author_id", "id")))
}

pub(crate) fn group_type() -> EntityTypeBuilder {
    EntityType::builder("group", table("groups"), "id")
        .column("title", PrimitiveType::Text)
        .field(Field::many_to_many("members", "user", table("memberships"), "group_id", "user_id"))
}

/// Builds an engine with a fixed origin and registers the social types,
/// without starting the listeners.
pub(crate) async fn social_engine(
    db: Arc<MemoryDatabase>,
    cache: Arc<MemoryCacheStore>,
    origin: &str,
) -> SyncEngine {
    let config = SyncConfig {
        origin_tag: Some(origin.to_string()),
        ..SyncConfig::default()
    };
    let engine = SyncEngine::builder(db, cache).config(config).build().unwrap();
    engine.register(user_type()).await.unwrap();
    engine.register(post_type()).await.unwrap();
    engine.register(group_type()).await.unwrap();
    engine
}
