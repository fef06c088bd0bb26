use std::collections::HashMap;
use std::sync::Arc;

use super::*;
use crate::entity::EntityType;
use crate::entity::EntityTypeBuilder;
use crate::entity::Field;
use crate::entity::Link;
use crate::key::TableRef;
use crate::listener::Operation;
use crate::primitives::PrimitiveRegistry;
use crate::primitives::PrimitiveType;
use crate::store::Filter;
use crate::store::OnConflict;
use crate::store::Row;
use crate::store::Statement;
use crate::test_utils::MemoryDatabase;

fn table(name: &str) -> TableRef {
    TableRef::new("public", name)
}

fn row(values: &[(&str, Option<&str>)]) -> Row {
    values
        .iter()
        .map(|(c, v)| (c.to_string(), v.map(str::to_string)))
        .collect()
}

fn insert(
    db: &MemoryDatabase,
    name: &str,
    values: &[(&str, Option<&str>)],
) {
    db.apply_external(vec![Statement::Insert {
        table: table(name),
        values: values
            .iter()
            .map(|(c, v)| (c.to_string(), v.map(str::to_string)))
            .collect(),
        on_conflict: OnConflict::Fail,
    }])
    .unwrap();
}

fn delete(
    name: &str,
    column: &str,
    id: &str,
) -> Statement {
    Statement::Delete {
        table: table(name),
        filter: Filter::eq(column, id),
    }
}

fn types(builders: Vec<EntityTypeBuilder>) -> HashMap<String, Arc<EntityType>> {
    let registry = PrimitiveRegistry::with_defaults();
    builders
        .into_iter()
        .map(|b| {
            let ty = b.build(&registry).unwrap();
            (ty.name().to_string(), Arc::new(ty))
        })
        .collect()
}

/// user -> posts (CASCADE) -> comments (CASCADE); user bio in profiles
/// (CASCADE); user groups through memberships (UNLINK).
fn blog() -> (MemoryDatabase, HashMap<String, Arc<EntityType>>) {
    let db = MemoryDatabase::new();
    db.create_table(table("users"), &["id", "name"], &[&["id"]]);
    db.create_table(table("profiles"), &["user_id", "bio"], &[&["user_id"]]);
    db.create_table(table("posts"), &["id", "author_id", "title"], &[&["id"]]);
    db.create_table(table("comments"), &["id", "post_id"], &[&["id"]]);
    db.create_table(table("memberships"), &["user_id", "group_id"], &[&["user_id", "group_id"]]);

    insert(&db, "users", &[("id", Some("u1")), ("name", Some("Ann"))]);
    insert(&db, "profiles", &[("user_id", Some("u1")), ("bio", Some("hi"))]);
    insert(&db, "posts", &[("id", Some("p1")), ("author_id", Some("u1")), ("title", Some("t"))]);
    insert(&db, "comments", &[("id", Some("c1")), ("post_id", Some("p1"))]);
    insert(&db, "memberships", &[("user_id", Some("u1")), ("group_id", Some("g1"))]);

    let types = types(vec![
        EntityType::builder("user", table("users"), "id")
            .column("name", PrimitiveType::Text)
            .field(
                Field::foreign_column("bio", PrimitiveType::Text, table("profiles"), Link::new("id", "user_id"))
                    .delete_strategy(DeleteStrategy::Cascade),
            )
            .field(Field::cached("online", PrimitiveType::Bool))
            .field(Field::one_to_many("posts", "post", "author_id").delete_strategy(DeleteStrategy::Cascade))
            .field(
                Field::many_to_many("groups", "group", table("memberships"), "user_id", "group_id")
                    .delete_strategy(DeleteStrategy::Unlink),
            ),
        EntityType::builder("post", table("posts"), "id")
            .column("title", PrimitiveType::Text)
            .field(Field::one_to_many("comments", "comment", "post_id").delete_strategy(DeleteStrategy::Cascade)),
        EntityType::builder("comment", table("comments"), "id"),
    ]);
    (db, types)
}

#[tokio::test]
async fn test_cascade_deletes_link_rows_first_and_deepest_roots_first() {
    let (db, types) = blog();
    let user = &types["user"];
    let plan = CascadePlanner::new(&types, &db, "me", "ns")
        .plan_delete(user, "u1", true)
        .await
        .unwrap();

    assert_eq!(
        plan.statements,
        vec![
            delete("profiles", "user_id", "u1"),
            delete("memberships", "user_id", "u1"),
            delete("comments", "id", "c1"),
            delete("posts", "id", "p1"),
            delete("users", "id", "u1"),
        ]
    );

    let online = user.field("online").unwrap();
    assert_eq!(plan.cache_deletes, vec![user.cache_key(online, "u1").to_wire("ns")]);

    assert_eq!(plan.notifications.len(), 5);
    assert!(plan
        .notifications
        .iter()
        .all(|n| n.operation == Operation::Delete && n.origin == "me"));
    let root = plan.notifications.last().unwrap();
    assert_eq!(root.old, row(&[("id", Some("u1")), ("name", Some("Ann"))]));
}

#[tokio::test]
async fn test_external_cascade_skips_root() {
    let (db, types) = blog();
    db.apply_external(vec![delete("users", "id", "u1")]).unwrap();

    let plan = CascadePlanner::new(&types, &db, "me", "ns")
        .plan_delete(&types["user"], "u1", false)
        .await
        .unwrap();

    assert!(!plan.statements.contains(&delete("users", "id", "u1")));
    assert!(plan.statements.contains(&delete("posts", "id", "p1")));
    assert!(plan.statements.contains(&delete("comments", "id", "c1")));
    assert_eq!(plan.cache_deletes.len(), 1);
}

#[tokio::test]
async fn test_no_action_leaves_dependents() {
    let db = MemoryDatabase::new();
    db.create_table(table("blogs"), &["id"], &[&["id"]]);
    db.create_table(table("posts"), &["id", "blog_id"], &[&["id"]]);
    insert(&db, "blogs", &[("id", Some("b1"))]);
    insert(&db, "posts", &[("id", Some("p1")), ("blog_id", Some("b1"))]);
    let types = types(vec![
        EntityType::builder("blog", table("blogs"), "id").field(Field::one_to_many("posts", "post", "blog_id")),
        EntityType::builder("post", table("posts"), "id"),
    ]);

    let plan = CascadePlanner::new(&types, &db, "me", "ns")
        .plan_delete(&types["blog"], "b1", true)
        .await
        .unwrap();
    assert_eq!(plan.statements, vec![delete("blogs", "id", "b1")]);
}

#[tokio::test]
async fn test_unlink_nulls_linking_column() {
    let db = MemoryDatabase::new();
    db.create_table(table("teams"), &["id"], &[&["id"]]);
    db.create_table(table("members"), &["id", "team_id"], &[&["id"]]);
    insert(&db, "teams", &[("id", Some("t1"))]);
    insert(&db, "members", &[("id", Some("m1")), ("team_id", Some("t1"))]);
    let types = types(vec![
        EntityType::builder("team", table("teams"), "id")
            .field(Field::one_to_many("members", "member", "team_id").delete_strategy(DeleteStrategy::Unlink)),
        EntityType::builder("member", table("members"), "id"),
    ]);

    let plan = CascadePlanner::new(&types, &db, "me", "ns")
        .plan_delete(&types["team"], "t1", true)
        .await
        .unwrap();

    assert_eq!(
        plan.statements,
        vec![
            Statement::Update {
                table: table("members"),
                assignments: vec![("team_id".to_string(), None)],
                filter: Filter::eq("team_id", "t1"),
            },
            delete("teams", "id", "t1"),
        ]
    );
    let unlink = &plan.notifications[0];
    assert_eq!(unlink.operation, Operation::Update);
    assert_eq!(unlink.old["team_id"], Some("t1".to_string()));
    assert_eq!(unlink.new["team_id"], None);
}

#[tokio::test]
async fn test_cyclic_graph_terminates() {
    let db = MemoryDatabase::new();
    db.create_table(table("people"), &["id"], &[&["id"]]);
    db.create_table(table("friendships"), &["a", "b"], &[&["a", "b"]]);
    insert(&db, "people", &[("id", Some("p1"))]);
    insert(&db, "people", &[("id", Some("p2"))]);
    insert(&db, "friendships", &[("a", Some("p1")), ("b", Some("p2"))]);
    insert(&db, "friendships", &[("a", Some("p2")), ("b", Some("p1"))]);
    let types = types(vec![EntityType::builder("person", table("people"), "id").field(
        Field::many_to_many("friends", "person", table("friendships"), "a", "b")
            .delete_strategy(DeleteStrategy::Cascade),
    )]);

    let plan = CascadePlanner::new(&types, &db, "me", "ns")
        .plan_delete(&types["person"], "p1", true)
        .await
        .unwrap();

    assert_eq!(
        plan.statements,
        vec![
            delete("friendships", "a", "p1"),
            delete("friendships", "a", "p2"),
            delete("people", "id", "p2"),
            delete("people", "id", "p1"),
        ]
    );
}

#[tokio::test]
async fn test_missing_dependent_is_skipped() {
    let db = MemoryDatabase::new();
    db.create_table(table("people"), &["id"], &[&["id"]]);
    db.create_table(table("friendships"), &["a", "b"], &[&["a", "b"]]);
    insert(&db, "people", &[("id", Some("p1"))]);
    insert(&db, "friendships", &[("a", Some("p1")), ("b", Some("gone"))]);
    let types = types(vec![EntityType::builder("person", table("people"), "id").field(
        Field::many_to_many("friends", "person", table("friendships"), "a", "b")
            .delete_strategy(DeleteStrategy::Cascade),
    )]);

    let plan = CascadePlanner::new(&types, &db, "me", "ns")
        .plan_delete(&types["person"], "p1", true)
        .await
        .unwrap();
    assert_eq!(
        plan.statements,
        vec![delete("friendships", "a", "p1"), delete("people", "id", "p1")]
    );
}
