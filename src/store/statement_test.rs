use super::*;
use crate::key::TableRef;

fn users() -> TableRef {
    TableRef::new("public", "users")
}

#[test]
fn test_update_renders_assignments_before_filter() {
    let stmt = Statement::Update {
        table: users(),
        assignments: vec![("name".into(), Some("Bo".into()))],
        filter: Filter::eq("id", "u1"),
    };
    let (sql, params) = stmt.to_sql();
    assert_eq!(sql, r#"UPDATE "public"."users" SET "name" = $1 WHERE "id" = $2"#);
    assert_eq!(params, vec![Some("Bo".to_string()), Some("u1".to_string())]);
}

#[test]
fn test_insert_on_conflict_variants() {
    let values = vec![("id".to_string(), Some("u1".to_string())), ("name".to_string(), None)];

    let (sql, params) = Statement::Insert {
        table: users(),
        values: values.clone(),
        on_conflict: OnConflict::Fail,
    }
    .to_sql();
    assert_eq!(sql, r#"INSERT INTO "public"."users" ("id", "name") VALUES ($1, $2)"#);
    assert_eq!(params, vec![Some("u1".to_string()), None]);

    let (sql, _) = Statement::Insert {
        table: users(),
        values: values.clone(),
        on_conflict: OnConflict::DoNothing {
            target: vec!["id".into()],
        },
    }
    .to_sql();
    assert!(sql.ends_with(r#"ON CONFLICT ("id") DO NOTHING"#));

    let (sql, _) = Statement::Insert {
        table: users(),
        values,
        on_conflict: OnConflict::DoUpdate {
            target: vec!["id".into()],
            columns: vec!["name".into()],
        },
    }
    .to_sql();
    assert!(sql.ends_with(r#"ON CONFLICT ("id") DO UPDATE SET "name" = EXCLUDED."name""#));
}

#[test]
fn test_delete_with_compound_filter() {
    let stmt = Statement::Delete {
        table: TableRef::new("public", "user_friends"),
        filter: Filter::eq("user_id", "u1").and("friend_id", "u2"),
    };
    let (sql, params) = stmt.to_sql();
    assert_eq!(
        sql,
        r#"DELETE FROM "public"."user_friends" WHERE "user_id" = $1 AND "friend_id" = $2"#
    );
    assert_eq!(params.len(), 2);
    assert_eq!(stmt.table().table, "user_friends");
}

#[test]
fn test_null_filter_renders_is_null() {
    let filter = Filter(vec![("owner".into(), None)]);
    let (sql, params) = Statement::Delete {
        table: users(),
        filter,
    }
    .to_sql();
    assert_eq!(sql, r#"DELETE FROM "public"."users" WHERE "owner" IS NULL"#);
    assert!(params.is_empty());
}

#[test]
fn test_select_projection_casts_to_text() {
    let (sql, params) = Select::by(&users(), Filter::eq("id", "u1"))
        .columns(vec!["name".into()])
        .to_sql();
    assert_eq!(
        sql,
        r#"SELECT "name"::text AS "name" FROM "public"."users" WHERE "id" = $1"#
    );
    assert_eq!(params, vec![Some("u1".to_string())]);

    let (sql, _) = Select::all(&users()).to_sql();
    assert_eq!(sql, r#"SELECT * FROM "public"."users""#);
}

#[test]
fn test_filter_matches_row_lookup() {
    let row: crate::store::Row = [
        ("id".to_string(), Some("u1".to_string())),
        ("owner".to_string(), None),
    ]
    .into_iter()
    .collect();

    assert!(Filter::eq("id", "u1").matches(|c| row.get(c)));
    assert!(!Filter::eq("id", "u2").matches(|c| row.get(c)));
    assert!(Filter(vec![("owner".into(), None)]).matches(|c| row.get(c)));
    assert!(Filter::default().matches(|c| row.get(c)));
}
