mod common;

use common::MockExecutor;
use qorm::{table, Fields, OrmError, Record, UpsertOutcome, Value};

fn users() -> Vec<Record> {
    vec![
        Record::from([("id", Value::Int(1)), ("name", Value::from("ann")), ("age", Value::Int(31))]),
        Record::from([("id", Value::Int(2)), ("name", Value::from("bob")), ("age", Value::Int(17))]),
        Record::from([("id", Value::Int(3)), ("name", Value::from("cy")), ("age", Value::Int(45))]),
    ]
}

#[tokio::test]
async fn update_or_insert_inserts_then_updates() {
    let conn = MockExecutor::new();
    let attributes = Fields::new().set("email", "a@x.io");

    let outcome = table("users")
        .update_or_insert(&conn, &attributes, &Fields::new().set("name", "A"))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Created);
    assert!(outcome.is_created());

    let outcome = table("users")
        .update_or_insert(&conn, &attributes, &Fields::new().set("name", "B"))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);

    let rows = conn.rows("users");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].try_get::<String>("name").unwrap(), "B");

    let statements = conn.statements();
    assert_eq!(
        statements[1],
        r#"INSERT INTO "users" ("email", "name") VALUES ($1, $2)"#
    );
    assert_eq!(
        statements[3],
        r#"UPDATE "users" SET "name" = $1 WHERE "email" = $2"#
    );
}

#[tokio::test]
async fn upsert_ignores_lookup_order_but_plain_update_refuses_it() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let outcome = table("users")
        .order_by_desc("age")
        .update_or_insert(&conn, &Fields::new().set("name", "bob"), &Fields::new().set("age", 18))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some(r#"UPDATE "users" SET "age" = $1 WHERE "name" = $2"#)
    );

    let before = conn.statements().len();
    let err = table("users")
        .order_by("age")
        .limit(1)
        .update(&conn, &Fields::new().set("age", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert_eq!(conn.statements().len(), before);
}

#[tokio::test]
async fn first_or_fail_reports_not_found() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let err = table("users")
        .where_("age", (">", 100))
        .first_or_fail(&conn)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let found = table("users").where_("age", (">", 40)).first_or_fail(&conn).await.unwrap();
    assert_eq!(found.try_get::<String>("name").unwrap(), "cy");
}

#[tokio::test]
#[should_panic(expected = "first_or_fail failed")]
async fn panicking_twin_panics() {
    let conn = MockExecutor::new();
    table("users").first_or_fail_or_panic(&conn).await;
}

#[tokio::test]
async fn find_is_scoped_to_the_caller_filters() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let q = table("users").where_("age", (">=", 18));
    assert!(q.find(&conn, 1).await.unwrap().is_some());
    assert!(q.find(&conn, 2).await.unwrap().is_none());
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some(r#"SELECT * FROM "users" WHERE "age" >= $1 AND "id" = $2 LIMIT 1"#)
    );
}

#[tokio::test]
async fn reads_and_aggregates() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let q = table("users").where_("age", (">=", 18));
    assert_eq!(q.count(&conn).await.unwrap(), 2);
    assert!(q.exists(&conn).await.unwrap());
    assert!(!table("users").where_("age", (">", 99)).exists(&conn).await.unwrap());

    let names = q.order_by_desc("age").pluck(&conn, "name").await.unwrap();
    assert_eq!(names, vec![Value::from("cy"), Value::from("ann")]);

    let name = table("users").where_("id", 2).value(&conn, "name").await.unwrap();
    assert_eq!(name, Some(Value::from("bob")));
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some(r#"SELECT "name" FROM "users" WHERE "id" = $1 LIMIT 1"#)
    );
}

#[tokio::test]
async fn create_reads_back_generated_key() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let created = table("users")
        .create(&conn, &Fields::new().set("name", "dee"))
        .await
        .unwrap();
    assert_eq!(created.try_get::<i64>("id").unwrap(), 4);
    assert_eq!(created.try_get::<String>("name").unwrap(), "dee");
    assert_eq!(
        conn.statements().last().map(String::as_str),
        Some(r#"INSERT INTO "users" ("name") VALUES ($1) RETURNING "id""#)
    );

    let id = table("users")
        .insert_get_id(&conn, &Fields::new().set("name", "eve"))
        .await
        .unwrap();
    assert_eq!(id, 5);
}

#[tokio::test]
async fn create_fails_without_a_reported_key() {
    let conn = MockExecutor::new().omit_generated_keys();

    let err = table("users")
        .create(&conn, &Fields::new().set("name", "dee"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Other(ref m) if m.contains("generated key")));

    let err = table("users")
        .insert_get_id(&conn, &Fields::new().set("name", "eve"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Other(_)));

    // An explicit key needs no read-back.
    let created = table("users")
        .create(&conn, &Fields::new().set("id", 9).set("name", "fay"))
        .await
        .unwrap();
    assert_eq!(created.try_get::<i64>("id").unwrap(), 9);
}

#[tokio::test]
async fn first_or_create_reuses_existing_row() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let found = table("users")
        .first_or_create(&conn, &Fields::new().set("name", "bob"), &Fields::new().set("age", 99))
        .await
        .unwrap();
    assert_eq!(found.try_get::<i64>("age").unwrap(), 17);
    assert_eq!(conn.rows("users").len(), 3);

    let created = table("users")
        .first_or_create(&conn, &Fields::new().set("name", "zed"), &Fields::new().set("age", 20))
        .await
        .unwrap();
    assert_eq!(created.try_get::<i64>("age").unwrap(), 20);
    assert_eq!(conn.rows("users").len(), 4);
}

#[tokio::test]
async fn update_or_create_returns_merged_record() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let updated = table("users")
        .update_or_create(&conn, &Fields::new().set("name", "ann"), &Fields::new().set("age", 32))
        .await
        .unwrap();
    assert_eq!(updated.try_get::<i64>("id").unwrap(), 1);
    assert_eq!(updated.try_get::<i64>("age").unwrap(), 32);
    assert_eq!(conn.rows("users")[0].try_get::<i64>("age").unwrap(), 32);
}

#[tokio::test]
async fn insert_update_delete_counts() {
    let conn = MockExecutor::new();
    conn.seed("users", users());

    let inserted = table("users")
        .insert(
            &conn,
            &[
                Fields::new().set("name", "f").set("age", 1),
                Fields::new().set("name", "g").set("age", 2),
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let updated = table("users")
        .where_("age", ("<", 18))
        .update(&conn, &Fields::new().set("age", 18))
        .await
        .unwrap();
    assert_eq!(updated, 3);

    let deleted = table("users").where_("age", 18).delete(&conn).await.unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(conn.rows("users").len(), 2);

    // No WHERE removes everything.
    assert_eq!(table("users").delete(&conn).await.unwrap(), 2);
    assert!(conn.rows("users").is_empty());
}

#[tokio::test]
async fn compile_errors_never_reach_the_executor() {
    let conn = MockExecutor::new();
    let err = table("users").where_("id", vec![1, 2]).get(&conn).await.unwrap_err();
    assert!(matches!(err, OrmError::MalformedPredicate { .. }));

    let err = table("users").update(&conn, &Fields::new()).await.unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert!(conn.statements().is_empty());
}
