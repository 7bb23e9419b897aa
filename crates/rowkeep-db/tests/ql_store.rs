//! Relational store behaviour against the in-process connection.
//!
//! Every test binds a [`QlDataStore`] over a [`MemoryConnection`] and asserts
//! on the statements the store produced as well as on the resulting rows.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use rowkeep_core::{
    Collection, DalError, Entity, Operation, Predicate, PropertyDef, Schema, SelectQuery,
    StoreRegistry,
};
use rowkeep_db::{MemoryConnection, QlConnection, QlDataStore};
use rowkeep_types::{StorageType, Value};

fn user_schema() -> Arc<Schema> {
    Schema::builder("User")
        .table("users")
        .property(PropertyDef::new("id").with_storage(StorageType::Integer))
        .property(PropertyDef::new("name").with_storage(StorageType::String))
        .property(PropertyDef::new("email").with_storage(StorageType::String))
        .auto_increment("id")
        .build()
        .expect("valid schema")
}

fn post_schema() -> Arc<Schema> {
    Schema::builder("Post")
        .table("posts")
        .property(PropertyDef::new("id").with_storage(StorageType::Integer))
        .property(PropertyDef::new("title").with_storage(StorageType::String))
        .property(PropertyDef::counter("views"))
        .build()
        .expect("valid schema")
}

fn setup() -> (Arc<MemoryConnection>, StoreRegistry) {
    let conn = Arc::new(MemoryConnection::new());
    let connection: Arc<dyn QlConnection> = conn.clone();
    let registry = StoreRegistry::new();
    registry.add_store("default", Arc::new(QlDataStore::new(connection)));
    (conn, registry)
}

fn texts(conn: &MemoryConnection) -> Vec<String> {
    conn.executed().into_iter().map(|q| q.text).collect()
}

async fn saved_user(registry: &StoreRegistry, name: &str) -> Entity {
    let mut user = Entity::new(&user_schema());
    user.set("name", name).unwrap();
    user.save(registry).await.expect("save user");
    user
}

#[tokio::test]
async fn new_entity_is_inserted_and_reads_back_generated_id() {
    let (conn, registry) = setup();
    let mut user = Entity::new(&user_schema());
    user.set("name", "Brooke").unwrap();

    user.save(&registry).await.unwrap();

    let query = conn.last_query().unwrap();
    assert_eq!(
        query.text,
        r#"INSERT INTO "users" ("name", "email") VALUES ($1, NULL)"#
    );
    assert_eq!(query.values, [Value::from("Brooke")]);
    assert_eq!(user.get("id").unwrap(), &Value::Int(1));
    assert!(user.is_loaded());
    assert!(!user.is_dirty());

    let second = saved_user(&registry, "Ari").await;
    assert_eq!(second.get("id").unwrap(), &Value::Int(2));
}

#[tokio::test]
async fn loaded_entity_updates_changed_columns_only() {
    let (conn, registry) = setup();
    let mut user = saved_user(&registry, "Brooke").await;
    conn.clear_log();

    user.set("email", "nobody@example.com").unwrap();
    user.save(&registry).await.unwrap();

    let query = conn.last_query().unwrap();
    assert_eq!(query.text, r#"UPDATE "users" SET "email" = $1 WHERE "id" = $2"#);
    assert_eq!(query.values, [Value::from("nobody@example.com"), Value::Int(1)]);
    assert_eq!(
        conn.rows("users")[0].get("email"),
        Some(&Value::from("nobody@example.com"))
    );
}

#[tokio::test]
async fn saving_an_unchanged_entity_runs_nothing() {
    let (conn, registry) = setup();
    let mut user = saved_user(&registry, "Brooke").await;
    conn.clear_log();

    user.save(&registry).await.unwrap();
    user.set("name", "Brooke").unwrap();
    user.save(&registry).await.unwrap();

    assert!(conn.executed().is_empty());
}

#[tokio::test]
async fn load_by_id_hydrates_a_clean_entity() {
    let (conn, registry) = setup();
    saved_user(&registry, "Brooke").await;
    conn.clear_log();

    let user = Entity::load_by_id(&user_schema(), &registry, 1).await.unwrap();

    assert_eq!(
        texts(&conn),
        [r#"SELECT * FROM "users" WHERE "id" = $1 LIMIT 2"#]
    );
    assert_eq!(user.get("name").unwrap(), &Value::from("Brooke"));
    assert!(user.is_loaded());
    assert!(user.changes().is_empty());
}

#[tokio::test]
async fn load_of_a_missing_row_is_not_found() {
    let (_conn, registry) = setup();

    let err = Entity::load_by_id(&user_schema(), &registry, 42)
        .await
        .unwrap_err();

    assert!(matches!(err, DalError::NotFound { ref entity, ref id } if entity == "User" && id == "42"));
}

#[tokio::test]
async fn delete_reports_affected_rows_and_exists_follows() {
    let (conn, registry) = setup();
    let user = saved_user(&registry, "Brooke").await;
    assert!(user.exists(&registry).await.unwrap());
    assert_eq!(
        conn.last_query().unwrap().text,
        r#"SELECT "id" FROM "users" WHERE "id" = $1 LIMIT 1"#
    );

    assert_eq!(user.delete(&registry).await.unwrap(), 1);
    assert_eq!(
        conn.last_query().unwrap().text,
        r#"DELETE FROM "users" WHERE "id" = $1"#
    );
    assert_eq!(user.delete(&registry).await.unwrap(), 0);
    assert!(!user.exists(&registry).await.unwrap());
}

#[tokio::test]
async fn store_failures_carry_operation_and_entity() {
    let (conn, registry) = setup();
    conn.fail_after(0);
    let mut user = Entity::new(&user_schema());
    user.set("name", "Brooke").unwrap();

    let err = user.save(&registry).await.unwrap_err();

    assert!(matches!(
        &err,
        DalError::Context { operation: Operation::Save, entity, .. } if entity == "User"
    ));
    assert!(err.is_execution());
    assert!(!user.is_loaded());
    assert!(user.is_dirty());
}

#[tokio::test]
async fn unbound_store_name_is_reported() {
    let (_conn, registry) = setup();
    let mut user = Entity::new(&user_schema());
    user.set_store_name("archive");

    let err = user.save(&registry).await.unwrap_err();

    assert!(matches!(err, DalError::StoreNotFound(name) if name == "archive"));
}

#[tokio::test]
async fn entities_can_move_between_stores() {
    let (_conn, registry) = setup();
    let archive = Arc::new(MemoryConnection::new());
    let archive_connection: Arc<dyn QlConnection> = archive.clone();
    registry.add_store("archive", Arc::new(QlDataStore::new(archive_connection)));

    let mut user = saved_user(&registry, "Brooke").await;
    let mut copy = Entity::new(&user_schema());
    copy.set_store_name("archive")
        .hydrate(&user.property_data(), false);
    copy.save(&registry).await.unwrap();

    assert_eq!(archive.rows("users").len(), 1);
    assert_eq!(
        archive.rows("users")[0].get("name"),
        Some(&Value::from("Brooke"))
    );

    user.set("name", "changed").unwrap();
    user.save(&registry).await.unwrap();
    assert_eq!(
        archive.rows("users")[0].get("name"),
        Some(&Value::from("Brooke"))
    );
}

#[tokio::test]
async fn relational_counters_are_updated_by_delta() {
    let (conn, registry) = setup();
    let mut post = Entity::new(&post_schema());
    post.set("id", 7).unwrap().set("title", "hello").unwrap();
    post.counter_mut("views").unwrap().increment(3);

    post.save(&registry).await.unwrap();

    assert_eq!(
        texts(&conn),
        [
            r#"INSERT INTO "posts" ("id", "title", "views") VALUES ($1, $2, $3)"#,
            r#"UPDATE "posts" SET "views" = "views" + 3 WHERE "id" = $1"#,
        ]
    );
    assert_eq!(
        conn.executed()[0].values,
        [Value::Int(7), Value::from("hello"), Value::Int(0)]
    );
    assert_eq!(post.counter("views").unwrap().pending(), 0);
    assert_eq!(conn.rows("posts")[0].get("views"), Some(&Value::Int(3)));

    let reloaded = Entity::load_by_id(&post_schema(), &registry, 7).await.unwrap();
    assert_eq!(reloaded.counter("views").unwrap().calculated(), 3);
}

#[tokio::test]
async fn get_data_returns_projected_rows() {
    let (_conn, registry) = setup();
    saved_user(&registry, "Brooke").await;
    saved_user(&registry, "Ari").await;

    let store = registry.resolve("default").unwrap();
    let rows = store
        .get_data(
            &SelectQuery::new("users")
                .columns(["name"])
                .filter(Predicate::gt("id", 1)),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Ari")));
    assert!(rows[0].get("id").is_none());
}

#[tokio::test]
async fn collections_hydrate_loaded_entities() {
    let (_conn, registry) = setup();
    for name in ["Brooke", "Ari", "Brooke"] {
        saved_user(&registry, name).await;
    }

    let named = Collection::new(&user_schema()).filter(Predicate::eq("name", "Brooke"));
    assert_eq!(named.count(&registry).await.unwrap(), 2);

    let users = named.to_vec(&registry).await.unwrap();
    assert!(users.iter().all(|u| u.is_loaded() && !u.is_dirty()));
    assert_eq!(users[1].get("id").unwrap(), &Value::Int(3));

    let second = Collection::new(&user_schema())
        .where_id(2)
        .first(&registry)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.get("name").unwrap(), &Value::from("Ari"));

    let nobody = Collection::new(&user_schema())
        .where_id(9)
        .first(&registry)
        .await
        .unwrap();
    assert!(nobody.is_none());
}
