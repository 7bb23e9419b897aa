//! Integration tests against live `PostgreSQL` and `Dragonfly` services.
//!
//! Run with:
//!
//! ```bash
//! DATABASE_URL=postgresql://postgres@localhost:5432/rowkeep \
//! DRAGONFLY_URL=redis://localhost:6379 \
//!     cargo test -p rowkeep-db -- --ignored
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use rowkeep_core::{Collection, Entity, Predicate, PropertyDef, Schema, StoreRegistry};
use rowkeep_db::{
    CqlDataStore, DalConfig, DragonflyConnection, PostgresConnection, QlConnection, QlDataStore,
    register_stores,
};
use rowkeep_types::{StorageType, Value};
use sqlx::Connection;

fn postgres_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://postgres@localhost:5432/rowkeep".to_owned())
}

fn dragonfly_url() -> String {
    std::env::var("DRAGONFLY_URL").unwrap_or_else(|_| "redis://localhost:6379".to_owned())
}

/// Table name unique to one test run.
fn scratch_table(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

// =============================================================================
// PostgreSQL
// =============================================================================

async fn create_users_table(table: &str) {
    let mut conn = sqlx::PgConnection::connect(&postgres_url())
        .await
        .expect("Failed to connect to PostgreSQL -- is it running?");
    sqlx::query(&format!(
        "CREATE TABLE \"{table}\" (id BIGSERIAL PRIMARY KEY, name TEXT, email TEXT, visits BIGINT)"
    ))
    .execute(&mut conn)
    .await
    .expect("Failed to create table");
}

async fn drop_table(table: &str) {
    let mut conn = sqlx::PgConnection::connect(&postgres_url()).await.unwrap();
    sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
        .execute(&mut conn)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn postgres_entity_lifecycle() {
    let table = scratch_table("rk_users");
    create_users_table(&table).await;

    let schema = Schema::builder("User")
        .table(table.as_str())
        .property(PropertyDef::new("id").with_storage(StorageType::BigInteger))
        .property(PropertyDef::new("name").with_storage(StorageType::String))
        .property(PropertyDef::new("email").with_storage(StorageType::String))
        .property(PropertyDef::counter("visits"))
        .auto_increment("id")
        .build()
        .unwrap();

    let connection: Arc<dyn QlConnection> =
        Arc::new(PostgresConnection::from_url(&postgres_url()));
    let registry = StoreRegistry::new();
    registry.add_store("default", Arc::new(QlDataStore::new(Arc::clone(&connection))));

    let mut user = Entity::new(&schema);
    user.set("name", "Brooke").unwrap();
    user.counter_mut("visits").unwrap().increment(2);
    user.save(&registry).await.expect("insert");
    let id = user.get("id").unwrap().as_i64().expect("generated id");
    assert!(id > 0);

    user.set("email", "nobody@example.com").unwrap();
    user.save(&registry).await.expect("update");

    let loaded = Entity::load_by_id(&schema, &registry, id).await.expect("load");
    assert_eq!(loaded.get("email").unwrap(), &Value::from("nobody@example.com"));
    assert_eq!(loaded.counter("visits").unwrap().calculated(), 2);

    let found = Collection::new(&schema)
        .filter(Predicate::eq("name", "Brooke"))
        .count(&registry)
        .await
        .unwrap();
    assert_eq!(found, 1);

    assert_eq!(loaded.delete(&registry).await.unwrap(), 1);
    assert!(!loaded.exists(&registry).await.unwrap());

    connection.disconnect().await.unwrap();
    drop_table(&table).await;
}

#[tokio::test]
#[ignore = "requires live PostgreSQL instance"]
async fn postgres_statement_errors_are_execution_errors() {
    let schema = Schema::builder("Ghost")
        .table(scratch_table("rk_missing").as_str())
        .property(PropertyDef::new("id"))
        .build()
        .unwrap();
    let registry = StoreRegistry::new();
    registry.add_store(
        "default",
        Arc::new(QlDataStore::new(Arc::new(PostgresConnection::from_url(&postgres_url())))),
    );

    let err = Entity::load_by_id(&schema, &registry, 1).await.unwrap_err();
    assert!(err.is_execution(), "unexpected error: {err}");
}

// =============================================================================
// Dragonfly
// =============================================================================

#[tokio::test]
#[ignore = "requires live Dragonfly instance"]
async fn dragonfly_entity_lifecycle() {
    let table = scratch_table("rk_pages");
    let schema = Schema::builder("Page")
        .table(table.as_str())
        .property(PropertyDef::new("id").with_storage(StorageType::String))
        .property(PropertyDef::new("title").with_storage(StorageType::String))
        .property(PropertyDef::counter("views"))
        .build()
        .unwrap();

    let connection: Arc<dyn QlConnection> = Arc::new(DragonflyConnection::new(&dragonfly_url()));
    let registry = StoreRegistry::new();
    registry.add_store("default", Arc::new(CqlDataStore::new(Arc::clone(&connection))));

    let mut page = Entity::new(&schema);
    page.set("id", "home").unwrap().set("title", "Home").unwrap();
    page.counter_mut("views").unwrap().increment(5);
    page.set_ttl(Some(60));
    page.save(&registry).await.expect("insert");
    assert!(connection.is_connected().await);

    let mut loaded = Entity::load_by_id(&schema, &registry, "home").await.expect("load");
    assert_eq!(loaded.get("title").unwrap(), &Value::from("Home"));
    assert_eq!(loaded.counter("views").unwrap().calculated(), 5);

    loaded.counter_mut("views").unwrap().decrement(2);
    loaded.save(&registry).await.expect("counter update");
    let reloaded = Entity::load_by_id(&schema, &registry, "home").await.unwrap();
    assert_eq!(reloaded.counter("views").unwrap().calculated(), 3);

    let titles: Vec<Entity> = Collection::new(&schema)
        .filter(Predicate::eq("title", "Home"))
        .to_vec(&registry)
        .await
        .unwrap();
    assert_eq!(titles.len(), 1);

    assert_eq!(reloaded.delete(&registry).await.unwrap(), 1);
    assert!(!reloaded.exists(&registry).await.unwrap());

    connection.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore = "requires live PostgreSQL and Dragonfly instances"]
async fn configured_stores_register_and_connect() {
    let yaml = format!(
        "stores:\n  default:\n    kind: postgres\n    connection:\n      url: {}\n  hot:\n    kind: dragonfly\n    connection:\n      url: {}\n",
        postgres_url(),
        dragonfly_url()
    );
    let config = DalConfig::parse(&yaml).unwrap();
    let registry = StoreRegistry::new();

    let handles = register_stores(&registry, &config).await.unwrap();

    assert_eq!(registry.store_names(), ["default", "hot"]);
    for handle in &handles {
        assert!(handle.connection.is_connected().await, "{} not connected", handle.name);
        handle.connection.disconnect().await.unwrap();
    }
}
