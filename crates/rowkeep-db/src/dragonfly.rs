//! `Dragonfly` (Redis-compatible) column-family connection.
//!
//! Statements are interpreted directly rather than sent as text. Each table
//! maps onto plain keys:
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{table}:row:[k1,k2]` | Hash | One row, each field a JSON-encoded value |
//! | `{table}:rows` | Set | Keys of the rows written to the table |
//! | `{table}:seq` | Integer | Last generated identity value |
//!
//! Row keys carry the identity as a JSON array, so identity values never
//! collide with each other or with the table's `rows` and `seq` keys.
//!
//! Row TTLs become key expirations, and counter deltas become `HINCRBY`.
//! Write timestamps are not supported and are dropped.

use std::collections::HashMap;

use async_trait::async_trait;
use fred::prelude::{
    Builder, Client, ClientLike, Config, HashesInterface, KeysInterface, SetsInterface,
};
use rowkeep_core::SelectQuery;
use rowkeep_types::{Row, Value};
use tokio::sync::Mutex;

use crate::config::ConnectionConfig;
use crate::connection::QlConnection;
use crate::error::DbError;
use crate::statement::{Assignment, Delete, Insert, Query, Statement, Update, WriteOptions};

/// URL used when the configuration names none.
const DEFAULT_URL: &str = "redis://127.0.0.1:6379";

/// Connection to a `Dragonfly` instance.
pub struct DragonflyConnection {
    url: String,
    client: Mutex<Option<Client>>,
    last_insert_id: Mutex<Option<Value>>,
}

impl DragonflyConnection {
    /// Create a connection to `url`; nothing is opened until first use.
    ///
    /// The URL follows the Redis scheme: `redis://host:port` or
    /// `redis://host:port/db`.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            client: Mutex::new(None),
            last_insert_id: Mutex::new(None),
        }
    }

    /// Build a connection from settings: `url`, else `hostname` and `port`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if `port` is not a number.
    pub fn from_settings(settings: &ConnectionConfig) -> Result<Self, DbError> {
        let url = match (settings.get_str("url"), settings.get_str("hostname")) {
            (Some(url), _) => url.to_owned(),
            (None, Some(host)) => {
                format!("redis://{host}:{}", settings.get_u16("port")?.unwrap_or(6379))
            }
            (None, None) => DEFAULT_URL.to_owned(),
        };
        Ok(Self::new(&url))
    }

    /// The URL this connection opens.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The open client, connecting first when needed.
    async fn client(&self) -> Result<Client, DbError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let config = Config::from_url(&self.url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;
        let client = Builder::from_config(config).build()?;
        client.init().await?;
        tracing::info!(url = %self.url, "Connected to Dragonfly");
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn insert(&self, client: &Client, insert: &Insert) -> Result<u64, DbError> {
        let mut row: Row = insert
            .columns
            .iter()
            .cloned()
            .zip(insert.values.iter().cloned())
            .collect();

        for column in &insert.key_columns {
            if !row.contains_key(column) {
                let next: i64 = client.incr(sequence_key(&insert.table)).await?;
                row.insert(column.clone(), Value::Int(next));
                *self.last_insert_id.lock().await = Some(Value::Int(next));
            }
        }

        let key = row_key(
            &insert.table,
            insert.key_columns.iter().filter_map(|c| row.get(c)),
        );
        let fields = encode_fields(row.iter())?;
        if !fields.is_empty() {
            let _: i64 = client.hset(key.as_str(), fields).await?;
        }
        let _: i64 = client.sadd(index_key(&insert.table), key.as_str()).await?;
        if insert.options.ttl.is_none() {
            let _: bool = client.persist(key.as_str()).await?;
        }
        apply_options(client, &key, insert.options).await?;
        Ok(1)
    }
}

impl std::fmt::Debug for DragonflyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DragonflyConnection")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Key of the row with the given identity values.
fn row_key<'a>(table: &str, values: impl IntoIterator<Item = &'a Value>) -> String {
    let identity = serde_json::Value::Array(values.into_iter().map(Value::to_json).collect());
    format!("{table}:row:{identity}")
}

fn index_key(table: &str) -> String {
    format!("{table}:rows")
}

fn sequence_key(table: &str) -> String {
    format!("{table}:seq")
}

fn encode_fields<'a>(
    values: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Result<HashMap<String, String>, DbError> {
    values
        .into_iter()
        .map(|(column, value)| Ok((column.clone(), serde_json::to_string(&value.to_json())?)))
        .collect()
}

/// Decode a stored hash into a row. Fields that are not JSON read as text.
fn decode_fields(fields: HashMap<String, String>) -> Row {
    fields
        .into_iter()
        .map(|(column, raw)| {
            let value = serde_json::from_str::<serde_json::Value>(&raw)
                .map_or_else(|_| Value::Text(raw), |json| Value::from_json(&json));
            (column, value)
        })
        .collect()
}

async fn apply_options(client: &Client, key: &str, options: WriteOptions) -> Result<(), DbError> {
    if let Some(ttl) = options.ttl {
        let _: bool = client.expire(key, i64::from(ttl), None).await?;
    }
    if let Some(timestamp) = options.timestamp {
        tracing::debug!(key, timestamp, "Dragonfly ignores write timestamps");
    }
    Ok(())
}

async fn update(client: &Client, update: &Update) -> Result<u64, DbError> {
    let key = row_key(&update.table, update.keys.iter().map(|(_, v)| v));
    let mut fields = encode_fields(update.keys.iter().map(|(c, v)| (c, v)))?;
    for assignment in &update.assignments {
        match assignment {
            Assignment::Set { column, value } => {
                fields.insert(column.clone(), serde_json::to_string(&value.to_json())?);
            }
            Assignment::Delta { column, amount } => {
                let _: i64 = client.hincrby(key.as_str(), column.as_str(), *amount).await?;
            }
        }
    }
    let _: i64 = client.hset(key.as_str(), fields).await?;
    let _: i64 = client.sadd(index_key(&update.table), key.as_str()).await?;
    apply_options(client, &key, update.options).await?;
    Ok(1)
}

async fn delete(client: &Client, delete: &Delete) -> Result<u64, DbError> {
    let key = row_key(&delete.table, delete.keys.iter().map(|(_, v)| v));
    if let Some(timestamp) = delete.options.timestamp {
        tracing::debug!(key, timestamp, "Dragonfly ignores write timestamps");
    }
    let removed: i64 = client.del(key.as_str()).await?;
    let _: i64 = client.srem(index_key(&delete.table), key.as_str()).await?;
    Ok(u64::try_from(removed).unwrap_or(0))
}

async fn select(client: &Client, query: &SelectQuery) -> Result<Vec<Row>, DbError> {
    let index = index_key(query.table());
    let mut keys: Vec<String> = client.smembers(index.as_str()).await?;
    keys.sort_unstable();

    let limit = query
        .row_limit()
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    let mut rows = Vec::new();
    for key in keys {
        if rows.len() >= limit {
            break;
        }
        let fields: HashMap<String, String> = client.hgetall(key.as_str()).await?;
        if fields.is_empty() {
            // Expired or deleted elsewhere.
            let _: i64 = client.srem(index.as_str(), key.as_str()).await?;
            continue;
        }
        let row = decode_fields(fields);
        if query.matches(&row) {
            rows.push(query.project(row));
        }
    }
    Ok(rows)
}

#[async_trait]
impl QlConnection for DragonflyConnection {
    fn kind(&self) -> &'static str {
        "dragonfly"
    }

    async fn connect(&self) -> Result<(), DbError> {
        self.client().await.map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), DbError> {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            client.quit().await?;
            tracing::info!("Dragonfly connection closed");
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.client
            .lock()
            .await
            .as_ref()
            .is_some_and(ClientLike::is_connected)
    }

    async fn run_query(&self, query: &Query) -> Result<u64, DbError> {
        let client = self.client().await?;
        match &query.statement {
            Statement::Insert(i) => self.insert(&client, i).await,
            Statement::Update(u) => update(&client, u).await,
            Statement::Delete(d) => delete(&client, d).await,
            Statement::Select(s) => {
                let rows = select(&client, s).await?;
                Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
            }
        }
    }

    async fn fetch_query_results(&self, query: &Query) -> Result<Vec<Row>, DbError> {
        let client = self.client().await?;
        match &query.statement {
            Statement::Select(s) => select(&client, s).await,
            other => Err(DbError::Rejected {
                code: "unsupported".to_owned(),
                message: format!("cannot fetch rows from a {} statement", other.verb()),
            }),
        }
    }

    async fn last_insert_id(&self) -> Result<Option<Value>, DbError> {
        Ok(self.last_insert_id.lock().await.take())
    }
}
