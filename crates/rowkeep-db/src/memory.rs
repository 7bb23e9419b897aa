//! In-process connection.
//!
//! [`MemoryConnection`] interprets statements directly against tables held
//! in memory. It behaves like a column-family store: inserts and updates
//! are upserts, rows can expire, and writes carrying an older timestamp than
//! the row lose. Every statement is logged so tests can assert on the exact
//! query text a mapper produced.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rowkeep_core::SelectQuery;
use rowkeep_types::{Row, Value};
use tokio::time::Instant;

use crate::connection::QlConnection;
use crate::error::DbError;
use crate::statement::{Assignment, Delete, Insert, Query, Statement, Update, WriteOptions};

#[derive(Debug, Clone)]
struct StoredRow {
    values: Row,
    expires_at: Option<Instant>,
    timestamp: Option<i64>,
    order: u64,
}

impl StoredRow {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }

    /// Whether a write stamped `timestamp` may overwrite this row.
    fn accepts(&self, timestamp: Option<i64>) -> bool {
        match (self.timestamp, timestamp) {
            (Some(current), Some(incoming)) => incoming >= current,
            _ => true,
        }
    }

    fn stamp(&mut self, options: WriteOptions, now: Instant) {
        if let Some(ttl) = options.ttl {
            self.expires_at = now.checked_add(Duration::from_secs(u64::from(ttl)));
        }
        if options.timestamp.is_some() {
            self.timestamp = options.timestamp;
        }
    }
}

#[derive(Debug, Default)]
struct Table {
    rows: HashMap<String, StoredRow>,
    sequence: i64,
    next_order: u64,
}

impl Table {
    fn purge_expired(&mut self, now: Instant) {
        self.rows.retain(|_, row| row.is_live(now));
    }

    /// Row stored under `key`, created with `seed` when absent.
    fn upsert(&mut self, key: String, seed: impl FnOnce() -> Row) -> &mut StoredRow {
        let order = self.next_order;
        self.next_order = self.next_order.saturating_add(1);
        self.rows.entry(key).or_insert_with(|| StoredRow {
            values: seed(),
            expires_at: None,
            timestamp: None,
            order,
        })
    }

    /// Live rows in insertion order.
    fn ordered(&self, now: Instant) -> Vec<&StoredRow> {
        let mut rows: Vec<&StoredRow> = self.rows.values().filter(|row| row.is_live(now)).collect();
        rows.sort_by_key(|row| row.order);
        rows
    }
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    tables: HashMap<String, Table>,
    executed: Vec<Query>,
    last_insert_id: Option<Value>,
    fail_after: Option<usize>,
}

/// Connection to an in-process store.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    state: Mutex<State>,
}

impl MemoryConnection {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every query executed so far, oldest first.
    pub fn executed(&self) -> Vec<Query> {
        self.lock().executed.clone()
    }

    /// The most recent query.
    pub fn last_query(&self) -> Option<Query> {
        self.lock().executed.last().cloned()
    }

    /// Forget the executed-query log.
    pub fn clear_log(&self) {
        self.lock().executed.clear();
    }

    /// Let `n` more statements succeed, then reject every following one.
    pub fn fail_after(&self, n: usize) {
        self.lock().fail_after = Some(n);
    }

    /// Stop rejecting statements.
    pub fn stop_failing(&self) {
        self.lock().fail_after = None;
    }

    /// Live rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let now = Instant::now();
        self.lock()
            .tables
            .get(table)
            .map(|t| {
                t.ordered(now)
                    .into_iter()
                    .map(|row| row.values.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log `query` and decide whether it may run.
    fn admit(state: &mut State, query: &Query) -> Result<(), DbError> {
        state.connected = true;
        state.executed.push(query.clone());
        match state.fail_after.as_mut() {
            Some(0) => Err(DbError::Rejected {
                code: "injected".to_owned(),
                message: format!("{} on {} rejected", query.statement.verb(), query.statement.table()),
            }),
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Key under which a row with the given identity values is stored.
fn row_key<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    values
        .into_iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn keyed_row(keys: &[(String, Value)]) -> Row {
    keys.iter().cloned().collect()
}

fn insert(state: &mut State, insert: &Insert, now: Instant) -> u64 {
    let table = state.tables.entry(insert.table.clone()).or_default();
    let mut values: Row = insert
        .columns
        .iter()
        .cloned()
        .zip(insert.values.iter().cloned())
        .collect();

    for column in &insert.key_columns {
        if !values.contains_key(column) {
            table.sequence = table.sequence.saturating_add(1);
            let generated = Value::Int(table.sequence);
            values.insert(column.clone(), generated.clone());
            state.last_insert_id = Some(generated);
        }
    }

    let key = row_key(insert.key_columns.iter().filter_map(|c| values.get(c)));
    table.purge_expired(now);
    let row = table.upsert(key, Row::new);
    if !row.accepts(insert.options.timestamp) {
        return 0;
    }
    row.values.extend(values);
    row.expires_at = None;
    row.stamp(insert.options, now);
    1
}

fn update(state: &mut State, update: &Update, now: Instant) -> u64 {
    let table = state.tables.entry(update.table.clone()).or_default();
    table.purge_expired(now);
    let key = row_key(update.keys.iter().map(|(_, v)| v));
    let row = table.upsert(key, || keyed_row(&update.keys));
    if !row.accepts(update.options.timestamp) {
        return 0;
    }
    for assignment in &update.assignments {
        match assignment {
            Assignment::Set { column, value } => {
                row.values.insert(column.clone(), value.clone());
            }
            Assignment::Delta { column, amount } => {
                let current = row.values.get(column).and_then(Value::as_i64).unwrap_or(0);
                row.values
                    .insert(column.clone(), Value::Int(current.saturating_add(*amount)));
            }
        }
    }
    row.stamp(update.options, now);
    1
}

fn delete(state: &mut State, delete: &Delete, now: Instant) -> u64 {
    let Some(table) = state.tables.get_mut(&delete.table) else {
        return 0;
    };
    table.purge_expired(now);
    let key = row_key(delete.keys.iter().map(|(_, v)| v));
    let accepted = table
        .rows
        .get(&key)
        .is_some_and(|row| row.accepts(delete.options.timestamp));
    if !accepted {
        return 0;
    }
    table.rows.remove(&key);
    1
}

fn select(state: &mut State, query: &SelectQuery, now: Instant) -> Vec<Row> {
    let Some(table) = state.tables.get_mut(query.table()) else {
        return Vec::new();
    };
    table.purge_expired(now);
    let limit = query
        .row_limit()
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    table
        .ordered(now)
        .into_iter()
        .filter(|row| query.matches(&row.values))
        .take(limit)
        .map(|row| query.project(row.values.clone()))
        .collect()
}

#[async_trait]
impl QlConnection for MemoryConnection {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<(), DbError> {
        self.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DbError> {
        self.lock().connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn run_query(&self, query: &Query) -> Result<u64, DbError> {
        let now = Instant::now();
        let mut state = self.lock();
        Self::admit(&mut state, query)?;
        let affected = match &query.statement {
            Statement::Insert(i) => insert(&mut state, i, now),
            Statement::Update(u) => update(&mut state, u, now),
            Statement::Delete(d) => delete(&mut state, d, now),
            Statement::Select(s) => u64::try_from(select(&mut state, s, now).len()).unwrap_or(u64::MAX),
        };
        Ok(affected)
    }

    async fn fetch_query_results(&self, query: &Query) -> Result<Vec<Row>, DbError> {
        let now = Instant::now();
        let mut state = self.lock();
        Self::admit(&mut state, query)?;
        match &query.statement {
            Statement::Select(s) => Ok(select(&mut state, s, now)),
            other => Err(DbError::Rejected {
                code: "unsupported".to_owned(),
                message: format!("cannot fetch rows from a {} statement", other.verb()),
            }),
        }
    }

    async fn last_insert_id(&self) -> Result<Option<Value>, DbError> {
        Ok(self.lock().last_insert_id.take())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rowkeep_core::Predicate;

    use super::*;
    use crate::dialect::Dialect;

    fn keys(id: i64) -> Vec<(String, Value)> {
        vec![("id".to_owned(), Value::Int(id))]
    }

    fn write(id: i64, name: &str, options: WriteOptions) -> Query {
        Dialect::Cql.render(Statement::Update(Update {
            table: "t".to_owned(),
            assignments: vec![Assignment::Set {
                column: "name".to_owned(),
                value: Value::from(name),
            }],
            keys: keys(id),
            options,
        }))
    }

    fn all() -> Query {
        Dialect::Cql.render(Statement::Select(SelectQuery::new("t")))
    }

    #[tokio::test]
    async fn updates_upsert_and_log() {
        let conn = MemoryConnection::new();
        assert!(!conn.is_connected().await);
        conn.run_query(&write(1, "a", WriteOptions::default())).await.unwrap();
        conn.run_query(&write(1, "b", WriteOptions::default())).await.unwrap();
        assert!(conn.is_connected().await);

        let rows = conn.fetch_query_results(&all()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("b")));
        assert_eq!(conn.executed().len(), 3);
        assert_eq!(conn.last_query().unwrap().text, r#"SELECT * FROM "t""#);
    }

    #[tokio::test]
    async fn older_timestamps_lose() {
        let conn = MemoryConnection::new();
        let at = |ts| WriteOptions {
            ttl: None,
            timestamp: Some(ts),
        };
        assert_eq!(conn.run_query(&write(1, "new", at(10))).await.unwrap(), 1);
        assert_eq!(conn.run_query(&write(1, "old", at(5))).await.unwrap(), 0);
        assert_eq!(conn.rows("t")[0].get("name"), Some(&Value::from("new")));
    }

    #[tokio::test(start_paused = true)]
    async fn rows_expire_after_ttl() {
        let conn = MemoryConnection::new();
        let ttl = WriteOptions {
            ttl: Some(2),
            timestamp: None,
        };
        conn.run_query(&write(1, "short", ttl)).await.unwrap();
        conn.run_query(&write(2, "kept", WriteOptions::default())).await.unwrap();
        assert_eq!(conn.rows("t").len(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        let rows = conn.fetch_query_results(&all()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn inserts_generate_missing_keys() {
        let conn = MemoryConnection::new();
        let insert = Dialect::Postgres.render(Statement::Insert(Insert {
            table: "posts".to_owned(),
            columns: vec!["title".to_owned()],
            values: vec![Value::from("hello")],
            key_columns: vec!["id".to_owned()],
            options: WriteOptions::default(),
        }));
        conn.run_query(&insert).await.unwrap();
        assert_eq!(conn.last_insert_id().await.unwrap(), Some(Value::Int(1)));
        conn.run_query(&insert).await.unwrap();
        assert_eq!(conn.last_insert_id().await.unwrap(), Some(Value::Int(2)));
        assert_eq!(conn.rows("posts").len(), 2);
    }

    #[tokio::test]
    async fn deletes_and_filters() {
        let conn = MemoryConnection::new();
        conn.run_query(&write(1, "a", WriteOptions::default())).await.unwrap();
        conn.run_query(&write(2, "b", WriteOptions::default())).await.unwrap();

        let filtered = Dialect::Cql.render(Statement::Select(
            SelectQuery::new("t").filter(Predicate::eq("name", "b")),
        ));
        assert_eq!(conn.fetch_query_results(&filtered).await.unwrap().len(), 1);

        let delete = Dialect::Cql.render(Statement::Delete(Delete {
            table: "t".to_owned(),
            keys: keys(1),
            options: WriteOptions::default(),
        }));
        assert_eq!(conn.run_query(&delete).await.unwrap(), 1);
        assert_eq!(conn.run_query(&delete).await.unwrap(), 0);
        assert_eq!(conn.rows("t").len(), 1);
    }

    #[tokio::test]
    async fn failure_injection() {
        let conn = MemoryConnection::new();
        conn.fail_after(1);
        assert!(conn.run_query(&write(1, "a", WriteOptions::default())).await.is_ok());
        let err = conn.run_query(&write(2, "b", WriteOptions::default())).await;
        assert!(matches!(err, Err(DbError::Rejected { code, .. }) if code == "injected"));
        conn.stop_failing();
        assert!(conn.run_query(&write(2, "b", WriteOptions::default())).await.is_ok());
    }
}
