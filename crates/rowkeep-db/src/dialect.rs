//! Query text rendering.
//!
//! | Dialect | Identifiers | Values |
//! |---------|-------------|--------|
//! | [`Dialect::Postgres`] | `"quoted"` | `$n` placeholders, `NULL` inline |
//! | [`Dialect::Cql`] | `"quoted"` | inline literals, nothing bound |
//!
//! CQL write options follow the placement rules of the language:
//! `INSERT ... VALUES (...) USING TTL n AND TIMESTAMP t`,
//! `UPDATE "t" USING ... SET ...` and `DELETE FROM "t" USING TIMESTAMP t`.

use std::fmt::Write as _;

use rowkeep_core::{Predicate, SelectQuery};
use rowkeep_types::Value;

use crate::statement::{Assignment, Delete, Insert, Query, Statement, Update, WriteOptions};

/// Query language a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `PostgreSQL` with positional placeholders.
    Postgres,
    /// Cassandra Query Language with inline literals.
    Cql,
}

impl Dialect {
    /// Render `statement` into query text and bound values.
    pub fn render(self, statement: Statement) -> Query {
        let mut writer = Writer {
            dialect: self,
            text: String::new(),
            values: Vec::new(),
        };
        match &statement {
            Statement::Insert(insert) => writer.insert(insert),
            Statement::Update(update) => writer.update(update),
            Statement::Delete(delete) => writer.delete(delete),
            Statement::Select(select) => writer.select(select),
        }
        Query {
            statement,
            text: writer.text,
            values: writer.values,
        }
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value as a CQL literal.
pub fn cql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Counter(c) => c.calculated().to_string(),
        Value::Float(f) => float_literal(*f),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(_) => value.to_string(),
    }
}

fn float_literal(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_owned();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() { "Infinity" } else { "-Infinity" }.to_owned();
    }
    let text = f.to_string();
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

struct Writer {
    dialect: Dialect,
    text: String,
    values: Vec<Value>,
}

impl Writer {
    fn insert(&mut self, insert: &Insert) {
        let _ = write!(self.text, "INSERT INTO {}", quote_identifier(&insert.table));
        if insert.columns.is_empty() {
            self.text.push_str(" DEFAULT VALUES");
        } else {
            let columns: Vec<String> = insert.columns.iter().map(|c| quote_identifier(c)).collect();
            let _ = write!(self.text, " ({}) VALUES (", columns.join(", "));
            for (i, value) in insert.values.iter().enumerate() {
                if i > 0 {
                    self.text.push_str(", ");
                }
                self.value(value);
            }
            self.text.push(')');
        }
        self.options(insert.options);
    }

    fn update(&mut self, update: &Update) {
        let _ = write!(self.text, "UPDATE {}", quote_identifier(&update.table));
        self.options(update.options);
        self.text.push_str(" SET ");
        for (i, assignment) in update.assignments.iter().enumerate() {
            if i > 0 {
                self.text.push_str(", ");
            }
            let column = quote_identifier(assignment.column());
            match assignment {
                Assignment::Set { value, .. } => {
                    let _ = write!(self.text, "{column} = ");
                    self.value(value);
                }
                Assignment::Delta { amount, .. } => {
                    let sign = if *amount < 0 { '-' } else { '+' };
                    let _ = write!(
                        self.text,
                        "{column} = {column} {sign} {}",
                        amount.unsigned_abs()
                    );
                }
            }
        }
        self.keys(&update.keys);
    }

    fn delete(&mut self, delete: &Delete) {
        let _ = write!(self.text, "DELETE FROM {}", quote_identifier(&delete.table));
        self.options(delete.options.without_ttl());
        self.keys(&delete.keys);
    }

    fn select(&mut self, select: &SelectQuery) {
        self.text.push_str("SELECT ");
        if select.selected_columns().is_empty() {
            self.text.push('*');
        } else {
            let columns: Vec<String> = select
                .selected_columns()
                .iter()
                .map(|c| quote_identifier(c))
                .collect();
            self.text.push_str(&columns.join(", "));
        }
        let _ = write!(self.text, " FROM {}", quote_identifier(select.table()));
        for (i, predicate) in select.predicates().iter().enumerate() {
            self.text.push_str(if i == 0 { " WHERE " } else { " AND " });
            self.predicate(predicate);
        }
        if let Some(limit) = select.row_limit() {
            let _ = write!(self.text, " LIMIT {limit}");
        }
        if select.filtering_allowed() && self.dialect == Dialect::Cql {
            self.text.push_str(" ALLOW FILTERING");
        }
    }

    fn keys(&mut self, keys: &[(String, Value)]) {
        for (i, (column, value)) in keys.iter().enumerate() {
            self.text.push_str(if i == 0 { " WHERE " } else { " AND " });
            let _ = write!(self.text, "{} = ", quote_identifier(column));
            self.value(value);
        }
    }

    fn predicate(&mut self, predicate: &Predicate) {
        let column = quote_identifier(predicate.field());
        let (op, value) = match predicate {
            Predicate::Eq(_, v) => ("=", v),
            Predicate::NotEq(_, v) => ("<>", v),
            Predicate::Lt(_, v) => ("<", v),
            Predicate::Lte(_, v) => ("<=", v),
            Predicate::Gt(_, v) => (">", v),
            Predicate::Gte(_, v) => (">=", v),
            Predicate::In(_, values) => {
                let _ = write!(self.text, "{column} IN (");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.text.push_str(", ");
                    }
                    self.value(v);
                }
                self.text.push(')');
                return;
            }
            Predicate::IsNull(_) => {
                let _ = write!(self.text, "{column} IS NULL");
                return;
            }
            Predicate::IsNotNull(_) => {
                let _ = write!(self.text, "{column} IS NOT NULL");
                return;
            }
        };
        let _ = write!(self.text, "{column} {op} ");
        self.value(value);
    }

    fn options(&mut self, options: WriteOptions) {
        if self.dialect != Dialect::Cql || options.is_empty() {
            return;
        }
        self.text.push_str(" USING ");
        match (options.ttl, options.timestamp) {
            (Some(ttl), Some(ts)) => {
                let _ = write!(self.text, "TTL {ttl} AND TIMESTAMP {ts}");
            }
            (Some(ttl), None) => {
                let _ = write!(self.text, "TTL {ttl}");
            }
            (None, Some(ts)) => {
                let _ = write!(self.text, "TIMESTAMP {ts}");
            }
            (None, None) => {}
        }
    }

    fn value(&mut self, value: &Value) {
        match self.dialect {
            Dialect::Cql => self.text.push_str(&cql_literal(value)),
            Dialect::Postgres if value.is_null() => self.text.push_str("NULL"),
            Dialect::Postgres => {
                self.values.push(value.clone());
                let _ = write!(self.text, "${}", self.values.len());
            }
        }
    }
}
