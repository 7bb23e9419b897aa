//! Translation of entity state into statements.
//!
//! Both store flavours share one engine. The relational flavour ignores
//! write options and inserts counters at their stored value; the
//! column-family flavour applies write options, leaves counter columns out
//! of inserts and never inserts into counter tables.
//!
//! # Save
//!
//! ```text
//! not loaded ──> INSERT the properties the flavour writes
//!                (a NULL auto-increment column is omitted, then read back)
//! loaded ──────> UPDATE changed properties only, keyed by current identity
//! then ────────> one delta UPDATE per dirty counter, committed as it lands
//! ```

use std::sync::Arc;

use rowkeep_core::{DalError, Entity, Predicate, Result, SelectQuery};
use rowkeep_types::{Row, StorageType, Value};

use crate::connection::QlConnection;
use crate::dialect::Dialect;
use crate::statement::{Assignment, Delete, Insert, Statement, Update, WriteOptions};

/// Rows requested when loading by identity; one more than needed so that
/// ambiguous identities can be reported.
const LOAD_LIMIT: u64 = 2;

/// Which store paradigm the mapper targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Relational,
    ColumnFamily,
}

/// Statement engine shared by the relational and column-family stores.
#[derive(Clone)]
pub(crate) struct Mapper {
    connection: Arc<dyn QlConnection>,
    dialect: Dialect,
    family: Family,
}

impl Mapper {
    pub(crate) fn new(connection: Arc<dyn QlConnection>, dialect: Dialect, family: Family) -> Self {
        Self {
            connection,
            dialect,
            family,
        }
    }

    pub(crate) const fn connection(&self) -> &Arc<dyn QlConnection> {
        &self.connection
    }

    pub(crate) const fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) async fn save(&self, entity: &mut Entity) -> Result<()> {
        let options = self.write_options(entity);

        if entity.is_loaded() {
            if let Some(update) = build_update(entity, options) {
                self.execute(Statement::Update(update)).await?;
            }
        } else if self.family == Family::Relational || !entity.schema().is_counter_table() {
            let (insert, generated) = build_insert(entity, self.family, options);
            self.execute(Statement::Insert(insert)).await?;
            if let Some(column) = generated {
                let id = self.connection.last_insert_id().await?;
                if let Some(id) = id {
                    tracing::debug!(
                        entity = entity.entity_type(),
                        column = %column,
                        id = %id,
                        "Read generated id"
                    );
                    entity.hydrate(&Row::from([(column, id)]), true);
                }
            }
        }

        let counters: Vec<(String, i64)> = entity
            .dirty_counters()
            .into_iter()
            .map(|(name, delta)| (name.to_owned(), delta))
            .collect();
        for (column, amount) in counters {
            let update = Update {
                table: entity.schema().table().to_owned(),
                assignments: vec![Assignment::Delta {
                    column: column.clone(),
                    amount,
                }],
                keys: identity_keys(entity),
                options: options.without_ttl(),
            };
            self.execute(Statement::Update(update)).await?;
            entity.commit_counter(&column)?;
        }

        entity.mark_loaded();
        Ok(())
    }

    pub(crate) async fn load(&self, entity: &mut Entity) -> Result<()> {
        let query = identity_query(entity).limit(LOAD_LIMIT);
        let mut rows = self.fetch(Statement::Select(query)).await?.into_iter();
        let Some(row) = rows.next() else {
            return Err(DalError::NotFound {
                entity: entity.entity_type().to_owned(),
                id: entity.id(false).to_string(),
            });
        };
        if rows.next().is_some() {
            tracing::warn!(
                entity = entity.entity_type(),
                id = %entity.id(false),
                "Identity matched more than one row, using the first"
            );
        }
        entity.hydrate(&row, true).mark_loaded();
        Ok(())
    }

    pub(crate) async fn delete(&self, entity: &Entity) -> Result<u64> {
        let delete = Delete {
            table: entity.schema().table().to_owned(),
            keys: identity_keys(entity),
            options: self.write_options(entity),
        };
        let affected = self.execute(Statement::Delete(delete)).await?;
        if affected == 0 {
            tracing::debug!(
                entity = entity.entity_type(),
                id = %entity.id(false),
                "Delete matched no rows"
            );
        }
        Ok(affected)
    }

    pub(crate) async fn exists(&self, entity: &Entity) -> Result<bool> {
        let query = identity_query(entity)
            .columns(entity.id_properties())
            .limit(1);
        Ok(!self.fetch(Statement::Select(query)).await?.is_empty())
    }

    pub(crate) async fn get_data(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.fetch(Statement::Select(query.clone())).await
    }

    async fn execute(&self, statement: Statement) -> Result<u64> {
        let query = self.dialect.render(statement);
        tracing::trace!(
            store = self.connection.kind(),
            table = query.statement.table(),
            statement = %query.text,
            "Executing statement"
        );
        let affected = self.connection.run_query(&query).await?;
        tracing::debug!(
            store = self.connection.kind(),
            table = query.statement.table(),
            verb = query.statement.verb(),
            rows = affected,
            "Statement executed"
        );
        Ok(affected)
    }

    async fn fetch(&self, statement: Statement) -> Result<Vec<Row>> {
        let query = self.dialect.render(statement);
        tracing::trace!(
            store = self.connection.kind(),
            table = query.statement.table(),
            statement = %query.text,
            "Fetching rows"
        );
        Ok(self.connection.fetch_query_results(&query).await?)
    }

    fn write_options(&self, entity: &Entity) -> WriteOptions {
        match self.family {
            Family::Relational => WriteOptions::default(),
            Family::ColumnFamily => WriteOptions {
                ttl: entity.ttl(),
                timestamp: entity.timestamp(),
            },
        }
    }
}

/// Store representation of a property value.
fn stored_value(entity: &Entity, name: &str, value: &Value) -> Value {
    entity
        .schema()
        .property(name)
        .map_or_else(|| value.clone(), |p| p.storage().serialize(value))
}

/// `(column, stored value)` pairs of the identity, from current values.
fn identity_keys(entity: &Entity) -> Vec<(String, Value)> {
    entity
        .id_values()
        .into_iter()
        .map(|(name, value)| (name.to_owned(), stored_value(entity, name, value)))
        .collect()
}

fn identity_query(entity: &Entity) -> SelectQuery {
    identity_keys(entity)
        .into_iter()
        .fold(SelectQuery::new(entity.schema().table()), |query, (column, value)| {
            query.filter(Predicate::Eq(column, value))
        })
}

/// Insert of the properties `family` writes, plus the auto-increment column
/// left for the store to generate, if any.
///
/// Relational rows take counters at their stored value so the delta updates
/// that follow find a number to add to. Column-family counters exist only
/// through deltas.
fn build_insert(entity: &Entity, family: Family, options: WriteOptions) -> (Insert, Option<String>) {
    let schema = entity.schema();
    let generated = schema
        .auto_increment()
        .filter(|name| entity.get(name).is_ok_and(Value::is_null))
        .map(str::to_owned);

    let (columns, values) = entity
        .properties()
        .filter(|(name, _)| generated.as_deref() != Some(*name))
        .filter_map(|(name, value)| {
            let storage = schema.property(name).map(|p| p.storage());
            match (storage, value) {
                (Some(StorageType::Counter), _) if family == Family::ColumnFamily => None,
                (Some(StorageType::Counter), Value::Counter(counter)) => {
                    Some((name.to_owned(), Value::Int(counter.stored())))
                }
                _ => Some((name.to_owned(), stored_value(entity, name, value))),
            }
        })
        .unzip();

    let insert = Insert {
        table: schema.table().to_owned(),
        columns,
        values,
        key_columns: entity.id_properties().into_iter().map(str::to_owned).collect(),
        options,
    };
    (insert, generated)
}

/// Update of the changed properties, or `None` when nothing changed.
fn build_update(entity: &Entity, options: WriteOptions) -> Option<Update> {
    let changes = entity.changes();
    if changes.is_empty() {
        return None;
    }
    let assignments = changes
        .iter()
        .map(|change| Assignment::Set {
            column: change.property.clone(),
            value: stored_value(entity, &change.property, &change.to),
        })
        .collect();
    Some(Update {
        table: entity.schema().table().to_owned(),
        assignments,
        keys: identity_keys(entity),
        options,
    })
}

/// Implements [`DataStore`](rowkeep_core::DataStore) for a store type with
/// a `mapper` field, attaching the operation and entity to every error.
macro_rules! delegate_data_store {
    ($store:ty) => {
        #[async_trait::async_trait]
        impl rowkeep_core::DataStore for $store {
            async fn save(&self, entity: &mut rowkeep_core::Entity) -> rowkeep_core::Result<()> {
                let name = entity.entity_type().to_owned();
                self.mapper
                    .save(entity)
                    .await
                    .map_err(|e| e.context(rowkeep_core::Operation::Save, &name))
            }

            async fn load(&self, entity: &mut rowkeep_core::Entity) -> rowkeep_core::Result<()> {
                let name = entity.entity_type().to_owned();
                self.mapper
                    .load(entity)
                    .await
                    .map_err(|e| e.context(rowkeep_core::Operation::Load, &name))
            }

            async fn delete(&self, entity: &rowkeep_core::Entity) -> rowkeep_core::Result<u64> {
                self.mapper
                    .delete(entity)
                    .await
                    .map_err(|e| e.context(rowkeep_core::Operation::Delete, entity.entity_type()))
            }

            async fn exists(&self, entity: &rowkeep_core::Entity) -> rowkeep_core::Result<bool> {
                self.mapper
                    .exists(entity)
                    .await
                    .map_err(|e| e.context(rowkeep_core::Operation::Exists, entity.entity_type()))
            }

            async fn get_data(
                &self,
                query: &rowkeep_core::SelectQuery,
            ) -> rowkeep_core::Result<Vec<rowkeep_types::Row>> {
                self.mapper
                    .get_data(query)
                    .await
                    .map_err(|e| e.context(rowkeep_core::Operation::GetData, query.table()))
            }
        }
    };
}

pub(crate) use delegate_data_store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rowkeep_core::{PropertyDef, Schema};
    use rowkeep_types::StorageType;

    use super::*;

    fn schema() -> Arc<Schema> {
        Schema::builder("Post")
            .table("posts")
            .property(PropertyDef::new("id").with_storage(StorageType::Integer))
            .property(PropertyDef::new("title"))
            .property(PropertyDef::counter("views"))
            .auto_increment("id")
            .build()
            .unwrap()
    }

    #[test]
    fn insert_skips_null_auto_increment() {
        let mut post = Entity::new(&schema());
        post.set("title", "hello").unwrap();
        let (insert, generated) = build_insert(&post, Family::ColumnFamily, WriteOptions::default());
        assert_eq!(insert.columns, ["title"]);
        assert_eq!(insert.values, [Value::from("hello")]);
        assert_eq!(insert.key_columns, ["id"]);
        assert_eq!(generated.as_deref(), Some("id"));

        post.set("id", 7).unwrap();
        let (insert, generated) = build_insert(&post, Family::ColumnFamily, WriteOptions::default());
        assert_eq!(insert.columns, ["id", "title"]);
        assert!(generated.is_none());
    }

    #[test]
    fn relational_insert_writes_stored_counter_value() {
        let mut post = Entity::new(&schema());
        post.set("id", 7).unwrap().set("title", "hello").unwrap();
        post.counter_mut("views").unwrap().increment(3);

        let (insert, _) = build_insert(&post, Family::Relational, WriteOptions::default());
        assert_eq!(insert.columns, ["id", "title", "views"]);
        assert_eq!(insert.values[2], Value::Int(0));

        let (insert, _) = build_insert(&post, Family::ColumnFamily, WriteOptions::default());
        assert_eq!(insert.columns, ["id", "title"]);
    }

    #[test]
    fn update_serializes_changed_values_only() {
        let mut post = Entity::new(&schema());
        post.set("id", "7").unwrap();
        post.mark_loaded();
        assert!(build_update(&post, WriteOptions::default()).is_none());

        post.set("title", "changed").unwrap();
        let update = build_update(&post, WriteOptions::default()).unwrap();
        assert_eq!(
            update.assignments,
            [Assignment::Set {
                column: "title".to_owned(),
                value: Value::from("changed"),
            }]
        );
        assert_eq!(update.keys, [("id".to_owned(), Value::Int(7))]);
    }

    #[test]
    fn identity_query_filters_every_key() {
        let mut post = Entity::new(&schema());
        post.set("id", 3).unwrap();
        let query = identity_query(&post);
        assert_eq!(query.table(), "posts");
        assert_eq!(query.predicates(), [Predicate::eq("id", 3)]);
    }
}
