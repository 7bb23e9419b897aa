//! Lazy result collections.
//!
//! A [`Collection`] describes a read of many entities of one schema. Calling
//! [`Collection::fetch`] runs the query through the resolved store and
//! returns [`Entities`], which turns each raw row into a loaded [`Entity`]
//! only when it is pulled. Fetching again re-runs the query.

use std::sync::Arc;

use rowkeep_types::Row;

use crate::entity::Entity;
use crate::error::{DalError, Operation, Result};
use crate::identity::Identity;
use crate::query::{Predicate, SelectQuery};
use crate::registry::StoreRegistry;
use crate::schema::Schema;

/// Query description for a set of entities.
#[derive(Debug, Clone)]
pub struct Collection {
    schema: Arc<Schema>,
    store_name: String,
    predicates: Vec<Predicate>,
    identity: Option<Identity>,
    limit: Option<u64>,
    allow_filtering: bool,
}

impl Collection {
    /// Collection over every entity of `schema` in its default store.
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            store_name: schema.store_name().to_owned(),
            predicates: Vec::new(),
            identity: None,
            limit: None,
            allow_filtering: false,
        }
    }

    /// Read from a store other than the schema default.
    #[must_use]
    pub fn on_store(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    /// Add a predicate; all predicates must hold.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Restrict to the entity with identity `id`.
    #[must_use]
    pub fn where_id(mut self, id: impl Into<Identity>) -> Self {
        self.identity = Some(id.into());
        self
    }

    /// Return at most `limit` entities.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Let column-family stores filter on non-key columns.
    #[must_use]
    pub const fn allow_filtering(mut self) -> Self {
        self.allow_filtering = true;
        self
    }

    /// Build the read query this collection issues.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::InvalidValue`] if a single identity value was
    /// given for a composite identity, and [`DalError::UnknownProperty`] if
    /// a composite identity names an undeclared property.
    pub fn query(&self) -> Result<SelectQuery> {
        let mut query = SelectQuery::new(self.schema.table());
        for predicate in self.identity_predicates()? {
            query = query.filter(predicate);
        }
        for predicate in &self.predicates {
            query = query.filter(predicate.clone());
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if self.allow_filtering {
            query = query.allow_filtering();
        }
        Ok(query)
    }

    /// Run the query and return a lazy iterator of loaded entities.
    ///
    /// # Errors
    ///
    /// Returns [`DalError::StoreNotFound`] if the store name is unbound, or
    /// any error from building or running the query.
    pub async fn fetch(&self, registry: &StoreRegistry) -> Result<Entities> {
        let query = self.query()?;
        let store = registry.resolve(&self.store_name)?;
        let rows = store
            .get_data(&query)
            .await
            .map_err(|e| e.context(Operation::GetData, self.schema.entity()))?;
        tracing::debug!(
            entity = self.schema.entity(),
            store = %self.store_name,
            rows = rows.len(),
            "Fetched collection"
        );
        Ok(Entities {
            schema: Arc::clone(&self.schema),
            store_name: self.store_name.clone(),
            rows: rows.into_iter(),
        })
    }

    /// First matching entity, if any.
    pub async fn first(&self, registry: &StoreRegistry) -> Result<Option<Entity>> {
        let limited = self.clone().limit(self.limit.map_or(1, |l| l.min(1)));
        Ok(limited.fetch(registry).await?.next())
    }

    /// Number of matching entities.
    pub async fn count(&self, registry: &StoreRegistry) -> Result<usize> {
        Ok(self.fetch(registry).await?.len())
    }

    /// Every matching entity, hydrated eagerly.
    pub async fn to_vec(&self, registry: &StoreRegistry) -> Result<Vec<Entity>> {
        Ok(self.fetch(registry).await?.collect())
    }

    fn identity_predicates(&self) -> Result<Vec<Predicate>> {
        let Some(identity) = &self.identity else {
            return Ok(Vec::new());
        };
        match identity {
            Identity::Single(value) => match self.schema.id_properties().as_slice() {
                [only] => Ok(vec![Predicate::eq(*only, value.clone())]),
                many => Err(DalError::InvalidValue {
                    entity: self.schema.entity().to_owned(),
                    property: many.join(", "),
                    expected: "a composite identity",
                }),
            },
            Identity::Composite(pairs) => pairs
                .iter()
                .map(|(name, value)| {
                    if self.schema.position(name).is_none() {
                        return Err(DalError::UnknownProperty {
                            entity: self.schema.entity().to_owned(),
                            property: name.clone(),
                        });
                    }
                    Ok(Predicate::eq(name.as_str(), value.clone()))
                })
                .collect(),
        }
    }
}

/// Lazy iterator over fetched rows, hydrating one entity per step.
#[derive(Debug)]
pub struct Entities {
    schema: Arc<Schema>,
    store_name: String,
    rows: std::vec::IntoIter<Row>,
}

impl Entities {
    /// Raw rows not yet hydrated.
    pub fn remaining_rows(&self) -> &[Row] {
        self.rows.as_slice()
    }
}

impl Iterator for Entities {
    type Item = Entity;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let mut entity = Entity::new(&self.schema);
        entity
            .set_store_name(self.store_name.clone())
            .hydrate(&row, true)
            .mark_loaded();
        Some(entity)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Entities {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rowkeep_types::Value;

    use super::*;
    use crate::schema::PropertyDef;
    use crate::store::DataStore;

    /// Store returning canned rows and recording every query it receives.
    struct CannedStore {
        rows: Vec<Row>,
        queries: Mutex<Vec<SelectQuery>>,
    }

    #[async_trait]
    impl DataStore for CannedStore {
        async fn save(&self, _entity: &mut Entity) -> Result<()> {
            Ok(())
        }
        async fn load(&self, _entity: &mut Entity) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _entity: &Entity) -> Result<u64> {
            Ok(0)
        }
        async fn exists(&self, _entity: &Entity) -> Result<bool> {
            Ok(false)
        }
        async fn get_data(&self, query: &SelectQuery) -> Result<Vec<Row>> {
            self.queries.lock().unwrap().push(query.clone());
            let mut rows: Vec<Row> = self
                .rows
                .iter()
                .filter(|row| query.matches(row))
                .cloned()
                .collect();
            if let Some(limit) = query.row_limit() {
                rows.truncate(usize::try_from(limit).unwrap());
            }
            Ok(rows)
        }
    }

    fn schema() -> Arc<Schema> {
        Schema::builder("Item")
            .store("items")
            .property(PropertyDef::new("id").with_storage(rowkeep_types::StorageType::Integer))
            .property(PropertyDef::new("label"))
            .build()
            .unwrap()
    }

    fn item(id: &str, label: &str) -> Row {
        [
            ("id".to_owned(), Value::from(id)),
            ("label".to_owned(), Value::from(label)),
        ]
        .into_iter()
        .collect()
    }

    fn registry(rows: Vec<Row>) -> (StoreRegistry, Arc<CannedStore>) {
        let store = Arc::new(CannedStore {
            rows,
            queries: Mutex::new(Vec::new()),
        });
        let registry = StoreRegistry::new();
        registry.add_store("items", Arc::clone(&store) as Arc<dyn DataStore>);
        (registry, store)
    }

    #[tokio::test]
    async fn hydrates_rows_lazily_as_loaded_entities() {
        let (registry, _) = registry(vec![item("1", "a"), item("2", "b")]);
        let mut entities = Collection::new(&schema()).fetch(&registry).await.unwrap();
        assert_eq!(entities.len(), 2);

        let first = entities.next().unwrap();
        assert!(first.is_loaded());
        assert!(first.changes().is_empty());
        assert_eq!(first.get("id").unwrap(), &Value::Int(1));
        assert_eq!(first.store_name(), "items");
        assert_eq!(entities.remaining_rows().len(), 1);
    }

    #[tokio::test]
    async fn every_fetch_reissues_the_query() {
        let (registry, store) = registry(vec![item("1", "a")]);
        let collection = Collection::new(&schema());
        assert_eq!(collection.count(&registry).await.unwrap(), 1);
        assert_eq!(collection.count(&registry).await.unwrap(), 1);
        assert_eq!(store.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filters_and_first() {
        let (registry, _) = registry(vec![item("1", "a"), item("2", "b"), item("3", "b")]);
        let collection = Collection::new(&schema()).filter(Predicate::eq("label", "b"));
        assert_eq!(collection.to_vec(&registry).await.unwrap().len(), 2);

        let first = collection.first(&registry).await.unwrap().unwrap();
        assert_eq!(first.get("id").unwrap(), &Value::Int(2));
    }

    #[tokio::test]
    async fn where_id_builds_identity_predicates() {
        let collection = Collection::new(&schema()).where_id("2");
        assert_eq!(collection.query().unwrap().predicates(), [Predicate::eq("id", "2")]);

        let bad = Collection::new(&schema()).where_id(Identity::composite([("nope", 1)]));
        assert!(matches!(bad.query(), Err(DalError::UnknownProperty { .. })));
    }

    #[tokio::test]
    async fn unbound_store_fails() {
        let registry = StoreRegistry::new();
        let result = Collection::new(&schema()).fetch(&registry).await;
        assert!(matches!(result, Err(DalError::StoreNotFound(_))));
    }
}
