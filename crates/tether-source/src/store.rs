//! The in-memory store source.
//!
//! A [`Store`] composes the relational [`Cache`] with the source lifecycle:
//! transforms apply through the cache's processors, updates re-enter the
//! transform path, and queries evaluate against cached records.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tether_cache::Cache;
use tether_core::{
    Error, KeyMap, Operation, QueryExpression, QueryResult, Record, RecordIdentity, Records,
    RelationshipData, Result, Schema, Transform,
};

use crate::core::{QueryHandler, SourceCore, SourceSettings, TransformHandler, UpdateHandler};
use crate::evented::EventBus;
use crate::source::{Queryable, Source, Transformable, Updatable};

/// In-memory source backed by a relational cache.
///
/// Cloning a store is cheap and shares the same cache.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    core: SourceCore,
    cache: RwLock<Cache>,
    key_map: Arc<KeyMap>,
}

impl Store {
    /// Create a store with its own key map.
    pub fn new(name: impl Into<String>, schema: Arc<Schema>) -> Self {
        Self::with_key_map(name, schema, Arc::new(KeyMap::new()))
    }

    /// Create a store sharing a key map with other sources.
    pub fn with_key_map(
        name: impl Into<String>,
        schema: Arc<Schema>,
        key_map: Arc<KeyMap>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                core: SourceCore::new(SourceSettings::named(name)),
                cache: RwLock::new(Cache::new(schema)),
                key_map,
            }),
        }
    }

    /// The shared key map.
    pub fn key_map(&self) -> &Arc<KeyMap> {
        &self.inner.key_map
    }

    /// The source core (log and queue introspection).
    pub fn core(&self) -> &SourceCore {
        &self.inner.core
    }

    /// Run a closure against the cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&Cache) -> R) -> R {
        f(&self.inner.cache.read().unwrap())
    }

    /// Apply operations directly to the cache, outside the transform
    /// lifecycle: no id is logged and no event is announced. Intended for
    /// local-only adjustments and test setup.
    pub fn patch(&self, operations: &[Operation]) -> Result<Vec<Operation>> {
        self.inner.cache.write().unwrap().patch(operations)
    }

    /// Look up a record, cloned out of the cache.
    pub fn record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.with_cache(|cache| cache.record(identity).cloned())
    }

    /// Whether a record is present.
    pub fn contains_record(&self, identity: &RecordIdentity) -> bool {
        self.with_cache(|cache| cache.contains_record(identity))
    }

    /// Navigate a deep path into the cache.
    pub fn get(&self, path: &[&str]) -> Option<Value> {
        self.with_cache(|cache| cache.get(path))
    }

    /// Whether a deep path exists.
    pub fn has(&self, path: &[&str]) -> bool {
        self.with_cache(|cache| cache.has(path))
    }

    /// A clone of the full record map.
    pub fn dump(&self) -> Records {
        self.with_cache(|cache| cache.dump())
    }

    /// Replace the cache contents wholesale and register record keys.
    pub fn reset(&self, data: Records) {
        for by_id in data.values() {
            for record in by_id.values() {
                if !record.keys.is_empty() {
                    self.inner.key_map.push_record(record);
                }
            }
        }
        self.inner.cache.write().unwrap().reset(data);
    }

    /// Apply a transform's operations to the cache and key map.
    fn apply_transform(&self, transform: &Transform) -> Result<()> {
        {
            let mut cache = self.inner.cache.write().unwrap();
            cache.patch(&transform.operations)?;
        }
        for op in &transform.operations {
            match op {
                Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                    if !record.keys.is_empty() {
                        self.inner.key_map.push_record(record);
                    }
                }
                Operation::ReplaceKey { record, key, value } => {
                    self.inner.key_map.set(&record.kind, key, value, &record.id);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Evaluate a query against the cache.
    fn evaluate(&self, query: &QueryExpression) -> Result<QueryResult> {
        let cache = self.inner.cache.read().unwrap();
        match query {
            QueryExpression::Record { record } => cache
                .record(record)
                .cloned()
                .map(|r| QueryResult::Record(Some(r)))
                .ok_or_else(|| Error::record_not_found(&record.kind, &record.id)),
            QueryExpression::Records { kind } => Ok(QueryResult::Records(
                cache.records_of_kind(kind).into_iter().cloned().collect(),
            )),
            QueryExpression::RelatedRecord {
                record,
                relationship,
            } => {
                let owner = cache
                    .record(record)
                    .ok_or_else(|| Error::record_not_found(&record.kind, &record.id))?;
                cache
                    .schema()
                    .relationship(&record.kind, relationship)
                    .ok_or_else(|| Error::relationship_not_found(&record.kind, relationship))?;

                let related = match owner.relationship(relationship) {
                    Some(RelationshipData::HasOne { data: Some(identity) }) => {
                        cache.record(identity).cloned()
                    }
                    _ => None,
                };
                Ok(QueryResult::Record(related))
            }
            QueryExpression::RelatedRecords {
                record,
                relationship,
            } => {
                let owner = cache
                    .record(record)
                    .ok_or_else(|| Error::record_not_found(&record.kind, &record.id))?;
                cache
                    .schema()
                    .relationship(&record.kind, relationship)
                    .ok_or_else(|| Error::relationship_not_found(&record.kind, relationship))?;

                let members = owner
                    .relationship(relationship)
                    .map(|slot| slot.identities())
                    .unwrap_or_default();
                Ok(QueryResult::Records(
                    members
                        .iter()
                        .filter_map(|identity| cache.record(identity).cloned())
                        .collect(),
                ))
            }
        }
    }
}

impl Source for Store {
    fn name(&self) -> &str {
        self.inner.core.name()
    }

    fn bus(&self) -> &EventBus {
        self.inner.core.bus()
    }

    fn as_transformable(self: Arc<Self>) -> Option<Arc<dyn Transformable>> {
        Some(self)
    }

    fn as_updatable(self: Arc<Self>) -> Option<Arc<dyn Updatable>> {
        Some(self)
    }

    fn as_queryable(self: Arc<Self>) -> Option<Arc<dyn Queryable>> {
        Some(self)
    }
}

#[async_trait]
impl Transformable for Store {
    async fn transform(&self, transform: Transform) -> Result<Vec<Transform>> {
        let store = self.clone();
        let handler: TransformHandler = Arc::new(move |t: Transform| {
            let store = store.clone();
            async move {
                store.apply_transform(&t)?;
                Ok(vec![t])
            }
            .boxed()
        });
        self.inner.core.ingest(transform, handler).await
    }
}

#[async_trait]
impl Updatable for Store {
    async fn update(&self, transform: Transform) -> Result<Vec<Transform>> {
        let store = self.clone();
        let handler: UpdateHandler = Arc::new(move |t: Transform| {
            let store = store.clone();
            async move { store.transform(t).await }.boxed()
        });
        self.inner.core.perform_update(transform, handler).await
    }
}

#[async_trait]
impl Queryable for Store {
    async fn query(&self, query: QueryExpression) -> Result<QueryResult> {
        let store = self.clone();
        let handler: QueryHandler = Arc::new(move |q: QueryExpression| {
            let store = store.clone();
            async move { store.evaluate(&q) }.boxed()
        });
        self.inner.core.perform_query(query, handler).await
    }
}
