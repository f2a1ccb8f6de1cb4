//! The SQLite-backed source.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use rusqlite::{params, Connection, OptionalExtension};
use tether_core::{
    Error, Operation, QueryExpression, QueryResult, Record, RecordIdentity, Records,
    RelationshipData, Result, Transform,
};
use tether_source::{
    EventBus, Queryable, QueryHandler, Source, SourceCore, SourceSettings, Transformable,
    TransformHandler,
};

/// The stable storage key for a record identity.
pub fn record_key(namespace: &str, identity: &RecordIdentity) -> String {
    format!("{namespace}/{identity}")
}

/// Configuration for a [`SqliteSource`].
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Key prefix isolating this store's records within a shared file.
    pub namespace: String,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "tether".to_string(),
        }
    }
}

/// Source persisting records in SQLite.
///
/// Operations apply to stored documents; an operation addressing a record
/// this replica has never seen starts from an empty record rather than
/// failing, so partial replicas keep syncing.
#[derive(Clone)]
pub struct SqliteSource {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    core: SourceCore,
    conn: Arc<Mutex<Connection>>,
    namespace: String,
}

impl SqliteSource {
    /// Open (and migrate) a database file.
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        config: LocalStoreConfig,
    ) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::storage)?;
        Self::with_connection(name, conn, config)
    }

    /// Open an in-memory database, for tests.
    pub fn open_memory(name: impl Into<String>, config: LocalStoreConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage)?;
        Self::with_connection(name, conn, config)
    }

    fn with_connection(
        name: impl Into<String>,
        conn: Connection,
        config: LocalStoreConfig,
    ) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                key  TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                id   TEXT NOT NULL,
                doc  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS records_by_kind ON records (kind);",
        )
        .map_err(Error::storage)?;

        Ok(Self {
            inner: Arc::new(SqliteInner {
                core: SourceCore::new(SourceSettings::named(name)),
                conn: Arc::new(Mutex::new(conn)),
                namespace: config.namespace,
            }),
        })
    }

    /// The source core (log and queue introspection).
    pub fn core(&self) -> &SourceCore {
        &self.inner.core
    }

    /// Whether a record is persisted. Externally testable.
    pub async fn contains(&self, identity: &RecordIdentity) -> Result<bool> {
        let identity = identity.clone();
        self.blocking(move |conn, namespace| {
            let key = record_key(namespace, &identity);
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM records WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )
            .map_err(Error::storage)
        })
        .await
    }

    /// Read one persisted record.
    pub async fn record(&self, identity: &RecordIdentity) -> Result<Option<Record>> {
        let identity = identity.clone();
        self.blocking(move |conn, namespace| read_record(conn, namespace, &identity)).await
    }

    /// Read every persisted record of a type.
    pub async fn records_of_kind(&self, kind: &str) -> Result<Vec<Record>> {
        let kind = kind.to_string();
        let namespace_filter = format!("{}/%", self.inner.namespace);
        self.blocking(move |conn, _| {
            let mut stmt = conn
                .prepare("SELECT doc FROM records WHERE kind = ?1 AND key LIKE ?2 ORDER BY id")
                .map_err(Error::storage)?;
            let docs = stmt
                .query_map(params![kind, namespace_filter], |row| {
                    row.get::<_, String>(0)
                })
                .map_err(Error::storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(Error::storage)?;
            docs.iter()
                .map(|doc| serde_json::from_str(doc).map_err(Error::serialization))
                .collect()
        })
        .await
    }

    /// Replace this namespace's contents wholesale.
    pub async fn reset(&self, data: Records) -> Result<()> {
        self.blocking(move |conn, namespace| {
            let tx = conn.transaction().map_err(Error::storage)?;
            let prefix = format!("{namespace}/%");
            tx.execute("DELETE FROM records WHERE key LIKE ?1", params![prefix])
                .map_err(Error::storage)?;
            for by_id in data.values() {
                for record in by_id.values() {
                    write_record(&tx, namespace, record)?;
                }
            }
            tx.commit().map_err(Error::storage)
        })
        .await
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection, &str) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.inner.conn);
        let namespace = self.inner.namespace.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| Error::storage(format!("connection mutex poisoned: {e}")))?;
            f(&mut conn, &namespace)
        })
        .await
        .map_err(|e| Error::storage(format!("blocking task failed: {e}")))?
    }

    async fn apply(&self, transform: Transform) -> Result<()> {
        self.blocking(move |conn, namespace| {
            let tx = conn.transaction().map_err(Error::storage)?;
            for op in &transform.operations {
                apply_operation(&tx, namespace, op)?;
            }
            tx.commit().map_err(Error::storage)
        })
        .await
    }

    async fn evaluate(&self, query: QueryExpression) -> Result<QueryResult> {
        match query {
            QueryExpression::Record { record } => {
                let found = self.record(&record).await?;
                found
                    .map(|r| QueryResult::Record(Some(r)))
                    .ok_or_else(|| Error::record_not_found(&record.kind, &record.id))
            }
            QueryExpression::Records { kind } => {
                Ok(QueryResult::Records(self.records_of_kind(&kind).await?))
            }
            QueryExpression::RelatedRecord {
                record,
                relationship,
            } => {
                let owner = self
                    .record(&record)
                    .await?
                    .ok_or_else(|| Error::record_not_found(&record.kind, &record.id))?;
                let related = match owner.relationship(&relationship) {
                    Some(RelationshipData::HasOne { data: Some(identity) }) => {
                        self.record(identity).await?
                    }
                    _ => None,
                };
                Ok(QueryResult::Record(related))
            }
            QueryExpression::RelatedRecords {
                record,
                relationship,
            } => {
                let owner = self
                    .record(&record)
                    .await?
                    .ok_or_else(|| Error::record_not_found(&record.kind, &record.id))?;
                let members = owner
                    .relationship(&relationship)
                    .map(|slot| slot.identities())
                    .unwrap_or_default();
                let mut records = Vec::new();
                for identity in members {
                    if let Some(found) = self.record(&identity).await? {
                        records.push(found);
                    }
                }
                Ok(QueryResult::Records(records))
            }
        }
    }
}

fn read_record(conn: &Connection, namespace: &str, identity: &RecordIdentity) -> Result<Option<Record>> {
    let key = record_key(namespace, identity);
    let doc: Option<String> = conn
        .query_row("SELECT doc FROM records WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(Error::storage)?;
    doc.map(|doc| serde_json::from_str(&doc).map_err(Error::serialization))
        .transpose()
}

fn write_record(conn: &Connection, namespace: &str, record: &Record) -> Result<()> {
    let key = record_key(namespace, &record.identity());
    let doc = serde_json::to_string(record).map_err(Error::serialization)?;
    conn.execute(
        "INSERT INTO records (key, kind, id, doc) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key) DO UPDATE SET doc = excluded.doc",
        params![key, record.kind, record.id, doc],
    )
    .map_err(Error::storage)?;
    Ok(())
}

fn delete_record(conn: &Connection, namespace: &str, identity: &RecordIdentity) -> Result<()> {
    let key = record_key(namespace, identity);
    conn.execute("DELETE FROM records WHERE key = ?1", params![key])
        .map_err(Error::storage)?;
    Ok(())
}

/// The stored record for an identity, or an empty one if never seen.
fn read_or_new(conn: &Connection, namespace: &str, identity: &RecordIdentity) -> Result<Record> {
    Ok(read_record(conn, namespace, identity)?
        .unwrap_or_else(|| Record::new(identity.kind.clone(), identity.id.clone())))
}

fn apply_operation(conn: &Connection, namespace: &str, op: &Operation) -> Result<()> {
    match op {
        Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
            write_record(conn, namespace, record)
        }
        Operation::RemoveRecord { record } => delete_record(conn, namespace, record),
        Operation::ReplaceKey { record, key, value } => {
            let mut target = read_or_new(conn, namespace, record)?;
            target.keys.insert(key.clone(), value.clone());
            write_record(conn, namespace, &target)
        }
        Operation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => {
            let mut target = read_or_new(conn, namespace, record)?;
            target.attributes.insert(attribute.clone(), value.clone());
            write_record(conn, namespace, &target)
        }
        Operation::AddToHasMany {
            record,
            relationship,
            related_record,
        } => {
            let mut target = read_or_new(conn, namespace, record)?;
            let slot = target
                .relationships
                .entry(relationship.clone())
                .or_insert_with(RelationshipData::many);
            if let RelationshipData::HasMany { data } = slot {
                data.insert(related_record.clone());
            } else {
                *slot = RelationshipData::many_of([related_record.clone()]);
            }
            write_record(conn, namespace, &target)
        }
        Operation::RemoveFromHasMany {
            record,
            relationship,
            related_record,
        } => {
            let mut target = read_or_new(conn, namespace, record)?;
            if let Some(RelationshipData::HasMany { data }) =
                target.relationships.get_mut(relationship)
            {
                data.remove(related_record);
            }
            write_record(conn, namespace, &target)
        }
        Operation::ReplaceHasMany {
            record,
            relationship,
            related_records,
        } => {
            let mut target = read_or_new(conn, namespace, record)?;
            target.relationships.insert(
                relationship.clone(),
                RelationshipData::many_of(related_records.iter().cloned()),
            );
            write_record(conn, namespace, &target)
        }
        Operation::ReplaceHasOne {
            record,
            relationship,
            related_record,
        } => {
            let mut target = read_or_new(conn, namespace, record)?;
            target.relationships.insert(
                relationship.clone(),
                RelationshipData::one(related_record.clone()),
            );
            write_record(conn, namespace, &target)
        }
    }
}

impl Source for SqliteSource {
    fn name(&self) -> &str {
        self.inner.core.name()
    }

    fn bus(&self) -> &EventBus {
        self.inner.core.bus()
    }

    fn as_transformable(self: Arc<Self>) -> Option<Arc<dyn Transformable>> {
        Some(self)
    }

    fn as_queryable(self: Arc<Self>) -> Option<Arc<dyn Queryable>> {
        Some(self)
    }
}

#[async_trait]
impl Transformable for SqliteSource {
    async fn transform(&self, transform: Transform) -> Result<Vec<Transform>> {
        let source = self.clone();
        let handler: TransformHandler = Arc::new(move |t: Transform| {
            let source = source.clone();
            async move {
                source.apply(t.clone()).await?;
                Ok(vec![t])
            }
            .boxed()
        });
        self.inner.core.ingest(transform, handler).await
    }
}

#[async_trait]
impl Queryable for SqliteSource {
    async fn query(&self, query: QueryExpression) -> Result<QueryResult> {
        let source = self.clone();
        let handler: QueryHandler = Arc::new(move |q: QueryExpression| {
            let source = source.clone();
            async move { source.evaluate(q).await }.boxed()
        });
        self.inner.core.perform_query(query, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_testkit::{moon, planet};

    fn source() -> SqliteSource {
        SqliteSource::open_memory("backup", LocalStoreConfig::default()).unwrap()
    }

    fn jupiter_id() -> RecordIdentity {
        RecordIdentity::new("planet", "jupiter")
    }

    #[test]
    fn record_keys_are_stable() {
        assert_eq!(
            record_key("tether", &RecordIdentity::new("planet", "jupiter")),
            "tether/planet:jupiter"
        );
    }

    #[tokio::test]
    async fn add_then_remove_record() {
        let source = source();
        source
            .transform(Transform::from_operation(Operation::AddRecord {
                record: planet("jupiter", "Jupiter"),
            }))
            .await
            .unwrap();
        assert!(source.contains(&jupiter_id()).await.unwrap());

        let stored = source.record(&jupiter_id()).await.unwrap().unwrap();
        assert_eq!(stored.attribute("name"), Some(&json!("Jupiter")));

        source
            .transform(Transform::from_operation(Operation::RemoveRecord {
                record: jupiter_id(),
            }))
            .await
            .unwrap();
        assert!(!source.contains(&jupiter_id()).await.unwrap());
    }

    #[tokio::test]
    async fn operations_on_unseen_records_start_empty() {
        let source = source();
        source
            .transform(Transform::from_operation(Operation::ReplaceAttribute {
                record: jupiter_id(),
                attribute: "name".to_string(),
                value: json!("Jupiter"),
            }))
            .await
            .unwrap();

        let stored = source.record(&jupiter_id()).await.unwrap().unwrap();
        assert_eq!(stored.attribute("name"), Some(&json!("Jupiter")));
    }

    #[tokio::test]
    async fn relationship_operations_persist() {
        let source = source();
        let io = RecordIdentity::new("moon", "io");
        source
            .transform(Transform::new(vec![
                Operation::AddRecord {
                    record: planet("jupiter", "Jupiter"),
                },
                Operation::AddRecord {
                    record: moon("io", "Io"),
                },
                Operation::AddToHasMany {
                    record: jupiter_id(),
                    relationship: "moons".to_string(),
                    related_record: io.clone(),
                },
                Operation::ReplaceHasOne {
                    record: io.clone(),
                    relationship: "planet".to_string(),
                    related_record: Some(jupiter_id()),
                },
            ]))
            .await
            .unwrap();

        let stored = source.record(&jupiter_id()).await.unwrap().unwrap();
        assert!(stored.relationship("moons").unwrap().contains(&io));

        let result = source
            .query(QueryExpression::RelatedRecords {
                record: jupiter_id(),
                relationship: "moons".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(result.records().unwrap().len(), 1);

        source
            .transform(Transform::from_operation(Operation::RemoveFromHasMany {
                record: jupiter_id(),
                relationship: "moons".to_string(),
                related_record: io.clone(),
            }))
            .await
            .unwrap();
        let stored = source.record(&jupiter_id()).await.unwrap().unwrap();
        assert!(stored.relationship("moons").unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_transform_is_skipped() {
        let source = source();
        let t = Transform::from_operation(Operation::AddRecord {
            record: planet("jupiter", "Jupiter"),
        });
        assert_eq!(source.transform(t.clone()).await.unwrap().len(), 1);
        assert!(source.transform(t).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn namespaces_isolate_records() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let a = SqliteSource::open(
            "a",
            file.path(),
            LocalStoreConfig {
                namespace: "a".to_string(),
            },
        )
        .unwrap();
        a.transform(Transform::from_operation(Operation::AddRecord {
            record: planet("jupiter", "Jupiter"),
        }))
        .await
        .unwrap();

        let b = SqliteSource::open(
            "b",
            file.path(),
            LocalStoreConfig {
                namespace: "b".to_string(),
            },
        )
        .unwrap();
        assert!(!b.contains(&jupiter_id()).await.unwrap());
        assert!(a.contains(&jupiter_id()).await.unwrap());
        assert!(b.records_of_kind("planet").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_replaces_namespace_contents() {
        let source = source();
        source
            .transform(Transform::from_operation(Operation::AddRecord {
                record: planet("mars", "Mars"),
            }))
            .await
            .unwrap();

        let mut data = Records::new();
        data.entry("planet".to_string())
            .or_default()
            .insert("jupiter".to_string(), planet("jupiter", "Jupiter"));
        source.reset(data).await.unwrap();

        assert!(source.contains(&jupiter_id()).await.unwrap());
        assert!(!source
            .contains(&RecordIdentity::new("planet", "mars"))
            .await
            .unwrap());
    }
}
