//! The JSON:API source.
//!
//! Transforms and updates map each operation onto one HTTP request;
//! queries fetch documents and come back as transforms. Request caps are
//! enforced before anything is dispatched, and a mid-sequence failure
//! aborts the remaining requests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use tether_core::{
    Error, KeyMap, Operation, QueryExpression, Record, Result, Schema, Transform,
};
use tether_source::{
    EventBus, Fetchable, FetchHandler, Source, SourceCore, SourceSettings, Transformable,
    TransformHandler, Updatable, UpdateHandler,
};

use crate::client::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::serializer::{JsonApiSerializer, PrimaryData, ResourceDocument};
use crate::url::UrlBuilder;

/// Configuration for a [`JsonApiSource`].
#[derive(Debug, Clone)]
pub struct JsonApiConfig {
    /// Optional scheme-and-host prefix (`https://api.example.com`).
    pub host: Option<String>,
    /// Optional path namespace (`api/v1`).
    pub namespace: Option<String>,
    /// The key name mapping local ids to resource ids.
    pub key: String,
    /// Cap on requests a single transform or update may fan out into.
    pub max_requests_per_transform: Option<usize>,
    /// Cap on requests a single fetch may fan out into.
    pub max_requests_per_fetch: Option<usize>,
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            host: None,
            namespace: None,
            key: "remoteId".to_string(),
            max_requests_per_transform: None,
            max_requests_per_fetch: None,
        }
    }
}

/// Source talking to a JSON:API server.
///
/// Cloning is cheap and shares the transport and key map.
#[derive(Clone)]
pub struct JsonApiSource {
    inner: Arc<JsonApiInner>,
}

struct JsonApiInner {
    core: SourceCore,
    config: JsonApiConfig,
    serializer: JsonApiSerializer,
    urls: UrlBuilder,
    key_map: Arc<KeyMap>,
    client: Arc<dyn HttpClient>,
}

impl JsonApiSource {
    /// Create a source over the given transport.
    pub fn new(
        name: impl Into<String>,
        schema: Arc<Schema>,
        key_map: Arc<KeyMap>,
        config: JsonApiConfig,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        let serializer = JsonApiSerializer::new(schema, Arc::clone(&key_map), config.key.clone());
        let urls = UrlBuilder::new(config.host.clone(), config.namespace.clone());
        Self {
            inner: Arc::new(JsonApiInner {
                core: SourceCore::new(SourceSettings::named(name)),
                serializer,
                urls,
                key_map,
                client,
                config,
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

    /// Send one request, mapping non-2xx responses to server errors
    /// carrying the parsed error document.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(source = %self.inner.core.name(), method = %request.method, url = %request.url, "dispatching");
        let response = self.inner.client.send(request).await?;
        if !response.is_success() {
            return Err(Error::Server {
                status: response.status,
                payload: response.body.clone().unwrap_or(Value::Null),
            });
        }
        Ok(response)
    }

    /// Build the request for one operation, per the operation→request
    /// table this API speaks.
    fn request_for(&self, op: &Operation) -> Result<HttpRequest> {
        let s = &self.inner.serializer;
        let urls = &self.inner.urls;

        let request = match op {
            Operation::AddRecord { record } => {
                let resource = s.serialize_record(record);
                HttpRequest::new(
                    HttpMethod::Post,
                    urls.resource(&s.resource_kind(&record.kind), None),
                    Some(json!({ "data": resource })),
                )
            }
            Operation::ReplaceRecord { record } => {
                let identity = record.identity();
                let id = s.require_resource_id(&identity)?;
                let resource = s.serialize_record(record);
                HttpRequest::new(
                    HttpMethod::Patch,
                    urls.resource(&s.resource_kind(&record.kind), Some(&id)),
                    Some(json!({ "data": resource })),
                )
            }
            Operation::RemoveRecord { record } => {
                let id = s.require_resource_id(record)?;
                HttpRequest::new(
                    HttpMethod::Delete,
                    urls.resource(&s.resource_kind(&record.kind), Some(&id)),
                    None,
                )
            }
            Operation::ReplaceKey { record, key, value } => {
                // The key map is updated before the request is built, so
                // the new value addresses the resource when it names the
                // configured key.
                self.inner.key_map.set(&record.kind, key, value, &record.id);
                let id = s.require_resource_id(record)?;
                let kind = s.resource_kind(&record.kind);
                HttpRequest::new(
                    HttpMethod::Patch,
                    urls.resource(&kind, Some(&id)),
                    Some(json!({ "data": { "type": kind, "id": id } })),
                )
            }
            Operation::ReplaceAttribute {
                record,
                attribute,
                value,
            } => {
                let id = s.require_resource_id(record)?;
                let kind = s.resource_kind(&record.kind);
                let mut attributes = serde_json::Map::new();
                attributes.insert(attribute.clone(), value.clone());
                HttpRequest::new(
                    HttpMethod::Patch,
                    urls.resource(&kind, Some(&id)),
                    Some(json!({
                        "data": { "type": kind, "id": id, "attributes": attributes }
                    })),
                )
            }
            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                let id = s.require_resource_id(record)?;
                let related = s.identifier(related_record)?;
                HttpRequest::new(
                    HttpMethod::Post,
                    urls.relationship(&s.resource_kind(&record.kind), &id, relationship),
                    Some(json!({ "data": [related] })),
                )
            }
            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                let id = s.require_resource_id(record)?;
                let related = s.identifier(related_record)?;
                HttpRequest::new(
                    HttpMethod::Delete,
                    urls.relationship(&s.resource_kind(&record.kind), &id, relationship),
                    Some(json!({ "data": [related] })),
                )
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                let id = s.require_resource_id(record)?;
                let kind = s.resource_kind(&record.kind);
                let related: Vec<_> = related_records
                    .iter()
                    .map(|identity| s.identifier(identity))
                    .collect::<Result<_>>()?;
                let mut relationships = serde_json::Map::new();
                relationships.insert(relationship.clone(), json!({ "data": related }));
                HttpRequest::new(
                    HttpMethod::Patch,
                    urls.resource(&kind, Some(&id)),
                    Some(json!({
                        "data": { "type": kind, "id": id, "relationships": relationships }
                    })),
                )
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                let id = s.require_resource_id(record)?;
                let kind = s.resource_kind(&record.kind);
                let related = match related_record {
                    Some(identity) => json!(s.identifier(identity)?),
                    None => Value::Null,
                };
                let mut relationships = serde_json::Map::new();
                relationships.insert(relationship.clone(), json!({ "data": related }));
                HttpRequest::new(
                    HttpMethod::Patch,
                    urls.resource(&kind, Some(&id)),
                    Some(json!({
                        "data": { "type": kind, "id": id, "relationships": relationships }
                    })),
                )
            }
        };
        Ok(request)
    }

    /// Digest a mutation response: bind server-assigned ids for adds and
    /// turn any returned document into a replace-record transform.
    fn digest_response(&self, op: &Operation, response: &HttpResponse) -> Result<Option<Transform>> {
        let Some(body) = &response.body else {
            return Ok(None);
        };
        if body.get("data").is_none() {
            return Ok(None);
        }
        let document: ResourceDocument = serde_json::from_value(body.clone())
            .map_err(Error::serialization)?;
        let PrimaryData::One(Some(resource)) = document.data else {
            return Ok(None);
        };

        // Bind a server-assigned id to the record the caller created, so
        // deserialization resolves to the existing local record.
        if let Operation::AddRecord { record } = op {
            if let Some(remote_id) = resource.id.as_deref() {
                self.inner.key_map.set(
                    &record.kind,
                    &self.inner.config.key,
                    remote_id,
                    &record.id,
                );
            }
        }

        let record = self.inner.serializer.deserialize_resource(&resource)?;
        Ok(Some(Transform::from_operation(Operation::ReplaceRecord {
            record,
        })))
    }

    /// Apply a transform's operations as a request sequence.
    async fn execute_transform(&self, transform: Transform) -> Result<Vec<Transform>> {
        if let Some(cap) = self.inner.config.max_requests_per_transform {
            if transform.operations.len() > cap {
                return Err(Error::NotAllowed(format!(
                    "transform fans out into {} requests (cap {cap})",
                    transform.operations.len()
                )));
            }
        }

        let mut results = vec![transform.clone()];
        for op in &transform.operations {
            let request = self.request_for(op)?;
            let response = self.send(request).await?;
            if let Some(extra) = self.digest_response(op, &response)? {
                results.push(extra);
            }
        }
        Ok(results)
    }

    /// Fetch the documents matching a query, as transforms.
    async fn execute_fetch(&self, query: QueryExpression) -> Result<Vec<Transform>> {
        if let Some(cap) = self.inner.config.max_requests_per_fetch {
            if cap < 1 {
                return Err(Error::NotAllowed(format!(
                    "fetch fans out into 1 request (cap {cap})"
                )));
            }
        }

        let s = &self.inner.serializer;
        let urls = &self.inner.urls;
        let url = match &query {
            QueryExpression::Records { kind } => urls.resource(&s.resource_kind(kind), None),
            QueryExpression::Record { record } => {
                let id = s.require_resource_id(record)?;
                urls.resource(&s.resource_kind(&record.kind), Some(&id))
            }
            QueryExpression::RelatedRecord {
                record,
                relationship,
            }
            | QueryExpression::RelatedRecords {
                record,
                relationship,
            } => {
                let id = s.require_resource_id(record)?;
                urls.related(&s.resource_kind(&record.kind), &id, relationship)
            }
        };

        let response = self.send(HttpRequest::new(HttpMethod::Get, url, None)).await?;
        let Some(body) = response.body else {
            return Ok(vec![]);
        };
        let document: ResourceDocument =
            serde_json::from_value(body).map_err(Error::serialization)?;

        let resources = match document.data {
            PrimaryData::Many(resources) => resources,
            PrimaryData::One(Some(resource)) => vec![resource],
            PrimaryData::One(None) => vec![],
        };

        let records: Vec<Record> = resources
            .iter()
            .map(|resource| s.deserialize_resource(resource))
            .collect::<Result<_>>()?;
        let operations: Vec<Operation> = records
            .into_iter()
            .map(|record| Operation::ReplaceRecord { record })
            .collect();

        if operations.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![Transform::new(operations)])
        }
    }
}

impl Source for JsonApiSource {
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

    fn as_fetchable(self: Arc<Self>) -> Option<Arc<dyn Fetchable>> {
        Some(self)
    }
}

#[async_trait]
impl Transformable for JsonApiSource {
    async fn transform(&self, transform: Transform) -> Result<Vec<Transform>> {
        let source = self.clone();
        let handler: TransformHandler = Arc::new(move |t: Transform| {
            let source = source.clone();
            async move { source.execute_transform(t).await }.boxed()
        });
        self.inner.core.ingest(transform, handler).await
    }
}

#[async_trait]
impl Updatable for JsonApiSource {
    async fn update(&self, transform: Transform) -> Result<Vec<Transform>> {
        let source = self.clone();
        let handler: UpdateHandler = Arc::new(move |t: Transform| {
            let source = source.clone();
            async move { source.execute_transform(t).await }.boxed()
        });
        self.inner.core.perform_update(transform, handler).await
    }
}

#[async_trait]
impl Fetchable for JsonApiSource {
    async fn fetch(&self, query: QueryExpression) -> Result<Vec<Transform>> {
        let source = self.clone();
        let handler: FetchHandler = Arc::new(move |q: QueryExpression| {
            let source = source.clone();
            async move { source.execute_fetch(q).await }.boxed()
        });
        self.inner.core.perform_fetch(query, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;
    use tether_core::RecordIdentity;
    use tether_testkit::{planet, TestFixture};

    struct Rig {
        source: JsonApiSource,
        client: Arc<MockClient>,
        fixture: TestFixture,
    }

    fn rig(config: JsonApiConfig) -> Rig {
        let fixture = TestFixture::new();
        let client = Arc::new(MockClient::new());
        let source = JsonApiSource::new(
            "remote",
            fixture.schema.clone(),
            fixture.key_map.clone(),
            config,
            client.clone(),
        );
        Rig {
            source,
            client,
            fixture,
        }
    }

    fn default_rig() -> Rig {
        rig(JsonApiConfig::default())
    }

    #[tokio::test]
    async fn add_record_posts_and_digests_response() {
        let r = default_rig();
        r.client.respond_with(
            201,
            Some(json!({
                "data": {
                    "type": "planets",
                    "id": "12345",
                    "attributes": { "name": "Pluto", "classification": "dwarf" },
                }
            })),
        );

        let t = Transform::from_operation(Operation::AddRecord {
            record: planet("p1", "Pluto"),
        });
        let results = r.source.update(t.clone()).await.unwrap();

        let requests = r.client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "/planets");
        assert_eq!(
            requests[0].body.as_ref().unwrap()["data"]["attributes"]["name"],
            json!("Pluto")
        );

        // Original transform plus the server-enriched replacement.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, t.id);
        match &results[1].operations[0] {
            Operation::ReplaceRecord { record } => {
                assert_eq!(record.id, "p1");
                assert_eq!(record.keys["remoteId"], "12345");
                assert_eq!(record.attribute("classification"), Some(&json!("dwarf")));
            }
            other => panic!("expected replaceRecord, got {other:?}"),
        }
        assert_eq!(
            r.fixture.key_map.id_for_key("planet", "remoteId", "12345"),
            Some("p1".to_string())
        );
    }

    #[tokio::test]
    async fn server_rejection_carries_error_document() {
        let r = default_rig();
        r.client.respond_with(
            422,
            Some(json!({
                "errors": [{ "detail": "Pluto isn't really a planet!" }]
            })),
        );

        let err = r
            .source
            .update(Transform::from_operation(Operation::AddRecord {
                record: planet("p1", "Pluto"),
            }))
            .await
            .unwrap_err();

        match err {
            Error::Server { status, payload } => {
                assert_eq!(status, 422);
                assert_eq!(
                    payload["errors"][0]["detail"],
                    json!("Pluto isn't really a planet!")
                );
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn operation_request_mapping() {
        let r = default_rig();
        r.fixture.key_map.set("planet", "remoteId", "1", "p1");
        r.fixture.key_map.set("moon", "remoteId", "m1", "io");
        for _ in 0..5 {
            r.client.respond_with(204, None);
        }

        let ops = vec![
            Operation::ReplaceAttribute {
                record: RecordIdentity::new("planet", "p1"),
                attribute: "name".to_string(),
                value: json!("Jupiter"),
            },
            Operation::AddToHasMany {
                record: RecordIdentity::new("planet", "p1"),
                relationship: "moons".to_string(),
                related_record: RecordIdentity::new("moon", "io"),
            },
            Operation::RemoveFromHasMany {
                record: RecordIdentity::new("planet", "p1"),
                relationship: "moons".to_string(),
                related_record: RecordIdentity::new("moon", "io"),
            },
            Operation::ReplaceHasOne {
                record: RecordIdentity::new("planet", "p1"),
                relationship: "next".to_string(),
                related_record: None,
            },
            Operation::RemoveRecord {
                record: RecordIdentity::new("planet", "p1"),
            },
        ];
        r.source.update(Transform::new(ops)).await.unwrap();

        let requests = r.client.requests();
        assert_eq!(requests.len(), 5);

        assert_eq!(requests[0].method, HttpMethod::Patch);
        assert_eq!(requests[0].url, "/planets/1");
        assert_eq!(
            requests[0].body.as_ref().unwrap()["data"]["attributes"]["name"],
            json!("Jupiter")
        );

        assert_eq!(requests[1].method, HttpMethod::Post);
        assert_eq!(requests[1].url, "/planets/1/relationships/moons");
        assert_eq!(
            requests[1].body.as_ref().unwrap()["data"],
            json!([{ "type": "moons", "id": "m1" }])
        );

        assert_eq!(requests[2].method, HttpMethod::Delete);
        assert_eq!(requests[2].url, "/planets/1/relationships/moons");
        assert_eq!(
            requests[2].body.as_ref().unwrap()["data"],
            json!([{ "type": "moons", "id": "m1" }])
        );

        assert_eq!(requests[3].method, HttpMethod::Patch);
        assert_eq!(requests[3].url, "/planets/1");
        assert_eq!(
            requests[3].body.as_ref().unwrap()["data"]["relationships"]["next"]["data"],
            Value::Null
        );

        assert_eq!(requests[4].method, HttpMethod::Delete);
        assert_eq!(requests[4].url, "/planets/1");
    }

    #[tokio::test]
    async fn request_cap_rejects_before_dispatch() {
        let r = rig(JsonApiConfig {
            max_requests_per_transform: Some(1),
            ..JsonApiConfig::default()
        });
        r.fixture.key_map.set("planet", "remoteId", "1", "p1");

        let err = r
            .source
            .update(Transform::new(vec![
                Operation::ReplaceAttribute {
                    record: RecordIdentity::new("planet", "p1"),
                    attribute: "name".to_string(),
                    value: json!("a"),
                },
                Operation::ReplaceAttribute {
                    record: RecordIdentity::new("planet", "p1"),
                    attribute: "name".to_string(),
                    value: json!("b"),
                },
            ]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotAllowed(_)));
        assert!(r.client.requests().is_empty());
    }

    #[tokio::test]
    async fn mid_sequence_failure_aborts_remaining_requests() {
        let r = default_rig();
        r.fixture.key_map.set("planet", "remoteId", "1", "p1");
        r.client.respond_with(204, None);
        r.client.respond_with(500, Some(json!({"errors": []})));
        r.client.respond_with(204, None);

        let err = r
            .source
            .update(Transform::new(vec![
                Operation::ReplaceAttribute {
                    record: RecordIdentity::new("planet", "p1"),
                    attribute: "name".to_string(),
                    value: json!("a"),
                },
                Operation::ReplaceAttribute {
                    record: RecordIdentity::new("planet", "p1"),
                    attribute: "name".to_string(),
                    value: json!("b"),
                },
                Operation::ReplaceAttribute {
                    record: RecordIdentity::new("planet", "p1"),
                    attribute: "name".to_string(),
                    value: json!("c"),
                },
            ]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Server { status: 500, .. }));
        assert_eq!(r.client.requests().len(), 2);
    }

    #[tokio::test]
    async fn fetch_records_returns_transforms() {
        let r = default_rig();
        r.client.respond_with(
            200,
            Some(json!({
                "data": [
                    { "type": "planets", "id": "1", "attributes": { "name": "Jupiter" } },
                    { "type": "planets", "id": "2", "attributes": { "name": "Saturn" } },
                ]
            })),
        );

        let transforms = r
            .source
            .fetch(QueryExpression::Records {
                kind: "planet".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(r.client.requests()[0].url, "/planets");
        assert_eq!(transforms.len(), 1);
        assert_eq!(transforms[0].operations.len(), 2);
    }

    #[tokio::test]
    async fn fetch_single_record_by_remote_id() {
        let r = default_rig();
        r.fixture.key_map.set("planet", "remoteId", "1", "p1");
        r.client.respond_with(
            200,
            Some(json!({
                "data": { "type": "planets", "id": "1", "attributes": { "name": "Jupiter" } }
            })),
        );

        let transforms = r
            .source
            .fetch(QueryExpression::Record {
                record: RecordIdentity::new("planet", "p1"),
            })
            .await
            .unwrap();

        assert_eq!(r.client.requests()[0].url, "/planets/1");
        assert_eq!(transforms.len(), 1);
        match &transforms[0].operations[0] {
            Operation::ReplaceRecord { record } => assert_eq!(record.id, "p1"),
            other => panic!("expected replaceRecord, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_key_addresses_resource_by_new_value() {
        let r = default_rig();
        r.client.respond_with(204, None);

        r.source
            .update(Transform::from_operation(Operation::ReplaceKey {
                record: RecordIdentity::new("planet", "p1"),
                key: "remoteId".to_string(),
                value: "42".to_string(),
            }))
            .await
            .unwrap();

        let requests = r.client.requests();
        assert_eq!(requests[0].method, HttpMethod::Patch);
        assert_eq!(requests[0].url, "/planets/42");
        assert_eq!(
            r.fixture.key_map.key_for_id("planet", "remoteId", "p1"),
            Some("42".to_string())
        );
    }
}
