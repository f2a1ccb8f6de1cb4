//! # Tether
//!
//! A client-side data synchronization engine. Applications issue queries
//! and transforms against a logical [`Store`]; the engine propagates those
//! operations to other sources — remote JSON:API servers, local
//! persistence — according to configured strategies, keeps relational
//! caches consistent through operation processors, and serializes
//! side-effectful work per source.
//!
//! ## Pieces
//!
//! - [`tether_core`] — records, operations, transforms, schema, key map
//! - [`tether_cache`] — the relational cache and its integrity processors
//! - [`tether_source`] — event bus, action queues, capability traits, [`Store`]
//! - [`tether_coordinator`] — node registry, sync and request strategies
//! - [`tether_remote`] — the JSON:API source
//! - [`tether_local`] — the SQLite-backed persistence source
//!
//! ## Wiring example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::{
//!     Coordinator, JsonApiConfig, JsonApiSource, KeyMap, ReqwestClient,
//!     RequestStrategy, RequestStrategyConfig, Schema, Store, SyncStrategy,
//!     SyncStrategyConfig,
//! };
//!
//! # fn wiring(schema: Arc<Schema>) -> tether::Result<()> {
//! let key_map = Arc::new(KeyMap::new());
//! let store = Arc::new(Store::with_key_map("store", schema.clone(), key_map.clone()));
//! let remote = Arc::new(JsonApiSource::new(
//!     "remote",
//!     schema,
//!     key_map,
//!     JsonApiConfig { host: Some("https://api.example.com".into()), ..Default::default() },
//!     Arc::new(ReqwestClient::new()),
//! ));
//!
//! let coordinator = Coordinator::new();
//! coordinator.add_source("store", store);
//! coordinator.add_source("remote", remote);
//! coordinator.add_strategy(Arc::new(RequestStrategy::new(
//!     RequestStrategyConfig::update("store", "remote").blocking().sync_results(),
//! )));
//! coordinator.add_strategy(Arc::new(SyncStrategy::new(
//!     SyncStrategyConfig::new("store", "remote"),
//! )));
//! coordinator.activate()?;
//! # Ok(())
//! # }
//! ```

pub use tether_cache::{
    Cache, InverseRelationshipProcessor, OperationProcessor, PatchContext,
    RelationshipIntegrityProcessor, ReverseIndex,
};
pub use tether_coordinator::{
    Coordinator, RequestEvent, RequestStrategy, RequestStrategyConfig, Strategy, SyncStrategy,
    SyncStrategyConfig, TargetRequest,
};
pub use tether_core::{
    records_from, AttributeDef, Dependent, Error, KeyMap, ModelDef, Operation, QueryExpression,
    QueryResult, Record, RecordIdentity, Records, RelationshipData, RelationshipDef,
    RelationshipKind, Result, Schema, SchemaBuilder, SchemaError, Transform, TransformId,
};
pub use tether_local::{LocalStoreConfig, SqliteSource};
pub use tether_remote::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, JsonApiConfig, JsonApiSource, MockClient,
    ReqwestClient, MEDIA_TYPE,
};
pub use tether_source::{
    ActionQueue, EventBus, EventPayload, Fetchable, Listener, ListenerId, Queryable, Source,
    SourceCore, SourceEvent, SourceSettings, Store, Transformable, TransformLog, Updatable,
};
