//! The shared source lifecycle.
//!
//! Concrete sources compose a [`SourceCore`] with their own `apply` /
//! `run` hooks. The core owns the event bus, the two action queues, and
//! the applied-transform log, and drives the ingress/egress protocols:
//!
//! - **transform** (ingress): dedup by id → queue on the sync queue →
//!   `BeforeTransform` in series → apply → record ids and announce each
//!   applied transform with settle
//! - **update / query / fetch** (egress): queue on the request queue →
//!   `Before*` in series (the veto point request strategies hook) → run →
//!   trailing event with settle

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tether_core::{QueryExpression, QueryResult, Result, Transform};

use crate::evented::{EventBus, EventPayload, Response, SourceEvent};
use crate::log::{TransformLog, DEFAULT_LOG_LIMIT};
use crate::queue::{ActionQueue, ActionTask};

/// Applies a transform to a source's backing state, returning every
/// transform that ended up applied (commonly the input itself).
pub type TransformHandler =
    Arc<dyn Fn(Transform) -> BoxFuture<'static, Result<Vec<Transform>>> + Send + Sync>;

/// Runs an update against a source, returning the resulting transforms.
pub type UpdateHandler =
    Arc<dyn Fn(Transform) -> BoxFuture<'static, Result<Vec<Transform>>> + Send + Sync>;

/// Evaluates a query against a source.
pub type QueryHandler =
    Arc<dyn Fn(QueryExpression) -> BoxFuture<'static, Result<QueryResult>> + Send + Sync>;

/// Fetches remote data for a query, expressed as transforms.
pub type FetchHandler =
    Arc<dyn Fn(QueryExpression) -> BoxFuture<'static, Result<Vec<Transform>>> + Send + Sync>;

/// Construction settings for a source.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// The source name, used in logs and coordinator wiring.
    pub name: String,
    /// Maximum retained applied-transform ids.
    pub transform_log_limit: usize,
}

impl SourceSettings {
    /// Settings with the default log limit.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform_log_limit: DEFAULT_LOG_LIMIT,
        }
    }
}

/// The state and lifecycle shared by every source implementation.
#[derive(Clone)]
pub struct SourceCore {
    inner: Arc<CoreInner>,
}

struct CoreInner {
    name: String,
    bus: EventBus,
    request_queue: ActionQueue<Response>,
    sync_queue: ActionQueue<Vec<Transform>>,
    log: TransformLog,
}

impl SourceCore {
    /// Create a core from settings.
    pub fn new(settings: SourceSettings) -> Self {
        let name = settings.name;
        Self {
            inner: Arc::new(CoreInner {
                bus: EventBus::new(name.clone()),
                request_queue: ActionQueue::new(format!("{name}/requests")),
                sync_queue: ActionQueue::new(format!("{name}/syncs")),
                log: TransformLog::new(settings.transform_log_limit),
                name,
            }),
        }
    }

    /// The source name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The source's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The applied-transform log.
    pub fn transform_log(&self) -> &TransformLog {
        &self.inner.log
    }

    /// The queue serializing transform ingestion.
    pub fn sync_queue(&self) -> &ActionQueue<Vec<Transform>> {
        &self.inner.sync_queue
    }

    /// The queue serializing updates, queries, and fetches.
    pub fn request_queue(&self) -> &ActionQueue<Response> {
        &self.inner.request_queue
    }

    /// Ingest a transform through the sync queue.
    ///
    /// Failures collected while announcing applied transforms (a blocking
    /// sync listener, for instance) fail the caller, after every listener
    /// has settled and applied ids were recorded.
    pub async fn ingest(&self, transform: Transform, apply: TransformHandler) -> Result<Vec<Transform>> {
        if self.inner.log.contains(&transform.id) {
            tracing::debug!(source = %self.inner.name, id = %transform.id, "transform already applied");
            return Ok(Vec::new());
        }

        let core = self.clone();
        let task: ActionTask<Vec<Transform>> = Box::new(move || {
            let core = core.clone();
            let apply = Arc::clone(&apply);
            let transform = transform.clone();
            async move {
                // Re-checked inside the queue: an earlier queued action may
                // have applied the same id.
                if core.inner.log.contains(&transform.id) {
                    return Ok(Vec::new());
                }

                core.inner
                    .bus
                    .series(
                        SourceEvent::BeforeTransform,
                        EventPayload::Transform(transform.clone()),
                    )
                    .await?;

                let applied = apply(transform).await?;

                let mut failures = Vec::new();
                for t in &applied {
                    core.inner.log.insert(t.id);
                    failures.extend(
                        core.inner
                            .bus
                            .settle(SourceEvent::Transform, EventPayload::Transform(t.clone()))
                            .await,
                    );
                }
                if let Some(err) = failures.into_iter().next() {
                    return Err(err);
                }
                Ok(applied)
            }
            .boxed()
        });

        self.inner.sync_queue.push(task).await
    }

    /// Run an update through the request queue.
    pub async fn perform_update(&self, transform: Transform, run: UpdateHandler) -> Result<Vec<Transform>> {
        let core = self.clone();
        let task: ActionTask<Response> = Box::new(move || {
            let core = core.clone();
            let run = Arc::clone(&run);
            let transform = transform.clone();
            async move {
                core.inner
                    .bus
                    .series(
                        SourceEvent::BeforeUpdate,
                        EventPayload::Transform(transform.clone()),
                    )
                    .await?;

                let result = run(transform.clone()).await?;

                core.inner
                    .bus
                    .settle(
                        SourceEvent::Update,
                        EventPayload::Updated {
                            transform,
                            result: result.clone(),
                        },
                    )
                    .await;

                Ok(Response::Transforms(result))
            }
            .boxed()
        });

        match self.inner.request_queue.push(task).await? {
            Response::Transforms(result) => Ok(result),
            Response::Query(_) => unreachable!("update action produced a query response"),
        }
    }

    /// Run a query through the request queue.
    pub async fn perform_query(&self, query: QueryExpression, run: QueryHandler) -> Result<QueryResult> {
        let core = self.clone();
        let task: ActionTask<Response> = Box::new(move || {
            let core = core.clone();
            let run = Arc::clone(&run);
            let query = query.clone();
            async move {
                core.inner
                    .bus
                    .series(SourceEvent::BeforeQuery, EventPayload::Query(query.clone()))
                    .await?;

                let result = run(query.clone()).await?;

                core.inner
                    .bus
                    .settle(
                        SourceEvent::Query,
                        EventPayload::Queried {
                            query,
                            result: result.clone(),
                        },
                    )
                    .await;

                Ok(Response::Query(result))
            }
            .boxed()
        });

        match self.inner.request_queue.push(task).await? {
            Response::Query(result) => Ok(result),
            Response::Transforms(_) => unreachable!("query action produced transforms"),
        }
    }

    /// Run a fetch through the request queue.
    pub async fn perform_fetch(&self, query: QueryExpression, run: FetchHandler) -> Result<Vec<Transform>> {
        let core = self.clone();
        let task: ActionTask<Response> = Box::new(move || {
            let core = core.clone();
            let run = Arc::clone(&run);
            let query = query.clone();
            async move {
                core.inner
                    .bus
                    .series(SourceEvent::BeforeQuery, EventPayload::Query(query.clone()))
                    .await?;

                let result = run(query.clone()).await?;

                core.inner
                    .bus
                    .settle(
                        SourceEvent::Query,
                        EventPayload::Fetched {
                            query,
                            result: result.clone(),
                        },
                    )
                    .await;

                Ok(Response::Transforms(result))
            }
            .boxed()
        });

        match self.inner.request_queue.push(task).await? {
            Response::Transforms(result) => Ok(result),
            Response::Query(_) => unreachable!("fetch action produced a query response"),
        }
    }
}
