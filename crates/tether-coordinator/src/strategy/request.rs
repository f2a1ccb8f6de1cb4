//! Blocking RPC-style request forwarding.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tether_core::{Error, Result, Transform};
use tether_source::{
    EventPayload, Fetchable, SourceEvent, Transformable, Updatable,
};

use crate::coordinator::Coordinator;
use crate::strategy::{Installed, Strategy};

/// Which source event triggers the forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// Forward updates (listens on the before-update veto point).
    BeforeUpdate,
    /// Forward queries (listens on the before-query veto point).
    BeforeQuery,
}

/// Which request is invoked on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRequest {
    /// `target.update(transform)`.
    Update,
    /// `target.fetch(query)`.
    Fetch,
}

/// Configuration for a [`RequestStrategy`].
#[derive(Debug, Clone)]
pub struct RequestStrategyConfig {
    /// The node whose requests are forwarded.
    pub source_node: String,
    /// The node handling the forwarded request.
    pub target_node: String,
    /// Which source of the target node handles it.
    pub target_index: usize,
    /// The triggering event.
    pub source_event: RequestEvent,
    /// The target invocation.
    pub target_request: TargetRequest,
    /// Whether the source operation awaits the target call (and fails with
    /// it).
    pub blocking: bool,
    /// Whether transforms returned by the target are applied back to the
    /// originating source.
    pub sync_results: bool,
}

impl RequestStrategyConfig {
    /// Forward updates from one node to another.
    pub fn update(source_node: impl Into<String>, target_node: impl Into<String>) -> Self {
        Self {
            source_node: source_node.into(),
            target_node: target_node.into(),
            target_index: 0,
            source_event: RequestEvent::BeforeUpdate,
            target_request: TargetRequest::Update,
            blocking: false,
            sync_results: false,
        }
    }

    /// Forward queries from one node to another as fetches.
    pub fn query(source_node: impl Into<String>, target_node: impl Into<String>) -> Self {
        Self {
            source_node: source_node.into(),
            target_node: target_node.into(),
            target_index: 0,
            source_event: RequestEvent::BeforeQuery,
            target_request: TargetRequest::Fetch,
            blocking: false,
            sync_results: false,
        }
    }

    /// Make the forward blocking (builder style).
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Apply the target's resulting transforms back to the source
    /// (builder style).
    pub fn sync_results(mut self) -> Self {
        self.sync_results = true;
        self
    }

    /// Address a specific source of the target node (builder style).
    pub fn target_index(mut self, index: usize) -> Self {
        self.target_index = index;
        self
    }
}

/// Forwards a query or update from each source of one node to a target
/// source before the originating source proceeds.
///
/// The listener runs inside the source's series emission, so with
/// `blocking` a target rejection vetoes the source's operation. With
/// `sync_results` the target's resulting transforms are fed back through
/// `source.transform`, establishing eventual consistency from target to
/// source.
pub struct RequestStrategy {
    name: String,
    config: RequestStrategyConfig,
    installed: Mutex<Vec<Installed>>,
}

impl RequestStrategy {
    /// Create the strategy.
    pub fn new(config: RequestStrategyConfig) -> Self {
        Self {
            name: format!(
                "request:{}->{}",
                config.source_node, config.target_node
            ),
            config,
            installed: Mutex::new(Vec::new()),
        }
    }

    fn validate(&self) -> Result<()> {
        let consistent = matches!(
            (self.config.source_event, self.config.target_request),
            (RequestEvent::BeforeUpdate, TargetRequest::Update)
                | (RequestEvent::BeforeQuery, TargetRequest::Fetch)
        );
        if !consistent {
            return Err(Error::Coordinator(format!(
                "{}: {:?} cannot forward to {:?}",
                self.name, self.config.source_event, self.config.target_request
            )));
        }
        Ok(())
    }
}

impl Strategy for RequestStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&self, coordinator: &Coordinator) -> Result<()> {
        self.validate()?;

        let sources = coordinator.sources_of(&self.config.source_node)?;
        let target = coordinator.source_at(&self.config.target_node, self.config.target_index)?;
        let target_name = target.name().to_string();

        let updatable: Option<Arc<dyn Updatable>> = match self.config.target_request {
            TargetRequest::Update => Some(Arc::clone(&target).as_updatable().ok_or_else(|| {
                Error::Coordinator(format!("target {target_name} does not accept updates"))
            })?),
            TargetRequest::Fetch => None,
        };
        let fetchable: Option<Arc<dyn Fetchable>> = match self.config.target_request {
            TargetRequest::Fetch => Some(Arc::clone(&target).as_fetchable().ok_or_else(|| {
                Error::Coordinator(format!("target {target_name} does not fetch"))
            })?),
            TargetRequest::Update => None,
        };

        let event = match self.config.source_event {
            RequestEvent::BeforeUpdate => SourceEvent::BeforeUpdate,
            RequestEvent::BeforeQuery => SourceEvent::BeforeQuery,
        };

        let mut installed = self.installed.lock().unwrap();
        for source in sources {
            let back: Option<Arc<dyn Transformable>> = if self.config.sync_results {
                let name = source.name().to_string();
                Some(Arc::clone(&source).as_transformable().ok_or_else(|| {
                    Error::Coordinator(format!(
                        "source {name} cannot receive synced results"
                    ))
                })?)
            } else {
                None
            };

            let updatable = updatable.clone();
            let fetchable = fetchable.clone();
            let blocking = self.config.blocking;
            let strategy = self.name.clone();

            let id = source.bus().on(event, move |payload: EventPayload| {
                let updatable = updatable.clone();
                let fetchable = fetchable.clone();
                let back = back.clone();
                let strategy = strategy.clone();
                async move {
                    let forward = forward_request(payload, updatable, fetchable, back);
                    if blocking {
                        forward.await?;
                    } else {
                        tokio::spawn(async move {
                            if let Err(err) = forward.await {
                                tracing::warn!(%strategy, error = %err, "request forward failed");
                            }
                        });
                    }
                    Ok(None)
                }
                .boxed()
            });

            installed.push(Installed {
                source,
                event,
                listener: id,
            });
        }
        Ok(())
    }

    fn deactivate(&self) {
        for installed in self.installed.lock().unwrap().drain(..) {
            installed.remove();
        }
    }
}

/// Invoke the target request for one emission and, when configured, apply
/// the resulting transforms back to the originating source.
async fn forward_request(
    payload: EventPayload,
    updatable: Option<Arc<dyn Updatable>>,
    fetchable: Option<Arc<dyn Fetchable>>,
    back: Option<Arc<dyn Transformable>>,
) -> Result<()> {
    let results: Vec<Transform> = match payload {
        EventPayload::Transform(transform) => match updatable {
            Some(target) => target.update(transform).await?,
            None => return Ok(()),
        },
        EventPayload::Query(query) => match fetchable {
            Some(target) => target.fetch(query).await?,
            None => return Ok(()),
        },
        _ => return Ok(()),
    };

    if let Some(source) = back {
        for transform in results {
            source.transform(transform).await?;
        }
    }
    Ok(())
}
