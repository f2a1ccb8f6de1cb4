//! Non-blocking and blocking transform fan-out.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tether_core::{Error, Result};
use tether_source::{EventPayload, SourceEvent, Transformable};

use crate::coordinator::Coordinator;
use crate::strategy::{Installed, Strategy};

/// Configuration for a [`SyncStrategy`].
#[derive(Debug, Clone)]
pub struct SyncStrategyConfig {
    /// The node whose applied transforms are forwarded.
    pub source_node: String,
    /// The node receiving the transforms.
    pub target_node: String,
    /// Whether the source's transform awaits the target's.
    pub blocking: bool,
}

impl SyncStrategyConfig {
    /// A non-blocking sync between two nodes.
    pub fn new(source_node: impl Into<String>, target_node: impl Into<String>) -> Self {
        Self {
            source_node: source_node.into(),
            target_node: target_node.into(),
            blocking: false,
        }
    }

    /// Make the sync blocking (builder style).
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }
}

/// Forwards every transform applied by the source node to each source of
/// the target node.
///
/// With `blocking`, the target's ingestion is awaited inside the source's
/// transform announcement, so a target failure fails the source's
/// operation. Without it, forwarding is fire-and-forget and failures are
/// logged and swallowed.
pub struct SyncStrategy {
    name: String,
    config: SyncStrategyConfig,
    installed: Mutex<Vec<Installed>>,
}

impl SyncStrategy {
    /// Create the strategy.
    pub fn new(config: SyncStrategyConfig) -> Self {
        Self {
            name: format!("sync:{}->{}", config.source_node, config.target_node),
            config,
            installed: Mutex::new(Vec::new()),
        }
    }
}

impl Strategy for SyncStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&self, coordinator: &Coordinator) -> Result<()> {
        let sources = coordinator.sources_of(&self.config.source_node)?;

        let mut targets: Vec<Arc<dyn Transformable>> = Vec::new();
        for target in coordinator.sources_of(&self.config.target_node)? {
            let name = target.name().to_string();
            let transformable = target.as_transformable().ok_or_else(|| {
                Error::Coordinator(format!(
                    "source {name} in node {} does not accept transforms",
                    self.config.target_node
                ))
            })?;
            targets.push(transformable);
        }

        let mut installed = self.installed.lock().unwrap();
        for source in sources {
            let targets = targets.clone();
            let blocking = self.config.blocking;
            let strategy = self.name.clone();

            let id = source.bus().on(SourceEvent::Transform, move |payload: EventPayload| {
                let targets = targets.clone();
                let strategy = strategy.clone();
                async move {
                    let EventPayload::Transform(transform) = payload else {
                        return Ok(None);
                    };
                    for target in &targets {
                        if blocking {
                            target.transform(transform.clone()).await?;
                        } else {
                            let target = Arc::clone(target);
                            let transform = transform.clone();
                            let strategy = strategy.clone();
                            tokio::spawn(async move {
                                if let Err(err) = target.transform(transform).await {
                                    tracing::warn!(%strategy, error = %err, "sync failed");
                                }
                            });
                        }
                    }
                    Ok(None)
                }
                .boxed()
            });

            installed.push(Installed {
                source,
                event: SourceEvent::Transform,
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
