//! Strategies: declarative listeners between coordinator nodes.

use std::sync::Arc;

use tether_core::Result;
use tether_source::{ListenerId, Source, SourceEvent};

use crate::coordinator::Coordinator;

mod request;
mod sync;

pub use request::{RequestEvent, RequestStrategy, RequestStrategyConfig, TargetRequest};
pub use sync::{SyncStrategy, SyncStrategyConfig};

/// A declarative wiring rule between nodes.
///
/// Activation installs listeners on the strategy's source node; the
/// strategy records them and deactivation removes exactly those listeners.
pub trait Strategy: Send + Sync {
    /// A descriptive name for logs.
    fn name(&self) -> &str;

    /// Resolve nodes and install listeners.
    fn activate(&self, coordinator: &Coordinator) -> Result<()>;

    /// Remove every listener installed by this strategy.
    fn deactivate(&self);
}

/// One listener installation, kept for teardown.
pub(crate) struct Installed {
    pub source: Arc<dyn Source>,
    pub event: SourceEvent,
    pub listener: ListenerId,
}

impl Installed {
    pub fn remove(&self) {
        self.source.bus().off(self.event, self.listener);
    }
}
