//! Event bus with four emit disciplines.
//!
//! Every source carries one bus. Listeners are invoked in registration
//! order; the discipline chosen by the emitter decides how listener results
//! and failures are treated:
//!
//! - [`EventBus::emit`] — fire-and-forget, failures logged and dropped
//! - [`EventBus::settle`] — run every listener, collect failures
//! - [`EventBus::series`] — first failure aborts the remaining listeners
//! - [`EventBus::resolve`] — first listener producing a value wins

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tether_core::{Error, QueryExpression, QueryResult, Result, Transform};

/// The events a source can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceEvent {
    /// A transform is about to be applied (series).
    BeforeTransform,
    /// A transform has been applied (settle).
    Transform,
    /// An update is about to run (series).
    BeforeUpdate,
    /// An update has completed (settle).
    Update,
    /// A query or fetch is about to run (series).
    BeforeQuery,
    /// A query or fetch has completed (settle).
    Query,
}

/// The argument handed to listeners.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A transform (before-transform, transform, before-update).
    Transform(Transform),
    /// A completed update and its resulting transforms.
    Updated {
        /// The caller's transform.
        transform: Transform,
        /// The transforms the update produced.
        result: Vec<Transform>,
    },
    /// A query expression (before-query).
    Query(QueryExpression),
    /// A completed query and its result.
    Queried {
        /// The query.
        query: QueryExpression,
        /// The result.
        result: QueryResult,
    },
    /// A completed fetch and the transforms it produced.
    Fetched {
        /// The query.
        query: QueryExpression,
        /// The fetched transforms.
        result: Vec<Transform>,
    },
}

/// A value a listener may produce (consumed by [`EventBus::resolve`]).
#[derive(Debug, Clone)]
pub enum Response {
    /// Transforms produced by a source call.
    Transforms(Vec<Transform>),
    /// A query result.
    Query(QueryResult),
}

/// What a listener returns.
pub type ListenerResult = Result<Option<Response>>;
/// The future a listener produces.
pub type ListenerFuture = BoxFuture<'static, ListenerResult>;

/// A registered event listener.
pub trait Listener: Send + Sync {
    /// Handle one emission.
    fn call(&self, payload: EventPayload) -> ListenerFuture;
}

impl<F> Listener for F
where
    F: Fn(EventPayload) -> ListenerFuture + Send + Sync,
{
    fn call(&self, payload: EventPayload) -> ListenerFuture {
        self(payload)
    }
}

/// Handle for removing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Arc<dyn Listener>,
}

/// Multi-listener pub-sub keyed by [`SourceEvent`].
pub struct EventBus {
    name: String,
    registry: Mutex<HashMap<SourceEvent, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus, named after its owning source for log context.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener. Listeners run in registration order.
    pub fn on(&self, event: SourceEvent, listener: impl Listener + 'static) -> ListenerId {
        self.register(event, Arc::new(listener), false)
    }

    /// Register a listener that deregisters itself after its first
    /// invocation.
    pub fn one(&self, event: SourceEvent, listener: impl Listener + 'static) -> ListenerId {
        self.register(event, Arc::new(listener), true)
    }

    fn register(
        &self,
        event: SourceEvent,
        listener: Arc<dyn Listener>,
        once: bool,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry
            .lock()
            .unwrap()
            .entry(event)
            .or_default()
            .push(Registration { id, once, listener });
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&self, event: SourceEvent, id: ListenerId) -> bool {
        let mut registry = self.registry.lock().unwrap();
        if let Some(listeners) = registry.get_mut(&event) {
            let before = listeners.len();
            listeners.retain(|r| r.id != id);
            return listeners.len() < before;
        }
        false
    }

    /// Number of listeners currently registered for an event.
    pub fn listener_count(&self, event: SourceEvent) -> usize {
        self.registry
            .lock()
            .unwrap()
            .get(&event)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Snapshot the listener list for one emission, dropping one-shot
    /// registrations in the same motion.
    fn snapshot(&self, event: SourceEvent) -> Vec<Arc<dyn Listener>> {
        let mut registry = self.registry.lock().unwrap();
        match registry.get_mut(&event) {
            Some(listeners) => {
                let snapshot = listeners.iter().map(|r| Arc::clone(&r.listener)).collect();
                listeners.retain(|r| !r.once);
                snapshot
            }
            None => Vec::new(),
        }
    }

    /// Fire-and-forget: every listener future is spawned onto the runtime;
    /// results and failures are ignored.
    pub fn emit(&self, event: SourceEvent, payload: EventPayload) {
        let source = self.name.clone();
        for listener in self.snapshot(event) {
            let payload = payload.clone();
            let source = source.clone();
            tokio::spawn(async move {
                if let Err(err) = listener.call(payload).await {
                    tracing::debug!(%source, ?event, error = %err, "emit listener failed");
                }
            });
        }
    }

    /// Await every listener sequentially; failures are logged and
    /// collected, never short-circuiting.
    pub async fn settle(&self, event: SourceEvent, payload: EventPayload) -> Vec<Error> {
        let mut failures = Vec::new();
        for listener in self.snapshot(event) {
            if let Err(err) = listener.call(payload.clone()).await {
                tracing::warn!(source = %self.name, ?event, error = %err, "settle listener failed");
                failures.push(err);
            }
        }
        failures
    }

    /// Await listeners sequentially; the first failure aborts the rest.
    pub async fn series(&self, event: SourceEvent, payload: EventPayload) -> Result<()> {
        for listener in self.snapshot(event) {
            listener.call(payload.clone()).await?;
        }
        Ok(())
    }

    /// Await listeners sequentially; the first to produce a value wins. If
    /// none does, the emission fails.
    pub async fn resolve(&self, event: SourceEvent, payload: EventPayload) -> Result<Response> {
        for listener in self.snapshot(event) {
            if let Some(response) = listener.call(payload.clone()).await? {
                return Ok(response);
            }
        }
        Err(Error::Unresolved(format!("{event:?} on {}", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use tether_core::Transform;

    fn bus() -> EventBus {
        EventBus::new("test")
    }

    fn payload() -> EventPayload {
        EventPayload::Transform(Transform::new(vec![]))
    }

    fn recording(counter: Arc<AtomicUsize>) -> impl Listener {
        move |_: EventPayload| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
            .boxed()
        }
    }

    fn failing() -> impl Listener {
        |_: EventPayload| async { Err(Error::Queue("boom".into())) }.boxed()
    }

    #[tokio::test]
    async fn settle_runs_every_listener_and_collects_failures() {
        let bus = bus();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.on(SourceEvent::Transform, recording(counter.clone()));
        bus.on(SourceEvent::Transform, failing());
        bus.on(SourceEvent::Transform, recording(counter.clone()));

        let failures = bus.settle(SourceEvent::Transform, payload()).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn series_aborts_at_first_failure() {
        let bus = bus();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.on(SourceEvent::BeforeUpdate, recording(counter.clone()));
        bus.on(SourceEvent::BeforeUpdate, failing());
        bus.on(SourceEvent::BeforeUpdate, recording(counter.clone()));

        let result = bus.series(SourceEvent::BeforeUpdate, payload()).await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_first_value_wins() {
        let bus = bus();
        bus.on(SourceEvent::Query, |_: EventPayload| {
            async { Ok(None) }.boxed()
        });
        bus.on(SourceEvent::Query, |_: EventPayload| {
            async { Ok(Some(Response::Transforms(vec![]))) }.boxed()
        });
        bus.on(SourceEvent::Query, failing());

        let response = bus.resolve(SourceEvent::Query, payload()).await.unwrap();
        assert!(matches!(response, Response::Transforms(_)));
    }

    #[tokio::test]
    async fn resolve_with_no_value_fails() {
        let bus = bus();
        bus.on(SourceEvent::Query, |_: EventPayload| {
            async { Ok(None) }.boxed()
        });

        let err = bus.resolve(SourceEvent::Query, payload()).await.unwrap_err();
        assert!(matches!(err, Error::Unresolved(_)));
    }

    #[tokio::test]
    async fn one_deregisters_after_first_emission() {
        let bus = bus();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.one(SourceEvent::Transform, recording(counter.clone()));

        bus.settle(SourceEvent::Transform, payload()).await;
        bus.settle(SourceEvent::Transform, payload()).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(SourceEvent::Transform), 0);
    }

    #[tokio::test]
    async fn off_removes_listener() {
        let bus = bus();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = bus.on(SourceEvent::Transform, recording(counter.clone()));

        assert!(bus.off(SourceEvent::Transform, id));
        assert!(!bus.off(SourceEvent::Transform, id));

        bus.settle(SourceEvent::Transform, payload()).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn emit_fires_without_awaiting() {
        let bus = bus();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.on(SourceEvent::Transform, recording(counter.clone()));
        bus.on(SourceEvent::Transform, failing());

        bus.emit(SourceEvent::Transform, payload());
        // Spawned listeners run once the task yields.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
