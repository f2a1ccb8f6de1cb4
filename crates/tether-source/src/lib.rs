//! # Tether Source
//!
//! The machinery every source is built from:
//!
//! - [`EventBus`] — multi-listener pub-sub with four emit disciplines
//!   (`emit`, `settle`, `series`, `resolve`)
//! - [`ActionQueue`] — single-in-flight serial queue with explicit
//!   retry/skip on failure
//! - [`TransformLog`] — bounded applied-transform set for idempotence
//! - [`SourceCore`] — the shared ingress/egress lifecycle
//! - capability traits ([`Transformable`], [`Updatable`], [`Queryable`],
//!   [`Fetchable`]) over a common [`Source`] trait
//! - [`Store`] — the in-memory source backed by a relational cache

pub mod core;
pub mod evented;
pub mod log;
pub mod queue;
pub mod source;
pub mod store;

pub use crate::core::{
    FetchHandler, QueryHandler, SourceCore, SourceSettings, TransformHandler, UpdateHandler,
};
pub use evented::{EventBus, EventPayload, Listener, ListenerFuture, ListenerId, Response, SourceEvent};
pub use log::TransformLog;
pub use queue::{ActionQueue, ActionTask};
pub use source::{Fetchable, Queryable, Source, Transformable, Updatable};
pub use store::Store;
