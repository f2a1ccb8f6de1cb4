//! The source trait and its capability interfaces.
//!
//! A source is a bounded data container — a cache-backed store, an HTTP
//! API, a local persistence layer — implementing a subset of the
//! capability traits. Coordinators hold sources as `Arc<dyn Source>` and
//! discover capabilities through the `as_*` accessors, which default to
//! `None`.

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{QueryExpression, QueryResult, Result, Transform};

use crate::evented::EventBus;

/// A bounded data container participating in coordination.
pub trait Source: Send + Sync {
    /// The source's name, unique within a coordinator.
    fn name(&self) -> &str;

    /// The source's event bus.
    fn bus(&self) -> &EventBus;

    /// This source as a transform target, if it accepts transforms.
    fn as_transformable(self: Arc<Self>) -> Option<Arc<dyn Transformable>> {
        None
    }

    /// This source as an update target, if it accepts updates.
    fn as_updatable(self: Arc<Self>) -> Option<Arc<dyn Updatable>> {
        None
    }

    /// This source as a query target, if it evaluates queries.
    fn as_queryable(self: Arc<Self>) -> Option<Arc<dyn Queryable>> {
        None
    }

    /// This source as a fetch target, if it fetches remote data.
    fn as_fetchable(self: Arc<Self>) -> Option<Arc<dyn Fetchable>> {
        None
    }
}

/// Ingress: apply an id-tagged batch of operations.
///
/// Applying a transform whose id was seen before resolves immediately with
/// no transforms, making re-submission idempotent.
#[async_trait]
pub trait Transformable: Source {
    /// Apply a transform, returning every transform that ended up applied.
    async fn transform(&self, transform: Transform) -> Result<Vec<Transform>>;
}

/// Egress: push a mutation to this source.
#[async_trait]
pub trait Updatable: Source {
    /// Run an update, returning the resulting transforms.
    async fn update(&self, transform: Transform) -> Result<Vec<Transform>>;
}

/// Evaluate queries against this source's own data.
#[async_trait]
pub trait Queryable: Source {
    /// Evaluate a query.
    async fn query(&self, query: QueryExpression) -> Result<QueryResult>;
}

/// Egress: fetch data matching a query, expressed as transforms.
#[async_trait]
pub trait Fetchable: Source {
    /// Fetch records for a query.
    async fn fetch(&self, query: QueryExpression) -> Result<Vec<Transform>>;
}
