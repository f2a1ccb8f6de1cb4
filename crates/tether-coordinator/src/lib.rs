//! # Tether Coordinator
//!
//! Declarative wiring between sources. A [`Coordinator`] groups sources
//! into named nodes; [`Strategy`] implementations install listeners on
//! node sources at activation and remove exactly those listeners at
//! deactivation:
//!
//! - [`SyncStrategy`] fans applied transforms out from one node to another
//! - [`RequestStrategy`] forwards update/query intents to a target source
//!   before the originating source proceeds, optionally syncing the
//!   target's resulting transforms back

pub mod coordinator;
pub mod strategy;

pub use coordinator::Coordinator;
pub use strategy::{
    RequestEvent, RequestStrategy, RequestStrategyConfig, Strategy, SyncStrategy,
    SyncStrategyConfig, TargetRequest,
};
