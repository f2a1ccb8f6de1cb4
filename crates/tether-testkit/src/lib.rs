//! # Tether Testkit
//!
//! Shared schemas, records, and generators for tests across the workspace.

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    dependent_schema, inhabitant, moon, planet, solar_system_schema, TestFixture,
};
pub use generators::{linked_planet_system, solar_system_records};
