//! Test fixtures and helpers.
//!
//! Common schemas and record builders for unit and integration tests.

use std::sync::Arc;

use tether_core::{
    AttributeDef, Dependent, KeyMap, ModelDef, Record, RelationshipDef, Schema,
};

/// A test fixture bundling the shared schema and a key map.
pub struct TestFixture {
    pub schema: Arc<Schema>,
    pub key_map: Arc<KeyMap>,
}

impl TestFixture {
    /// Create a fixture around the solar-system schema.
    pub fn new() -> Self {
        Self {
            schema: solar_system_schema(),
            key_map: Arc::new(KeyMap::new()),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// The schema used throughout the workspace tests: planets with moons,
/// inhabitants, and next/previous ordering links.
pub fn solar_system_schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .model(
            "planet",
            ModelDef::new()
                .with_attribute("name", AttributeDef::of_kind("string"))
                .with_attribute("classification", AttributeDef::of_kind("string"))
                .with_relationship(
                    "moons",
                    RelationshipDef::has_many("moon").with_inverse("planet"),
                )
                .with_relationship(
                    "inhabitants",
                    RelationshipDef::has_many("inhabitant").with_inverse("planets"),
                )
                .with_relationship(
                    "next",
                    RelationshipDef::has_one("planet").with_inverse("previous"),
                )
                .with_relationship(
                    "previous",
                    RelationshipDef::has_one("planet").with_inverse("next"),
                ),
        )
        .model(
            "moon",
            ModelDef::new()
                .with_attribute("name", AttributeDef::of_kind("string"))
                .with_relationship(
                    "planet",
                    RelationshipDef::has_one("planet").with_inverse("moons"),
                ),
        )
        .model(
            "inhabitant",
            ModelDef::new()
                .with_attribute("name", AttributeDef::of_kind("string"))
                .with_relationship(
                    "planets",
                    RelationshipDef::has_many("planet").with_inverse("inhabitants"),
                ),
        )
        .build()
        .expect("solar system schema is valid");
    Arc::new(schema)
}

/// A schema whose relationships cascade removal in both directions, for
/// exercising dependent-removal cycles.
pub fn dependent_schema() -> Arc<Schema> {
    let schema = Schema::builder()
        .model(
            "star",
            ModelDef::new().with_relationship(
                "planets",
                RelationshipDef::has_many("planet")
                    .with_inverse("star")
                    .with_dependent(Dependent::Remove),
            ),
        )
        .model(
            "planet",
            ModelDef::new()
                .with_relationship(
                    "star",
                    RelationshipDef::has_one("star")
                        .with_inverse("planets")
                        .with_dependent(Dependent::Remove),
                )
                .with_relationship(
                    "moons",
                    RelationshipDef::has_many("moon")
                        .with_inverse("planet")
                        .with_dependent(Dependent::Remove),
                ),
        )
        .model(
            "moon",
            ModelDef::new().with_relationship(
                "planet",
                RelationshipDef::has_one("planet").with_inverse("moons"),
            ),
        )
        .build()
        .expect("dependent schema is valid");
    Arc::new(schema)
}

/// A planet record with a name attribute.
pub fn planet(id: &str, name: &str) -> Record {
    Record::new("planet", id).with_attribute("name", name)
}

/// A moon record with a name attribute.
pub fn moon(id: &str, name: &str) -> Record {
    Record::new("moon", id).with_attribute("name", name)
}

/// An inhabitant record with a name attribute.
pub fn inhabitant(id: &str, name: &str) -> Record {
    Record::new("inhabitant", id).with_attribute("name", name)
}
