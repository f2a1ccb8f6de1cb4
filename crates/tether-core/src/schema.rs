//! Model and relationship metadata.
//!
//! A schema is validated at construction: every relationship must target a
//! defined model, and every declared inverse must exist on the target model
//! and point back at the declaring relationship.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    /// To-one.
    HasOne,
    /// To-many (set semantics).
    HasMany,
}

/// Lifecycle coupling between related records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dependent {
    /// Removing a record removes every record related through this slot.
    Remove,
}

/// An attribute descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Optional value type hint (`"string"`, `"number"`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl AttributeDef {
    /// An attribute with a value type hint.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
        }
    }
}

/// A relationship descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Cardinality.
    pub kind: RelationshipKind,
    /// The related model name.
    pub model: String,
    /// The inverse relationship name on the related model, if bidirectional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    /// Lifecycle coupling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependent: Option<Dependent>,
    /// Whether a has-many relationship is managed as a complete set when
    /// serialized remotely (full membership carried on record documents).
    #[serde(default)]
    pub acts_as_set: bool,
}

impl RelationshipDef {
    /// A has-one relationship to the given model.
    pub fn has_one(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasOne,
            model: model.into(),
            inverse: None,
            dependent: None,
            acts_as_set: false,
        }
    }

    /// A has-many relationship to the given model.
    pub fn has_many(model: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            model: model.into(),
            inverse: None,
            dependent: None,
            acts_as_set: false,
        }
    }

    /// Declare the inverse relationship name (builder style).
    pub fn with_inverse(mut self, inverse: impl Into<String>) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    /// Declare dependent removal (builder style).
    pub fn with_dependent(mut self, dependent: Dependent) -> Self {
        self.dependent = Some(dependent);
        self
    }

    /// Mark the relationship as set-managed (builder style).
    pub fn acting_as_set(mut self) -> Self {
        self.acts_as_set = true;
        self
    }
}

/// A model descriptor: named attributes and relationships.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Attribute descriptors by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeDef>,
    /// Relationship descriptors by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipDef>,
}

impl ModelDef {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute (builder style).
    pub fn with_attribute(mut self, name: impl Into<String>, def: AttributeDef) -> Self {
        self.attributes.insert(name.into(), def);
        self
    }

    /// Add a relationship (builder style).
    pub fn with_relationship(mut self, name: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(name.into(), def);
        self
    }
}

/// Validated model metadata for a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    models: BTreeMap<String, ModelDef>,
}

impl Schema {
    /// Build a schema from model definitions, validating relationship and
    /// inverse consistency.
    ///
    /// Besides requiring every declared inverse to exist and point back at
    /// the declaring relationship, the cardinalities of the pair must be
    /// consistent:
    ///
    /// - a relationship may act as its own inverse only with set semantics
    ///   on both sides — a to-one slot cannot mirror itself, since
    ///   overwriting one end would silently break the strict mutual pairing
    ///   the declaration promises;
    /// - a to-many relationship declaring `dependent: remove` must have a
    ///   to-one inverse: cascading removal presumes exclusive ownership,
    ///   and a to-many inverse means the removed members may still be held
    ///   by other owners.
    pub fn new(models: BTreeMap<String, ModelDef>) -> Result<Self, SchemaError> {
        for (model_name, model) in &models {
            for (rel_name, rel) in &model.relationships {
                let target = models.get(&rel.model).ok_or_else(|| {
                    SchemaError::UnknownRelatedModel {
                        model: model_name.clone(),
                        relationship: rel_name.clone(),
                        target: rel.model.clone(),
                    }
                })?;

                if let Some(inverse) = &rel.inverse {
                    let inverse_rel = target.relationships.get(inverse).ok_or_else(|| {
                        SchemaError::MissingInverse {
                            model: model_name.clone(),
                            relationship: rel_name.clone(),
                            inverse: inverse.clone(),
                            target: rel.model.clone(),
                        }
                    })?;

                    let mismatch = inverse_rel.model != *model_name
                        || inverse_rel.inverse.as_deref() != Some(rel_name.as_str());
                    if mismatch {
                        return Err(SchemaError::InverseMismatch {
                            model: model_name.clone(),
                            relationship: rel_name.clone(),
                            inverse: inverse.clone(),
                            target: rel.model.clone(),
                        });
                    }

                    let self_inverse = rel.model == *model_name && inverse == rel_name;
                    let one_sided_self_pair = self_inverse
                        && (rel.kind == RelationshipKind::HasOne
                            || inverse_rel.kind == RelationshipKind::HasOne);
                    let shared_dependent_cascade = rel.kind == RelationshipKind::HasMany
                        && rel.dependent == Some(Dependent::Remove)
                        && inverse_rel.kind == RelationshipKind::HasMany;
                    if one_sided_self_pair || shared_dependent_cascade {
                        return Err(SchemaError::InverseCardinality {
                            model: model_name.clone(),
                            relationship: rel_name.clone(),
                            inverse: inverse.clone(),
                            target: rel.model.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self { models })
    }

    /// Start a builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up a model.
    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.models.get(name)
    }

    /// Whether a model is defined.
    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Look up a relationship descriptor.
    pub fn relationship(&self, model: &str, name: &str) -> Option<&RelationshipDef> {
        self.models.get(model)?.relationships.get(name)
    }

    /// All model names.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

/// Chained builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: BTreeMap<String, ModelDef>,
}

impl SchemaBuilder {
    /// Add a model definition.
    pub fn model(mut self, name: impl Into<String>, def: ModelDef) -> Self {
        self.models.insert(name.into(), def);
        self
    }

    /// Validate and build the schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet_moon() -> SchemaBuilder {
        Schema::builder()
            .model(
                "planet",
                ModelDef::new()
                    .with_attribute("name", AttributeDef::of_kind("string"))
                    .with_relationship(
                        "moons",
                        RelationshipDef::has_many("moon").with_inverse("planet"),
                    ),
            )
            .model(
                "moon",
                ModelDef::new().with_relationship(
                    "planet",
                    RelationshipDef::has_one("planet").with_inverse("moons"),
                ),
            )
    }

    #[test]
    fn valid_inverse_pair() {
        let schema = planet_moon().build().unwrap();
        let rel = schema.relationship("planet", "moons").unwrap();
        assert_eq!(rel.kind, RelationshipKind::HasMany);
        assert_eq!(rel.inverse.as_deref(), Some("planet"));
    }

    #[test]
    fn unknown_related_model_rejected() {
        let err = Schema::builder()
            .model(
                "planet",
                ModelDef::new()
                    .with_relationship("moons", RelationshipDef::has_many("moon")),
            )
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::UnknownRelatedModel { .. }));
    }

    #[test]
    fn missing_inverse_rejected() {
        let err = Schema::builder()
            .model(
                "planet",
                ModelDef::new().with_relationship(
                    "moons",
                    RelationshipDef::has_many("moon").with_inverse("planet"),
                ),
            )
            .model("moon", ModelDef::new())
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::MissingInverse { .. }));
    }

    #[test]
    fn one_sided_inverse_rejected() {
        let err = Schema::builder()
            .model(
                "planet",
                ModelDef::new().with_relationship(
                    "moons",
                    RelationshipDef::has_many("moon").with_inverse("planet"),
                ),
            )
            .model(
                "moon",
                ModelDef::new()
                    .with_relationship("planet", RelationshipDef::has_one("planet")),
            )
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::InverseMismatch { .. }));
    }

    #[test]
    fn self_inverse_has_one_rejected() {
        let err = Schema::builder()
            .model(
                "person",
                ModelDef::new().with_relationship(
                    "spouse",
                    RelationshipDef::has_one("person").with_inverse("spouse"),
                ),
            )
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::InverseCardinality { .. }));
    }

    #[test]
    fn self_inverse_has_many_accepted() {
        let schema = Schema::builder()
            .model(
                "person",
                ModelDef::new().with_relationship(
                    "siblings",
                    RelationshipDef::has_many("person").with_inverse("siblings"),
                ),
            )
            .build()
            .unwrap();

        let rel = schema.relationship("person", "siblings").unwrap();
        assert_eq!(rel.kind, RelationshipKind::HasMany);
    }

    #[test]
    fn dependent_cascade_through_shared_members_rejected() {
        // Many-to-many membership cannot cascade removal: the members may
        // still be held by other owners.
        let err = Schema::builder()
            .model(
                "planet",
                ModelDef::new().with_relationship(
                    "inhabitants",
                    RelationshipDef::has_many("inhabitant")
                        .with_inverse("planets")
                        .with_dependent(Dependent::Remove),
                ),
            )
            .model(
                "inhabitant",
                ModelDef::new().with_relationship(
                    "planets",
                    RelationshipDef::has_many("planet").with_inverse("inhabitants"),
                ),
            )
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::InverseCardinality { .. }));
    }

    #[test]
    fn dependent_cascade_with_exclusive_members_accepted() {
        let schema = Schema::builder()
            .model(
                "planet",
                ModelDef::new().with_relationship(
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
            .unwrap();

        let rel = schema.relationship("planet", "moons").unwrap();
        assert_eq!(rel.dependent, Some(Dependent::Remove));
    }
}
