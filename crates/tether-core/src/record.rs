//! Records and record identity.
//!
//! A record is a typed, identified bag of keys, attributes, and relationship
//! slots. The canonical string form of an identity is `"type:id"`, used for
//! relationship bookkeeping throughout the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `(type, id)` pair identifying a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// The record type (model name).
    #[serde(rename = "type")]
    pub kind: String,
    /// The record id, unique within its type.
    pub id: String,
}

impl RecordIdentity {
    /// Create a new identity.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Parse an identity from its canonical `"type:id"` form.
    ///
    /// Returns `None` if the string has no `:` separator.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once(':')?;
        if kind.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(kind, id))
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The contents of one relationship slot on a record.
///
/// A has-one slot is either empty or a single identity; a has-many slot is a
/// set (membership only, no duplicates, order irrelevant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// A to-many relationship.
    HasMany {
        /// The set of related identities.
        data: BTreeSet<RecordIdentity>,
    },
    /// A to-one relationship.
    HasOne {
        /// The related identity, if linked.
        data: Option<RecordIdentity>,
    },
}

impl RelationshipData {
    /// An empty has-many slot.
    pub fn many() -> Self {
        RelationshipData::HasMany {
            data: BTreeSet::new(),
        }
    }

    /// A has-many slot populated from the given identities.
    pub fn many_of(identities: impl IntoIterator<Item = RecordIdentity>) -> Self {
        RelationshipData::HasMany {
            data: identities.into_iter().collect(),
        }
    }

    /// A has-one slot.
    pub fn one(identity: Option<RecordIdentity>) -> Self {
        RelationshipData::HasOne { data: identity }
    }

    /// Whether this slot currently links the given identity.
    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        match self {
            RelationshipData::HasMany { data } => data.contains(identity),
            RelationshipData::HasOne { data } => data.as_ref() == Some(identity),
        }
    }

    /// All identities currently linked by this slot.
    pub fn identities(&self) -> Vec<RecordIdentity> {
        match self {
            RelationshipData::HasMany { data } => data.iter().cloned().collect(),
            RelationshipData::HasOne { data } => data.iter().cloned().collect(),
        }
    }

    /// Whether the slot links nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            RelationshipData::HasMany { data } => data.is_empty(),
            RelationshipData::HasOne { data } => data.is_none(),
        }
    }
}

/// A record: identity plus keys, attributes, and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record type (model name).
    #[serde(rename = "type")]
    pub kind: String,
    /// The record id, unique within its type.
    pub id: String,
    /// Remote key values, by key name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
    /// Attribute values, by attribute name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    /// Relationship slots, by relationship name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl Record {
    /// Create an empty record with the given identity.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            keys: BTreeMap::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// This record's identity.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.kind.clone(), self.id.clone())
    }

    /// Add an attribute value (builder style).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add a remote key value (builder style).
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    /// Set a has-one relationship (builder style).
    pub fn with_has_one(
        mut self,
        name: impl Into<String>,
        related: Option<RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::one(related));
        self
    }

    /// Set a has-many relationship (builder style).
    pub fn with_has_many(
        mut self,
        name: impl Into<String>,
        related: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), RelationshipData::many_of(related));
        self
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Look up a relationship slot.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.get(name)
    }

    /// All live relationship pointers `(relationship, related identity)`.
    pub fn pointers(&self) -> Vec<(String, RecordIdentity)> {
        let mut out = Vec::new();
        for (name, data) in &self.relationships {
            for identity in data.identities() {
                out.push((name.clone(), identity));
            }
        }
        out
    }
}

/// The full record map of a cache or data dump: `type → id → record`.
pub type Records = BTreeMap<String, BTreeMap<String, Record>>;

/// Collect loose records into a [`Records`] map.
pub fn records_from(records: impl IntoIterator<Item = Record>) -> Records {
    let mut out = Records::new();
    for record in records {
        out.entry(record.kind.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_canonical_form() {
        let id = RecordIdentity::new("planet", "earth");
        assert_eq!(id.to_string(), "planet:earth");
        assert_eq!(RecordIdentity::parse("planet:earth"), Some(id));
        assert_eq!(RecordIdentity::parse("planet"), None);
        assert_eq!(RecordIdentity::parse(":earth"), None);
    }

    #[test]
    fn has_many_is_a_set() {
        let io = RecordIdentity::new("moon", "io");
        let slot = RelationshipData::many_of([io.clone(), io.clone()]);
        assert_eq!(slot.identities().len(), 1);
        assert!(slot.contains(&io));
    }

    #[test]
    fn record_builder_and_pointers() {
        let record = Record::new("planet", "jupiter")
            .with_attribute("name", "Jupiter")
            .with_key("remoteId", "j-1")
            .with_has_many("moons", [RecordIdentity::new("moon", "io")])
            .with_has_one("next", Some(RecordIdentity::new("planet", "saturn")));

        assert_eq!(record.attribute("name"), Some(&json!("Jupiter")));
        assert_eq!(record.keys.get("remoteId"), Some(&"j-1".to_string()));

        let mut pointers = record.pointers();
        pointers.sort();
        assert_eq!(
            pointers,
            vec![
                ("moons".to_string(), RecordIdentity::new("moon", "io")),
                ("next".to_string(), RecordIdentity::new("planet", "saturn")),
            ]
        );
    }

    #[test]
    fn relationship_serde_shapes() {
        let one: RelationshipData = serde_json::from_value(json!({ "data": null })).unwrap();
        assert_eq!(one, RelationshipData::one(None));

        let one: RelationshipData =
            serde_json::from_value(json!({ "data": { "type": "planet", "id": "earth" } }))
                .unwrap();
        assert!(one.contains(&RecordIdentity::new("planet", "earth")));

        let many: RelationshipData =
            serde_json::from_value(json!({ "data": [{ "type": "moon", "id": "io" }] })).unwrap();
        assert!(matches!(many, RelationshipData::HasMany { .. }));
    }
}
