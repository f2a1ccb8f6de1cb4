//! JSON:API document (de)serialization.
//!
//! Resource ids on the wire are remote key values; the serializer maps
//! them through the shared [`KeyMap`], minting a local id for resources
//! never seen before.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tether_core::{
    Error, KeyMap, Record, RecordIdentity, RelationshipData, RelationshipKind, Result, Schema,
};
use uuid::Uuid;

use crate::url::{pluralize, singularize};

/// A `{type, id}` reference on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// The `data` member of a relationship object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceLinkage {
    /// To-many linkage.
    Many(Vec<ResourceIdentifier>),
    /// To-one linkage.
    One(Option<ResourceIdentifier>),
}

/// A relationship object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRelationship {
    pub data: ResourceLinkage,
}

/// A resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<BTreeMap<String, ResourceRelationship>>,
}

/// The primary data of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Many(Vec<ResourceObject>),
    One(Option<ResourceObject>),
}

/// A JSON:API document (primary data only; `included` and `meta` are
/// ignored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub data: PrimaryData,
}

/// Maps records to resource objects and back through the key map.
#[derive(Clone)]
pub struct JsonApiSerializer {
    schema: Arc<Schema>,
    key_map: Arc<KeyMap>,
    key: String,
}

impl JsonApiSerializer {
    /// Create a serializer using `key` as the remote key name.
    pub fn new(schema: Arc<Schema>, key_map: Arc<KeyMap>, key: impl Into<String>) -> Self {
        Self {
            schema,
            key_map,
            key: key.into(),
        }
    }

    /// The resource type for a local model name.
    pub fn resource_kind(&self, kind: &str) -> String {
        pluralize(kind)
    }

    /// The local model name for a resource type.
    pub fn local_kind(&self, resource_kind: &str) -> String {
        singularize(resource_kind)
    }

    /// The remote id for a local identity, if one is known.
    pub fn resource_id(&self, identity: &RecordIdentity) -> Option<String> {
        self.key_map.key_for_id(&identity.kind, &self.key, &identity.id)
    }

    /// The remote id for a local identity, required.
    pub fn require_resource_id(&self, identity: &RecordIdentity) -> Result<String> {
        self.resource_id(identity).ok_or_else(|| Error::KeyNotFound {
            kind: identity.kind.clone(),
            id: identity.id.clone(),
        })
    }

    /// The wire identifier for a local identity, required.
    pub fn identifier(&self, identity: &RecordIdentity) -> Result<ResourceIdentifier> {
        Ok(ResourceIdentifier {
            kind: self.resource_kind(&identity.kind),
            id: self.require_resource_id(identity)?,
        })
    }

    /// Serialize a record into a resource object.
    ///
    /// Has-one relationships are always carried; has-many relationships are
    /// carried only when the schema marks them set-managed. Pointers whose
    /// targets have no remote key yet are left out.
    pub fn serialize_record(&self, record: &Record) -> ResourceObject {
        let id = record
            .keys
            .get(&self.key)
            .cloned()
            .or_else(|| self.resource_id(&record.identity()));

        let attributes = if record.attributes.is_empty() {
            None
        } else {
            let mut map = Map::new();
            for (name, value) in &record.attributes {
                map.insert(name.clone(), value.clone());
            }
            Some(map)
        };

        let mut relationships = BTreeMap::new();
        for (name, slot) in &record.relationships {
            let Some(def) = self.schema.relationship(&record.kind, name) else {
                continue;
            };
            let linkage = match (def.kind, slot) {
                (RelationshipKind::HasOne, RelationshipData::HasOne { data }) => {
                    match data {
                        Some(identity) => match self.identifier(identity) {
                            Ok(identifier) => ResourceLinkage::One(Some(identifier)),
                            Err(_) => continue,
                        },
                        None => ResourceLinkage::One(None),
                    }
                }
                (RelationshipKind::HasMany, RelationshipData::HasMany { data }) => {
                    if !def.acts_as_set {
                        continue;
                    }
                    let identifiers: Vec<ResourceIdentifier> = data
                        .iter()
                        .filter_map(|identity| self.identifier(identity).ok())
                        .collect();
                    ResourceLinkage::Many(identifiers)
                }
                _ => continue,
            };
            relationships.insert(name.clone(), ResourceRelationship { data: linkage });
        }

        ResourceObject {
            kind: self.resource_kind(&record.kind),
            id,
            attributes,
            relationships: if relationships.is_empty() {
                None
            } else {
                Some(relationships)
            },
        }
    }

    /// Resolve a wire identifier to a local identity, minting and
    /// registering a local id if the remote id is new.
    pub fn resolve_identifier(&self, identifier: &ResourceIdentifier) -> RecordIdentity {
        let kind = self.local_kind(&identifier.kind);
        let id = match self.key_map.id_for_key(&kind, &self.key, &identifier.id) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                self.key_map.set(&kind, &self.key, &identifier.id, &id);
                id
            }
        };
        RecordIdentity::new(kind, id)
    }

    /// Deserialize a resource object into a record.
    ///
    /// Relationships unknown to the schema are dropped rather than carried
    /// into the cache.
    pub fn deserialize_resource(&self, resource: &ResourceObject) -> Result<Record> {
        let remote_id = resource
            .id
            .as_deref()
            .ok_or_else(|| Error::Serialization("resource object without id".into()))?;

        let identity = self.resolve_identifier(&ResourceIdentifier {
            kind: resource.kind.clone(),
            id: remote_id.to_string(),
        });

        let mut record = Record::new(identity.kind.clone(), identity.id.clone())
            .with_key(self.key.clone(), remote_id);

        if let Some(attributes) = &resource.attributes {
            for (name, value) in attributes {
                record.attributes.insert(name.clone(), value.clone());
            }
        }

        if let Some(relationships) = &resource.relationships {
            for (name, relationship) in relationships {
                if self.schema.relationship(&identity.kind, name).is_none() {
                    continue;
                }
                let data = match &relationship.data {
                    ResourceLinkage::One(identifier) => RelationshipData::one(
                        identifier.as_ref().map(|i| self.resolve_identifier(i)),
                    ),
                    ResourceLinkage::Many(identifiers) => RelationshipData::many_of(
                        identifiers.iter().map(|i| self.resolve_identifier(i)),
                    ),
                };
                record.relationships.insert(name.clone(), data);
            }
        }

        self.key_map.push_record(&record);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_testkit::TestFixture;

    fn serializer(fixture: &TestFixture) -> JsonApiSerializer {
        JsonApiSerializer::new(fixture.schema.clone(), fixture.key_map.clone(), "remoteId")
    }

    #[test]
    fn serialize_record_with_known_key() {
        let fixture = TestFixture::new();
        let s = serializer(&fixture);

        let record = Record::new("planet", "p1")
            .with_key("remoteId", "12345")
            .with_attribute("name", "Jupiter")
            .with_has_one("next", Some(RecordIdentity::new("planet", "p2")));
        fixture.key_map.set("planet", "remoteId", "67890", "p2");

        let resource = s.serialize_record(&record);
        assert_eq!(resource.kind, "planets");
        assert_eq!(resource.id.as_deref(), Some("12345"));
        assert_eq!(resource.attributes.unwrap()["name"], json!("Jupiter"));

        let relationships = resource.relationships.unwrap();
        let next = &relationships["next"];
        assert_eq!(
            next.data,
            ResourceLinkage::One(Some(ResourceIdentifier {
                kind: "planets".to_string(),
                id: "67890".to_string(),
            }))
        );
    }

    #[test]
    fn has_many_carried_only_when_set_managed() {
        let fixture = TestFixture::new();
        let s = serializer(&fixture);
        fixture.key_map.set("moon", "remoteId", "m1", "io");

        // The solar-system schema does not mark moons as set-managed.
        let record = Record::new("planet", "p1")
            .with_key("remoteId", "1")
            .with_has_many("moons", [RecordIdentity::new("moon", "io")]);
        let resource = s.serialize_record(&record);
        assert!(resource.relationships.is_none());
    }

    #[test]
    fn deserialize_binds_known_remote_id() {
        let fixture = TestFixture::new();
        let s = serializer(&fixture);
        fixture.key_map.set("planet", "remoteId", "12345", "local-1");

        let resource = ResourceObject {
            kind: "planets".to_string(),
            id: Some("12345".to_string()),
            attributes: Some(Map::from_iter([(
                "name".to_string(),
                json!("Pluto"),
            )])),
            relationships: None,
        };
        let record = s.deserialize_resource(&resource).unwrap();
        assert_eq!(record.kind, "planet");
        assert_eq!(record.id, "local-1");
        assert_eq!(record.keys["remoteId"], "12345");
        assert_eq!(record.attribute("name"), Some(&json!("Pluto")));
    }

    #[test]
    fn deserialize_mints_and_registers_local_id() {
        let fixture = TestFixture::new();
        let s = serializer(&fixture);

        let resource = ResourceObject {
            kind: "planets".to_string(),
            id: Some("999".to_string()),
            attributes: None,
            relationships: None,
        };
        let record = s.deserialize_resource(&resource).unwrap();
        assert_eq!(record.kind, "planet");
        assert_eq!(
            fixture.key_map.id_for_key("planet", "remoteId", "999"),
            Some(record.id.clone())
        );
    }

    #[test]
    fn deserialize_resolves_relationship_identifiers() {
        let fixture = TestFixture::new();
        let s = serializer(&fixture);
        fixture.key_map.set("moon", "remoteId", "m1", "io");

        let resource: ResourceObject = serde_json::from_value(json!({
            "type": "planets",
            "id": "1",
            "relationships": {
                "moons": { "data": [{ "type": "moons", "id": "m1" }] },
                "unknown": { "data": null },
            }
        }))
        .unwrap();

        let record = s.deserialize_resource(&resource).unwrap();
        let moons = record.relationship("moons").unwrap();
        assert!(moons.contains(&RecordIdentity::new("moon", "io")));
        assert!(record.relationship("unknown").is_none());
    }

    #[test]
    fn missing_remote_key_is_an_error() {
        let fixture = TestFixture::new();
        let s = serializer(&fixture);
        let err = s
            .require_resource_id(&RecordIdentity::new("planet", "unknown"))
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { .. }));
    }
}
