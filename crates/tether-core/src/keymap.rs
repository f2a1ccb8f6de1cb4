//! Bidirectional mapping between local record ids and remote key values.
//!
//! Populated lazily as records carrying `keys` are added or seen. Shared
//! between the store and remote sources via `Arc`.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::record::Record;

/// `(type, key name, remote value) ↔ local id`, thread-safe.
#[derive(Debug, Default)]
pub struct KeyMap {
    inner: RwLock<KeyMapInner>,
}

#[derive(Debug, Default)]
struct KeyMapInner {
    /// (type, key name, remote value) → local id.
    ids: HashMap<(String, String, String), String>,
    /// (type, key name, local id) → remote value.
    keys: HashMap<(String, String, String), String>,
}

impl KeyMap {
    /// Create an empty key map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one mapping.
    pub fn set(&self, kind: &str, key: &str, value: &str, id: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.ids.insert(
            (kind.to_string(), key.to_string(), value.to_string()),
            id.to_string(),
        );
        inner.keys.insert(
            (kind.to_string(), key.to_string(), id.to_string()),
            value.to_string(),
        );
    }

    /// Register every key carried by a record.
    pub fn push_record(&self, record: &Record) {
        for (key, value) in &record.keys {
            self.set(&record.kind, key, value, &record.id);
        }
    }

    /// Resolve a remote key value to a local id.
    pub fn id_for_key(&self, kind: &str, key: &str, value: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .ids
            .get(&(kind.to_string(), key.to_string(), value.to_string()))
            .cloned()
    }

    /// Resolve a local id to a remote key value.
    pub fn key_for_id(&self, kind: &str, key: &str, id: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .keys
            .get(&(kind.to_string(), key.to_string(), id.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_mapping() {
        let map = KeyMap::new();
        map.set("planet", "remoteId", "12345", "local-1");

        assert_eq!(
            map.id_for_key("planet", "remoteId", "12345"),
            Some("local-1".to_string())
        );
        assert_eq!(
            map.key_for_id("planet", "remoteId", "local-1"),
            Some("12345".to_string())
        );
        assert_eq!(map.id_for_key("planet", "remoteId", "99999"), None);
        assert_eq!(map.id_for_key("moon", "remoteId", "12345"), None);
    }

    #[test]
    fn lazy_population_from_record() {
        let map = KeyMap::new();
        let record = Record::new("planet", "local-2").with_key("remoteId", "777");
        map.push_record(&record);

        assert_eq!(
            map.id_for_key("planet", "remoteId", "777"),
            Some("local-2".to_string())
        );
    }

    #[test]
    fn later_mapping_wins() {
        let map = KeyMap::new();
        map.set("planet", "remoteId", "1", "a");
        map.set("planet", "remoteId", "1", "b");
        assert_eq!(map.id_for_key("planet", "remoteId", "1"), Some("b".to_string()));
    }
}
