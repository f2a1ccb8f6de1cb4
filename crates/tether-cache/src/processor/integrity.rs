//! Reverse-index maintenance and removal cleanup.
//!
//! The reverse index maps a related record's identity to the set of
//! relationship slots pointing at it. It is private to this processor; the
//! cache exposes it only through downcasting, for inspection and invariant
//! checks.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use tether_core::{
    Dependent, Operation, RecordIdentity, Records, RelationshipData, Result, Schema,
};

use super::{record_at, slot_of, OperationProcessor, PatchContext};

/// `related type → related id → set of pointer paths`.
///
/// A has-one pointer from `X.R` is recorded as
/// `"{X.type}/{X.id}/relationships/{R}/data"`; a has-many membership adds a
/// `"/{related.type}:{related.id}"` suffix. Types, ids, and relationship
/// names must not contain `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseIndex {
    map: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl ReverseIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from scratch out of a record map.
    pub fn rebuild(records: &Records) -> Self {
        let mut index = Self::new();
        for by_id in records.values() {
            for record in by_id.values() {
                let owner = record.identity();
                for (name, slot) in &record.relationships {
                    for related in slot.identities() {
                        index.insert(&related, pointer_path(&owner, name, slot, &related));
                    }
                }
            }
        }
        index
    }

    /// Record a pointer path for a related identity.
    pub fn insert(&mut self, related: &RecordIdentity, path: String) {
        self.map
            .entry(related.kind.clone())
            .or_default()
            .entry(related.id.clone())
            .or_default()
            .insert(path);
    }

    /// Drop one pointer path for a related identity. Empty buckets are
    /// pruned so that two indexes over the same pointers compare equal.
    pub fn remove(&mut self, related: &RecordIdentity, path: &str) {
        if let Some(by_id) = self.map.get_mut(&related.kind) {
            if let Some(paths) = by_id.get_mut(&related.id) {
                paths.remove(path);
                if paths.is_empty() {
                    by_id.remove(&related.id);
                }
            }
            if by_id.is_empty() {
                self.map.remove(&related.kind);
            }
        }
    }

    /// Drop every pointer path recorded for a related identity.
    pub fn remove_all(&mut self, related: &RecordIdentity) {
        if let Some(by_id) = self.map.get_mut(&related.kind) {
            by_id.remove(&related.id);
            if by_id.is_empty() {
                self.map.remove(&related.kind);
            }
        }
    }

    /// The pointer paths currently recorded for an identity.
    pub fn paths(&self, related: &RecordIdentity) -> Vec<String> {
        self.map
            .get(&related.kind)
            .and_then(|by_id| by_id.get(&related.id))
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any path is recorded for an identity.
    pub fn contains(&self, related: &RecordIdentity) -> bool {
        !self.paths(related).is_empty()
    }

    /// Whether a bucket exists for an identity, even if empty.
    pub fn has_bucket(&self, related: &RecordIdentity) -> bool {
        self.map
            .get(&related.kind)
            .map(|by_id| by_id.contains_key(&related.id))
            .unwrap_or(false)
    }
}

/// The pointer path for `owner.relationship → related`, keyed by the slot's
/// cardinality.
fn pointer_path(
    owner: &RecordIdentity,
    relationship: &str,
    slot: &RelationshipData,
    related: &RecordIdentity,
) -> String {
    match slot {
        RelationshipData::HasOne { .. } => has_one_path(owner, relationship),
        RelationshipData::HasMany { .. } => has_many_path(owner, relationship, related),
    }
}

fn has_one_path(owner: &RecordIdentity, relationship: &str) -> String {
    format!(
        "{}/{}/relationships/{}/data",
        owner.kind, owner.id, relationship
    )
}

fn has_many_path(owner: &RecordIdentity, relationship: &str, related: &RecordIdentity) -> String {
    format!(
        "{}/{}/relationships/{}/data/{}",
        owner.kind, owner.id, relationship, related
    )
}

/// A pointer path parsed back into its components.
struct ParsedPath {
    owner: RecordIdentity,
    relationship: String,
    member: Option<RecordIdentity>,
}

fn parse_path(path: &str) -> Option<ParsedPath> {
    let mut parts = path.split('/');
    let kind = parts.next()?;
    let id = parts.next()?;
    if parts.next()? != "relationships" {
        return None;
    }
    let relationship = parts.next()?;
    if parts.next()? != "data" {
        return None;
    }
    let member = match parts.next() {
        Some(token) => Some(RecordIdentity::parse(token)?),
        None => None,
    };
    Some(ParsedPath {
        owner: RecordIdentity::new(kind, id),
        relationship: relationship.to_string(),
        member,
    })
}

/// Maintains the reverse index and cleans up after record removal.
///
/// On `removeRecord` the index is walked to emit a compensating operation
/// for every live back-pointer, and relationships declaring
/// `dependent: remove` cascade removal to their targets. The per-patch
/// removing set breaks cycles in the dependency graph.
#[derive(Debug, Default)]
pub struct RelationshipIntegrityProcessor {
    rev: ReverseIndex,
}

impl RelationshipIntegrityProcessor {
    /// Create the processor with an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the reverse index.
    pub fn reverse_index(&self) -> &ReverseIndex {
        &self.rev
    }

    /// Drop the index entries for every outgoing pointer of a record.
    fn clear_outgoing(&mut self, record: &tether_core::Record) {
        let owner = record.identity();
        for (name, slot) in &record.relationships {
            for related in slot.identities() {
                let path = pointer_path(&owner, name, slot, &related);
                self.rev.remove(&related, &path);
            }
        }
    }

    /// Add index entries for every outgoing pointer of a record.
    fn index_outgoing(&mut self, record: &tether_core::Record) {
        let owner = record.identity();
        for (name, slot) in &record.relationships {
            for related in slot.identities() {
                self.rev
                    .insert(&related, pointer_path(&owner, name, slot, &related));
            }
        }
    }
}

impl OperationProcessor for RelationshipIntegrityProcessor {
    fn reset(&mut self, records: &Records, _schema: &Schema) {
        self.rev = ReverseIndex::rebuild(records);
    }

    fn before(
        &mut self,
        records: &Records,
        _schema: &Schema,
        ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        match op {
            // An add that lands on an existing record overwrites it, so its
            // stale pointers are cleared the same way as a replace.
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                if let Some(old) = record_at(records, &record.identity()) {
                    let old = old.clone();
                    self.clear_outgoing(&old);
                }
            }
            Operation::RemoveRecord { record } => {
                ctx.removing.insert(record.clone());
                if let Some(old) = record_at(records, record) {
                    let old = old.clone();
                    self.clear_outgoing(&old);
                }
            }
            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                if let Some(slot) = slot_of(records, record, relationship) {
                    if slot.contains(related_record) {
                        self.rev.remove(
                            related_record,
                            &has_many_path(record, relationship, related_record),
                        );
                    }
                }
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                ..
            } => {
                if let Some(RelationshipData::HasOne { data: Some(old) }) =
                    slot_of(records, record, relationship)
                {
                    let old = old.clone();
                    self.rev.remove(&old, &has_one_path(record, relationship));
                }
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                if let Some(slot) = slot_of(records, record, relationship) {
                    for old in slot.identities() {
                        if !related_records.contains(&old) {
                            self.rev
                                .remove(&old, &has_many_path(record, relationship, &old));
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(Vec::new())
    }

    fn after(
        &mut self,
        records: &Records,
        schema: &Schema,
        ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        let Operation::RemoveRecord { record } = op else {
            return Ok(Vec::new());
        };

        let mut ops = Vec::new();

        // Detach every live back-pointer recorded for the removed record.
        for path in self.rev.paths(record) {
            let Some(parsed) = parse_path(&path) else {
                continue;
            };
            if ctx.removing.contains(&parsed.owner) {
                continue;
            }
            let op = match parsed.member {
                Some(member) => Operation::RemoveFromHasMany {
                    record: parsed.owner,
                    relationship: parsed.relationship,
                    related_record: member,
                },
                None => Operation::ReplaceHasOne {
                    record: parsed.owner,
                    relationship: parsed.relationship,
                    related_record: None,
                },
            };
            ops.push(op);
        }

        // Cascade removal through dependent relationships.
        if let (Some(old), Some(model)) =
            (record_at(records, record), schema.model(&record.kind))
        {
            let mut cascading = BTreeSet::new();
            for (name, def) in &model.relationships {
                if def.dependent != Some(Dependent::Remove) {
                    continue;
                }
                let Some(slot) = old.relationship(name) else {
                    continue;
                };
                for related in slot.identities() {
                    if record_at(records, &related).is_none()
                        || ctx.removing.contains(&related)
                        || !cascading.insert(related.clone())
                    {
                        continue;
                    }
                    ops.push(Operation::RemoveRecord { record: related });
                }
            }
        }

        Ok(ops)
    }

    fn finally(
        &mut self,
        records: &Records,
        _schema: &Schema,
        _ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        match op {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                self.index_outgoing(record);
            }
            Operation::RemoveRecord { record } => {
                self.rev.remove_all(record);
            }
            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                self.rev.insert(
                    related_record,
                    has_many_path(record, relationship, related_record),
                );
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                ..
            } => {
                if let Some(slot) = slot_of(records, record, relationship) {
                    for related in slot.identities() {
                        self.rev
                            .insert(&related, has_many_path(record, relationship, &related));
                    }
                }
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record: Some(related),
            } => {
                self.rev
                    .insert(related, has_one_path(record, relationship));
            }
            _ => {}
        }
        Ok(Vec::new())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::Record;

    #[test]
    fn path_roundtrip_has_one() {
        let owner = RecordIdentity::new("planet", "saturn");
        let path = has_one_path(&owner, "next");
        assert_eq!(path, "planet/saturn/relationships/next/data");

        let parsed = parse_path(&path).unwrap();
        assert_eq!(parsed.owner, owner);
        assert_eq!(parsed.relationship, "next");
        assert!(parsed.member.is_none());
    }

    #[test]
    fn path_roundtrip_has_many() {
        let owner = RecordIdentity::new("planet", "jupiter");
        let related = RecordIdentity::new("moon", "io");
        let path = has_many_path(&owner, "moons", &related);
        assert_eq!(path, "planet/jupiter/relationships/moons/data/moon:io");

        let parsed = parse_path(&path).unwrap();
        assert_eq!(parsed.owner, owner);
        assert_eq!(parsed.relationship, "moons");
        assert_eq!(parsed.member, Some(related));
    }

    #[test]
    fn rebuild_matches_incremental() {
        let jupiter = Record::new("planet", "jupiter")
            .with_has_many("moons", [RecordIdentity::new("moon", "io")]);
        let io = Record::new("moon", "io")
            .with_has_one("planet", Some(RecordIdentity::new("planet", "jupiter")));

        let records = tether_core::records_from([jupiter.clone(), io.clone()]);
        let rebuilt = ReverseIndex::rebuild(&records);

        let mut incremental = ReverseIndex::new();
        let mut processor = RelationshipIntegrityProcessor::new();
        processor.index_outgoing(&jupiter);
        processor.index_outgoing(&io);
        incremental.insert(
            &RecordIdentity::new("moon", "io"),
            "planet/jupiter/relationships/moons/data/moon:io".to_string(),
        );
        incremental.insert(
            &RecordIdentity::new("planet", "jupiter"),
            "moon/io/relationships/planet/data".to_string(),
        );

        assert_eq!(rebuilt, incremental);
        assert_eq!(processor.reverse_index(), &rebuilt);
    }
}
