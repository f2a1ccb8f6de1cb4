//! The operation-processor protocol.
//!
//! A processor observes every operation applied through
//! [`Cache::patch`](crate::Cache::patch) and may emit compensating
//! operations. Emitted operations pass through the full processor cycle
//! themselves, so hooks must guard on current state to terminate.

use std::any::Any;
use std::collections::HashSet;

use tether_core::{Operation, Record, RecordIdentity, Records, RelationshipData, Result, Schema};

mod integrity;
mod inverse;

pub use integrity::{RelationshipIntegrityProcessor, ReverseIndex};
pub use inverse::InverseRelationshipProcessor;

/// Per-patch scratch state shared by all processors.
#[derive(Debug, Default)]
pub struct PatchContext {
    /// Records currently being removed within this patch. Operations that
    /// reference a member are treated as settled, which breaks cycles in
    /// dependent-removal graphs.
    pub removing: HashSet<RecordIdentity>,
}

/// A pluggable observer on cache patching.
///
/// Hooks default to emitting nothing, so a processor implements only the
/// phases it needs. `before` and `after` are both invoked against the
/// pre-operation state; `before` emissions are applied ahead of the primary
/// operation, `after` emissions behind it, and `finally` runs once the
/// primary and its `after` emissions have landed.
pub trait OperationProcessor: Send + Sync {
    /// Called at the start of every patch.
    fn begin(&mut self) {}

    /// Rebuild derived state from a fresh record map (cache reset, or
    /// rollback after a failed patch).
    fn reset(&mut self, records: &Records, schema: &Schema) {
        let _ = (records, schema);
    }

    /// Emit operations to apply before the primary operation.
    fn before(
        &mut self,
        records: &Records,
        schema: &Schema,
        ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        let _ = (records, schema, ctx, op);
        Ok(Vec::new())
    }

    /// Emit operations to apply after the primary operation.
    fn after(
        &mut self,
        records: &Records,
        schema: &Schema,
        ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        let _ = (records, schema, ctx, op);
        Ok(Vec::new())
    }

    /// Emit operations once the primary operation and its `after` emissions
    /// have been applied.
    fn finally(
        &mut self,
        records: &Records,
        schema: &Schema,
        ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        let _ = (records, schema, ctx, op);
        Ok(Vec::new())
    }

    /// Downcast support for concrete-processor inspection.
    fn as_any(&self) -> &dyn Any;
}

/// Look up a record in a record map.
pub(crate) fn record_at<'a>(records: &'a Records, identity: &RecordIdentity) -> Option<&'a Record> {
    records.get(&identity.kind)?.get(&identity.id)
}

/// Whether `owner.relationship` currently links `related`.
pub(crate) fn linked(
    records: &Records,
    owner: &RecordIdentity,
    relationship: &str,
    related: &RecordIdentity,
) -> bool {
    record_at(records, owner)
        .and_then(|record| record.relationship(relationship))
        .map(|slot| slot.contains(related))
        .unwrap_or(false)
}

/// The current contents of `owner.relationship`, if the slot exists.
pub(crate) fn slot_of<'a>(
    records: &'a Records,
    owner: &RecordIdentity,
    relationship: &str,
) -> Option<&'a RelationshipData> {
    record_at(records, owner)?.relationship(relationship)
}
