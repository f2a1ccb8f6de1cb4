//! Inverse-relationship maintenance.
//!
//! Keeps both sides of bidirectional relationships in agreement: adding a
//! pointer attaches the inverse pointer, dropping a pointer detaches it.
//! Record removal is not handled here; the integrity processor cleans up
//! through the reverse index instead.

use std::any::Any;

use tether_core::{
    Error, Operation, RecordIdentity, Records, RelationshipKind, Result, Schema,
};

use super::{linked, record_at, slot_of, OperationProcessor, PatchContext};

/// Emits compensating operations so that `X.R` contains `Y` iff
/// `Y.inverse(R)` contains `X`.
///
/// Compensating operations are recorded and exempted from further inverse
/// processing when they come back through the cycle: overwriting one side of
/// a has-one link must not cascade into detaching unrelated pointers.
#[derive(Debug, Default)]
pub struct InverseRelationshipProcessor {
    settled: Vec<Operation>,
}

impl InverseRelationshipProcessor {
    /// Create the processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a pending exemption for `op`, if one was recorded.
    fn consume_settled(&mut self, op: &Operation) -> bool {
        if let Some(pos) = self.settled.iter().position(|o| o == op) {
            self.settled.remove(pos);
            true
        } else {
            false
        }
    }

    /// The operation that attaches `owner` to `related.inverse_name`.
    fn attach(
        schema: &Schema,
        related_model: &str,
        inverse_name: &str,
        related: &RecordIdentity,
        owner: &RecordIdentity,
    ) -> Result<Operation> {
        let inverse = schema
            .relationship(related_model, inverse_name)
            .ok_or_else(|| Error::relationship_not_found(related_model, inverse_name))?;

        Ok(match inverse.kind {
            RelationshipKind::HasMany => Operation::AddToHasMany {
                record: related.clone(),
                relationship: inverse_name.to_string(),
                related_record: owner.clone(),
            },
            RelationshipKind::HasOne => Operation::ReplaceHasOne {
                record: related.clone(),
                relationship: inverse_name.to_string(),
                related_record: Some(owner.clone()),
            },
        })
    }

    /// The operation that detaches `owner` from `related.inverse_name`.
    fn detach(
        schema: &Schema,
        related_model: &str,
        inverse_name: &str,
        related: &RecordIdentity,
        owner: &RecordIdentity,
    ) -> Result<Operation> {
        let inverse = schema
            .relationship(related_model, inverse_name)
            .ok_or_else(|| Error::relationship_not_found(related_model, inverse_name))?;

        Ok(match inverse.kind {
            RelationshipKind::HasMany => Operation::RemoveFromHasMany {
                record: related.clone(),
                relationship: inverse_name.to_string(),
                related_record: owner.clone(),
            },
            RelationshipKind::HasOne => Operation::ReplaceHasOne {
                record: related.clone(),
                relationship: inverse_name.to_string(),
                related_record: None,
            },
        })
    }

    /// Attach op for one pointer, if the far side exists and is not yet
    /// linked.
    fn attach_if_needed(
        &self,
        records: &Records,
        schema: &Schema,
        owner: &RecordIdentity,
        relationship: &str,
        related: &RecordIdentity,
    ) -> Result<Option<Operation>> {
        let def = schema
            .relationship(&owner.kind, relationship)
            .ok_or_else(|| Error::relationship_not_found(&owner.kind, relationship))?;

        let Some(inverse_name) = &def.inverse else {
            return Ok(None);
        };
        if record_at(records, related).is_none() || linked(records, related, inverse_name, owner) {
            return Ok(None);
        }
        Self::attach(schema, &def.model, inverse_name, related, owner).map(Some)
    }

    /// Detach op for one pointer, if the far side currently links back.
    fn detach_if_linked(
        &self,
        records: &Records,
        schema: &Schema,
        owner: &RecordIdentity,
        relationship: &str,
        related: &RecordIdentity,
    ) -> Result<Option<Operation>> {
        let def = schema
            .relationship(&owner.kind, relationship)
            .ok_or_else(|| Error::relationship_not_found(&owner.kind, relationship))?;

        let Some(inverse_name) = &def.inverse else {
            return Ok(None);
        };
        if !linked(records, related, inverse_name, owner) {
            return Ok(None);
        }
        Self::detach(schema, &def.model, inverse_name, related, owner).map(Some)
    }
}

impl OperationProcessor for InverseRelationshipProcessor {
    fn begin(&mut self) {
        self.settled.clear();
    }

    fn reset(&mut self, _records: &Records, _schema: &Schema) {
        self.settled.clear();
    }

    fn after(
        &mut self,
        records: &Records,
        schema: &Schema,
        _ctx: &mut PatchContext,
        op: &Operation,
    ) -> Result<Vec<Operation>> {
        if self.consume_settled(op) {
            return Ok(Vec::new());
        }

        let mut ops = Vec::new();

        match op {
            Operation::AddRecord { record } => {
                for (relationship, related) in record.pointers() {
                    if let Some(attach) = self.attach_if_needed(
                        records,
                        schema,
                        &record.identity(),
                        &relationship,
                        &related,
                    )? {
                        ops.push(attach);
                    }
                }
            }
            Operation::ReplaceRecord { record } => {
                let identity = record.identity();
                if let Some(old) = record_at(records, &identity) {
                    for (relationship, related) in old.pointers() {
                        let retained = record
                            .relationship(&relationship)
                            .map(|slot| slot.contains(&related))
                            .unwrap_or(false);
                        if retained {
                            continue;
                        }
                        if let Some(detach) = self.detach_if_linked(
                            records,
                            schema,
                            &identity,
                            &relationship,
                            &related,
                        )? {
                            ops.push(detach);
                        }
                    }
                }
                for (relationship, related) in record.pointers() {
                    if let Some(attach) =
                        self.attach_if_needed(records, schema, &identity, &relationship, &related)?
                    {
                        ops.push(attach);
                    }
                }
            }
            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                if let Some(attach) =
                    self.attach_if_needed(records, schema, record, relationship, related_record)?
                {
                    ops.push(attach);
                }
            }
            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                if let Some(detach) =
                    self.detach_if_linked(records, schema, record, relationship, related_record)?
                {
                    ops.push(detach);
                }
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                if let Some(slot) = slot_of(records, record, relationship) {
                    for old in slot.identities() {
                        if Some(&old) == related_record.as_ref() {
                            continue;
                        }
                        if let Some(detach) =
                            self.detach_if_linked(records, schema, record, relationship, &old)?
                        {
                            ops.push(detach);
                        }
                    }
                }
                if let Some(related) = related_record {
                    if let Some(attach) =
                        self.attach_if_needed(records, schema, record, relationship, related)?
                    {
                        ops.push(attach);
                    }
                }
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                if let Some(slot) = slot_of(records, record, relationship) {
                    for old in slot.identities() {
                        if related_records.contains(&old) {
                            continue;
                        }
                        if let Some(detach) =
                            self.detach_if_linked(records, schema, record, relationship, &old)?
                        {
                            ops.push(detach);
                        }
                    }
                }
                for related in related_records {
                    if let Some(attach) =
                        self.attach_if_needed(records, schema, record, relationship, related)?
                    {
                        ops.push(attach);
                    }
                }
            }
            Operation::RemoveRecord { .. }
            | Operation::ReplaceKey { .. }
            | Operation::ReplaceAttribute { .. } => {}
        }

        self.settled.extend(ops.iter().cloned());
        Ok(ops)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
