//! The in-memory relational cache.

use std::sync::Arc;

use serde_json::Value;
use tether_core::{
    Error, Operation, Record, RecordIdentity, Records, RelationshipData, RelationshipKind,
    Result, Schema, SchemaError,
};

use crate::processor::{
    InverseRelationshipProcessor, OperationProcessor, PatchContext,
    RelationshipIntegrityProcessor,
};

/// Relational record cache with processor-maintained integrity.
///
/// Operations are applied one at a time, in order, and each passes through
/// the registered processors' `before`/`after`/`finally` cycle. A patch is
/// all-or-nothing: if any operation fails, the record map is restored and
/// processor state is rebuilt from it.
pub struct Cache {
    schema: Arc<Schema>,
    records: Records,
    processors: Vec<Box<dyn OperationProcessor>>,
}

impl Cache {
    /// Create a cache with the default processors (inverse maintenance and
    /// relationship integrity, in that order).
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_processors(
            schema,
            vec![
                Box::new(InverseRelationshipProcessor::new()),
                Box::new(RelationshipIntegrityProcessor::new()),
            ],
        )
    }

    /// Create a cache with an explicit processor list.
    pub fn with_processors(
        schema: Arc<Schema>,
        processors: Vec<Box<dyn OperationProcessor>>,
    ) -> Self {
        Self {
            schema,
            records: Records::new(),
            processors,
        }
    }

    /// The schema this cache validates against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Look up a record.
    pub fn record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(&identity.kind)?.get(&identity.id)
    }

    /// Whether a record is present.
    pub fn contains_record(&self, identity: &RecordIdentity) -> bool {
        self.record(identity).is_some()
    }

    /// All records of a type.
    pub fn records_of_kind(&self, kind: &str) -> Vec<&Record> {
        self.records
            .get(kind)
            .map(|by_id| by_id.values().collect())
            .unwrap_or_default()
    }

    /// A clone of the full record map.
    pub fn dump(&self) -> Records {
        self.records.clone()
    }

    /// Navigate a deep path into the record map, returning the JSON value at
    /// that path. Has-many relationship data appears as an array of
    /// identities.
    pub fn get(&self, path: &[&str]) -> Option<Value> {
        match path {
            [] => None,
            [kind] => {
                let by_id = self.records.get(*kind)?;
                let mut map = serde_json::Map::new();
                for (id, record) in by_id {
                    map.insert(id.clone(), serde_json::to_value(record).ok()?);
                }
                Some(Value::Object(map))
            }
            [kind, id, rest @ ..] => {
                let record = self.records.get(*kind)?.get(*id)?;
                let mut value = serde_json::to_value(record).ok()?;
                for segment in rest {
                    value = match value {
                        Value::Object(mut map) => map.remove(*segment)?,
                        Value::Array(mut items) => {
                            let index: usize = segment.parse().ok()?;
                            if index >= items.len() {
                                return None;
                            }
                            items.swap_remove(index)
                        }
                        _ => return None,
                    };
                }
                Some(value)
            }
        }
    }

    /// Whether a deep path exists.
    pub fn has(&self, path: &[&str]) -> bool {
        self.get(path).is_some()
    }

    /// Replace the entire record map and rebuild processor state.
    pub fn reset(&mut self, data: Records) {
        self.records = data;
        let schema = Arc::clone(&self.schema);
        for processor in &mut self.processors {
            processor.reset(&self.records, &schema);
        }
    }

    /// Inspect a concrete processor by type.
    pub fn processor<P: OperationProcessor + 'static>(&self) -> Option<&P> {
        self.processors
            .iter()
            .find_map(|p| p.as_any().downcast_ref::<P>())
    }

    /// Apply operations atomically, returning every operation applied —
    /// the callers' operations interleaved with processor emissions.
    pub fn patch(&mut self, ops: &[Operation]) -> Result<Vec<Operation>> {
        let snapshot = self.records.clone();
        let schema = Arc::clone(&self.schema);
        let mut processors = std::mem::take(&mut self.processors);
        for processor in &mut processors {
            processor.begin();
        }

        let mut ctx = PatchContext::default();
        let mut applied = Vec::new();
        let mut outcome = Ok(());
        for op in ops {
            if let Err(err) = Self::apply_op(
                &mut self.records,
                &schema,
                &mut processors,
                &mut ctx,
                op,
                &mut applied,
            ) {
                outcome = Err(err);
                break;
            }
        }

        if let Err(err) = outcome {
            tracing::debug!(error = %err, "patch failed, rolling back");
            self.records = snapshot;
            for processor in &mut processors {
                processor.reset(&self.records, &schema);
            }
            self.processors = processors;
            return Err(err);
        }

        self.processors = processors;
        Ok(applied)
    }

    fn apply_op(
        records: &mut Records,
        schema: &Schema,
        processors: &mut [Box<dyn OperationProcessor>],
        ctx: &mut PatchContext,
        op: &Operation,
        applied: &mut Vec<Operation>,
    ) -> Result<()> {
        let mut before_ops = Vec::new();
        for processor in processors.iter_mut() {
            before_ops.extend(processor.before(records, schema, ctx, op)?);
        }
        for emitted in &before_ops {
            Self::apply_op(records, schema, processors, ctx, emitted, applied)?;
        }

        let mut after_ops = Vec::new();
        for processor in processors.iter_mut() {
            after_ops.extend(processor.after(records, schema, ctx, op)?);
        }

        Self::apply_primary(records, schema, op)?;
        applied.push(op.clone());

        for emitted in &after_ops {
            Self::apply_op(records, schema, processors, ctx, emitted, applied)?;
        }

        let mut final_ops = Vec::new();
        for processor in processors.iter_mut() {
            final_ops.extend(processor.finally(records, schema, ctx, op)?);
        }
        for emitted in &final_ops {
            Self::apply_op(records, schema, processors, ctx, emitted, applied)?;
        }

        Ok(())
    }

    fn apply_primary(records: &mut Records, schema: &Schema, op: &Operation) -> Result<()> {
        match op {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                Self::validate_record(schema, record)?;
                records
                    .entry(record.kind.clone())
                    .or_default()
                    .insert(record.id.clone(), record.clone());
            }
            Operation::RemoveRecord { record } => {
                if let Some(by_id) = records.get_mut(&record.kind) {
                    by_id.remove(&record.id);
                }
            }
            Operation::ReplaceKey { record, key, value } => {
                let target = Self::record_mut(records, record)?;
                target.keys.insert(key.clone(), value.clone());
            }
            Operation::ReplaceAttribute {
                record,
                attribute,
                value,
            } => {
                let target = Self::record_mut(records, record)?;
                target.attributes.insert(attribute.clone(), value.clone());
            }
            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                Self::expect_relationship(
                    schema,
                    &record.kind,
                    relationship,
                    RelationshipKind::HasMany,
                )?;
                let target = Self::record_mut(records, record)?;
                let slot = target
                    .relationships
                    .entry(relationship.clone())
                    .or_insert_with(RelationshipData::many);
                if let RelationshipData::HasMany { data } = slot {
                    data.insert(related_record.clone());
                } else {
                    *slot = RelationshipData::many_of([related_record.clone()]);
                }
            }
            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                Self::expect_relationship(
                    schema,
                    &record.kind,
                    relationship,
                    RelationshipKind::HasMany,
                )?;
                if let Ok(target) = Self::record_mut(records, record) {
                    if let Some(RelationshipData::HasMany { data }) =
                        target.relationships.get_mut(relationship)
                    {
                        data.remove(related_record);
                    }
                }
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                Self::expect_relationship(
                    schema,
                    &record.kind,
                    relationship,
                    RelationshipKind::HasMany,
                )?;
                let target = Self::record_mut(records, record)?;
                target.relationships.insert(
                    relationship.clone(),
                    RelationshipData::many_of(related_records.iter().cloned()),
                );
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                Self::expect_relationship(
                    schema,
                    &record.kind,
                    relationship,
                    RelationshipKind::HasOne,
                )?;
                let target = Self::record_mut(records, record)?;
                target.relationships.insert(
                    relationship.clone(),
                    RelationshipData::one(related_record.clone()),
                );
            }
        }
        Ok(())
    }

    fn record_mut<'a>(
        records: &'a mut Records,
        identity: &RecordIdentity,
    ) -> Result<&'a mut Record> {
        records
            .get_mut(&identity.kind)
            .and_then(|by_id| by_id.get_mut(&identity.id))
            .ok_or_else(|| Error::record_not_found(&identity.kind, &identity.id))
    }

    fn expect_relationship(
        schema: &Schema,
        kind: &str,
        relationship: &str,
        cardinality: RelationshipKind,
    ) -> Result<()> {
        let def = schema
            .relationship(kind, relationship)
            .ok_or_else(|| Error::relationship_not_found(kind, relationship))?;
        if def.kind != cardinality {
            return Err(Error::relationship_not_found(kind, relationship));
        }
        Ok(())
    }

    fn validate_record(schema: &Schema, record: &Record) -> Result<()> {
        if !schema.has_model(&record.kind) {
            return Err(Error::Schema(SchemaError::ModelNotDefined(
                record.kind.clone(),
            )));
        }
        for (name, slot) in &record.relationships {
            let def = schema
                .relationship(&record.kind, name)
                .ok_or_else(|| Error::relationship_not_found(&record.kind, name))?;
            let matches = matches!(
                (def.kind, slot),
                (RelationshipKind::HasOne, RelationshipData::HasOne { .. })
                    | (RelationshipKind::HasMany, RelationshipData::HasMany { .. })
            );
            if !matches {
                return Err(Error::Serialization(format!(
                    "relationship {}.{} carries data of the wrong cardinality",
                    record.kind, name
                )));
            }
        }
        Ok(())
    }
}
