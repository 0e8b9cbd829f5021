//! # Hierarchical Mapper
//!
//! Maps a submission tree onto persisted records, one descriptor-driven
//! pass, depth-first, siblings in document order.
//!
//! For each node:
//!
//! 1. derive the natural key;
//! 2. load the persisted record (absent: `NEW`, present: `UNCHANGED`);
//! 3. write every scalar column with full-replacement semantics: an absent
//!    leaf clears the column;
//! 4. write every coded triple as a unit;
//! 5. map each child collection, collecting the keys mapped;
//! 6. delete what each collection no longer contains, according to its
//!    deletion policy, cascading to descendants;
//! 7. aggregate the status of the subtree.
//!
//! Children finish (including their own deletions) before their parent
//! computes its deletion set.
//!
//! A windowed collection only restates the records inside its window. When
//! its keys are positional, a persisted record the window does not cover
//! holds its position: incoming items are numbered past it unless they carry
//! the same timestamp, so a partial restatement never lands on a record it
//! does not describe.
//!
//! Datetime leaves are stored naive in the reference zone. A persisted
//! datetime is localized before comparison, so restating an instant with a
//! different offset is not a modification.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use rdc_core::{CodedValue, NaturalKey, Pid, ReferenceZone, Timestamp};
use rdc_store::{FieldValue, Record, RecordRepository};

use crate::descriptor::{
    Cardinality, Catalogue, ChildSpec, DeletionPolicy, EntityDescriptor, KeyRule,
};
use crate::document::{normalize_decimal, Leaf, Node, Window};
use crate::error::MergeError;
use crate::plan::{ChildKeys, MappedRecord, MergePlan, MergeWarning, RecordRef, RecordStatus};

/// The merge engine for one catalogue and reference zone.
#[derive(Debug, Clone)]
pub struct Merger {
    catalogue: Catalogue,
    zone: ReferenceZone,
}

struct MapContext<'a, R: ?Sized> {
    repo: &'a R,
    pid: &'a Pid,
    now: Timestamp,
    records: BTreeMap<RecordRef, MappedRecord>,
    warnings: Vec<MergeWarning>,
}

impl Merger {
    /// Create a merger.
    pub fn new(catalogue: Catalogue, zone: ReferenceZone) -> Self {
        Self { catalogue, zone }
    }

    /// The descriptor catalogue.
    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// The reference zone.
    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    /// Map the patient tree of `pid` against the records visible in `repo`.
    ///
    /// Reads only; the returned plan is written with [`MergePlan::stage`].
    pub fn merge<R>(
        &self,
        repo: &R,
        pid: &Pid,
        patient: &Node,
        now: Timestamp,
    ) -> Result<MergePlan, MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        let mut ctx = MapContext {
            repo,
            pid,
            now,
            records: BTreeMap::new(),
            warnings: Vec::new(),
        };
        let root = self.catalogue.root()?;
        let root_key = NaturalKey::root(pid);
        self.map(&mut ctx, root, patient, None, 0)?;

        let plan = MergePlan::new(
            pid.clone(),
            RecordRef::new(&root.kind, root_key),
            ctx.records,
            ctx.warnings,
        );
        tracing::debug!(pid = %pid, deltas = %plan.deltas().counts(), "submission mapped");
        Ok(plan)
    }

    fn map<R>(
        &self,
        ctx: &mut MapContext<'_, R>,
        descriptor: &EntityDescriptor,
        node: &Node,
        parent: Option<&NaturalKey>,
        seq: usize,
    ) -> Result<Option<NaturalKey>, MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        let kind = descriptor.kind.as_str();
        let key = descriptor.key.derive(kind, node, ctx.pid, parent, seq)?;
        let address = RecordRef::new(kind, key.clone());
        if ctx.records.contains_key(&address) {
            tracing::warn!(kind, key = %key, "duplicate natural key in submission");
            ctx.warnings.push(MergeWarning::DuplicateKey {
                kind: kind.to_string(),
                key,
            });
            return Ok(None);
        }

        let (mut record, mut status) = match ctx.repo.get_by_key(kind, &key)? {
            Some(existing) => (existing, RecordStatus::Unchanged),
            None => (
                Record::new(kind, key.clone(), parent.cloned(), ctx.pid.clone(), ctx.now),
                RecordStatus::New,
            ),
        };

        let mut changed = false;
        if record.parent.as_ref() != parent {
            record.parent = parent.cloned();
            changed = true;
        }
        for spec in &descriptor.fields {
            let incoming = node.field(&spec.source);
            if incoming.is_none() && spec.mandatory {
                ctx.warnings.push(MergeWarning::MissingMandatory {
                    kind: kind.to_string(),
                    key: key.clone(),
                    field: spec.source.clone(),
                });
            }
            changed |= self.write_scalar(&mut record, &spec.column, incoming);
        }
        for spec in &descriptor.coded {
            let incoming = node.field(&spec.source);
            if incoming.is_none() && spec.mandatory {
                ctx.warnings.push(MergeWarning::MissingMandatory {
                    kind: kind.to_string(),
                    key: key.clone(),
                    field: spec.source.clone(),
                });
            }
            changed |= write_coded(&mut record, &spec.column, incoming);
        }
        if changed {
            record.updated_at = ctx.now;
            if status == RecordStatus::Unchanged {
                status = RecordStatus::Modified;
            }
        }

        let mut children = Vec::with_capacity(descriptor.children.len());
        for spec in &descriptor.children {
            children.push(self.map_collection(ctx, spec, node, &key)?);
        }

        let subtree_changed = children.iter().any(|child| {
            !child.deleted.is_empty()
                || child.keys.iter().any(|k| {
                    ctx.records
                        .get(&RecordRef::new(&child.kind, k.clone()))
                        .is_some_and(|m| m.aggregate != RecordStatus::Unchanged)
                })
        });
        let aggregate = match status {
            RecordStatus::Unchanged if subtree_changed => RecordStatus::Modified,
            other => other,
        };
        tracing::debug!(kind, key = %key, status = %status, aggregate = %aggregate, "record mapped");

        ctx.records.insert(
            address,
            MappedRecord {
                record,
                status,
                aggregate,
                children,
            },
        );
        Ok(Some(key))
    }

    fn map_collection<R>(
        &self,
        ctx: &mut MapContext<'_, R>,
        spec: &ChildSpec,
        node: &Node,
        parent_key: &NaturalKey,
    ) -> Result<ChildKeys, MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        let descriptor = self.catalogue.get(&spec.kind)?;
        let collection = node.collection(&spec.collection);
        let mut items: &[Node] = collection.map(|c| c.items.as_slice()).unwrap_or(&[]);
        if spec.cardinality == Cardinality::Singleton && items.len() > 1 {
            ctx.warnings.push(MergeWarning::SingletonOverflow {
                kind: spec.kind.clone(),
                parent: parent_key.clone(),
                count: items.len(),
            });
            items = &items[..1];
        }

        let window = collection.and_then(|c| c.window.as_ref());
        let held = self.held_positions(ctx, spec, descriptor, parent_key, window)?;

        let mut keys = Vec::with_capacity(items.len());
        let mut seq = 0;
        for item in items {
            while let Some(stored) = held.get(&NaturalKey::child(parent_key, seq)) {
                if self.restates(spec, descriptor, item, stored.as_ref()) {
                    break;
                }
                tracing::debug!(kind = %spec.kind, seq, "position held outside the window");
                seq += 1;
            }
            if let Some(key) = self.map(ctx, descriptor, item, Some(parent_key), seq)? {
                keys.push(key);
            }
            seq += 1;
        }

        let deleted = self.deletion_set(ctx, spec, descriptor, parent_key, &keys, window)?;
        Ok(ChildKeys {
            collection: spec.collection.clone(),
            kind: spec.kind.clone(),
            keys,
            deleted,
        })
    }

    /// Persisted children of `parent_key` the submission no longer contains,
    /// restricted by the collection's policy, followed by their descendants.
    fn deletion_set<R>(
        &self,
        ctx: &MapContext<'_, R>,
        spec: &ChildSpec,
        descriptor: &EntityDescriptor,
        parent_key: &NaturalKey,
        mapped: &[NaturalKey],
        window: Option<&Window>,
    ) -> Result<Vec<RecordRef>, MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        let mapped: BTreeSet<&NaturalKey> = mapped.iter().collect();
        let absent = ctx
            .repo
            .children(&spec.kind, parent_key)?
            .into_iter()
            .filter(|record| !mapped.contains(&record.key));

        let doomed: Vec<Record> = match (&spec.deletion, window) {
            (DeletionPolicy::Full, _) => absent.collect(),
            (DeletionPolicy::Never, _) | (DeletionPolicy::Windowed { .. }, None) => Vec::new(),
            (DeletionPolicy::Windowed { timestamp_column }, Some(window)) => absent
                .filter(|record| self.inside(record, timestamp_column, Some(window)))
                .collect(),
        };

        let mut deleted = Vec::new();
        for record in doomed {
            tracing::debug!(kind = %record.kind, key = %record.key, "record deleted");
            deleted.push(RecordRef::new(&record.kind, record.key.clone()));
            self.cascade(ctx, descriptor, &record.key, &mut deleted)?;
        }
        Ok(deleted)
    }

    /// Persisted children of a windowed, sequence-keyed collection that the
    /// window does not cover, by key, with their timestamps. Without a
    /// window every persisted child is held.
    fn held_positions<R>(
        &self,
        ctx: &MapContext<'_, R>,
        spec: &ChildSpec,
        descriptor: &EntityDescriptor,
        parent_key: &NaturalKey,
        window: Option<&Window>,
    ) -> Result<BTreeMap<NaturalKey, Option<NaiveDateTime>>, MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        let DeletionPolicy::Windowed { timestamp_column } = &spec.deletion else {
            return Ok(BTreeMap::new());
        };
        if descriptor.key != KeyRule::Sequence {
            return Ok(BTreeMap::new());
        }
        Ok(ctx
            .repo
            .children(&spec.kind, parent_key)?
            .into_iter()
            .filter(|record| !self.inside(record, timestamp_column, window))
            .map(|record| {
                let stored = record
                    .get(timestamp_column)
                    .and_then(FieldValue::as_datetime)
                    .copied();
                (record.key, stored)
            })
            .collect())
    }

    /// Whether `item` carries the timestamp of a held record.
    fn restates(
        &self,
        spec: &ChildSpec,
        descriptor: &EntityDescriptor,
        item: &Node,
        stored: Option<&NaiveDateTime>,
    ) -> bool {
        let DeletionPolicy::Windowed { timestamp_column } = &spec.deletion else {
            return false;
        };
        let incoming = descriptor
            .fields
            .iter()
            .find(|field| field.column == *timestamp_column)
            .and_then(|field| item.field(&field.source));
        match (stored, incoming) {
            (Some(stored), Some(Leaf::DateTime(instant))) => self.zone.same_instant(stored, instant),
            (None, None) => true,
            _ => false,
        }
    }

    fn inside(&self, record: &Record, timestamp_column: &str, window: Option<&Window>) -> bool {
        window.is_some_and(|window| {
            record
                .get(timestamp_column)
                .and_then(FieldValue::as_datetime)
                .is_some_and(|t| window.strictly_contains(&self.zone.localize(t)))
        })
    }

    fn cascade<R>(
        &self,
        ctx: &MapContext<'_, R>,
        descriptor: &EntityDescriptor,
        key: &NaturalKey,
        out: &mut Vec<RecordRef>,
    ) -> Result<(), MergeError>
    where
        R: RecordRepository + ?Sized,
    {
        for spec in &descriptor.children {
            let child_descriptor = self.catalogue.get(&spec.kind)?;
            for child in ctx.repo.children(&spec.kind, key)? {
                out.push(RecordRef::new(&child.kind, child.key.clone()));
                self.cascade(ctx, child_descriptor, &child.key, out)?;
            }
        }
        Ok(())
    }

    fn write_scalar(&self, record: &mut Record, column: &str, incoming: Option<&Leaf>) -> bool {
        match incoming {
            Some(Leaf::DateTime(instant)) => {
                if let Some(FieldValue::DateTime(stored)) = record.get(column) {
                    if self.zone.same_instant(stored, instant) {
                        return false;
                    }
                }
                record.set(column, Some(FieldValue::DateTime(self.zone.to_stored(instant))))
            }
            Some(leaf) => record.set(column, Some(scalar_value(leaf))),
            None => record.set(column, None),
        }
    }
}

fn scalar_value(leaf: &Leaf) -> FieldValue {
    match leaf {
        Leaf::Text(s) => FieldValue::Text(s.clone()),
        Leaf::Integer(i) => FieldValue::Integer(*i),
        Leaf::Decimal(d) => FieldValue::Decimal(normalize_decimal(d)),
        Leaf::Bool(b) => FieldValue::Bool(*b),
        Leaf::Date(d) => FieldValue::Date(*d),
        Leaf::DateTime(dt) => FieldValue::DateTime(dt.naive_utc()),
        Leaf::Coded(c) => FieldValue::Text(c.code.clone()),
    }
}

/// Write a coded triple as one unit. Returns whether any column changed.
fn write_coded(record: &mut Record, base: &str, incoming: Option<&Leaf>) -> bool {
    let text = |s: &Option<String>| s.clone().map(FieldValue::Text);
    let triple: [Option<FieldValue>; 3] = match incoming {
        Some(Leaf::Coded(coded)) => [
            Some(FieldValue::Text(coded.code.clone())),
            text(&coded.coding_standard),
            text(&coded.description),
        ],
        Some(leaf) => match leaf.as_key_component() {
            Some(code) => [Some(FieldValue::Text(code)), None, None],
            None => [None, None, None],
        },
        None => [None, None, None],
    };

    let columns = CodedValue::columns(base);
    let current: [Option<FieldValue>; 3] = [
        record.get(&columns[0]).cloned(),
        record.get(&columns[1]).cloned(),
        record.get(&columns[2]).cloned(),
    ];
    if current == triple {
        return false;
    }
    for (column, value) in columns.iter().zip(triple) {
        record.set(column, value);
    }
    true
}
