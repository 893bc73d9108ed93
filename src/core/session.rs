//! Edit session: a mutable snapshot plus the ids changed in it
//!
//! Saving submits only the dirty records of each collection, in the order
//! requirement bindings, stage records, logical stages. A failing collection
//! does not stop the others and keeps its dirty markers for a retry.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::core::binding::{self, BindOutcome, BindRequest, Resolution};
use crate::core::context::{ResolutionContext, Snapshot};
use crate::core::error::EngineError;
use crate::core::ordering::{self, Direction, InsertRequest, Inserted, OrderChange};
use crate::core::scope::Scope;
use crate::entities::{LogicalStage, RequirementBinding, StageRecord};
use crate::store::{Record, RecordKind, RecordStore, StoreError};

/// Record ids changed in a session, per collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    pub stages: BTreeSet<String>,
    pub bindings: BTreeSet<String>,
    pub logical_stages: BTreeSet<String>,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty() && self.bindings.is_empty() && self.logical_stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len() + self.bindings.len() + self.logical_stages.len()
    }

    fn ids_mut(&mut self, kind: RecordKind) -> Option<&mut BTreeSet<String>> {
        match kind {
            RecordKind::Stages => Some(&mut self.stages),
            RecordKind::Bindings => Some(&mut self.bindings),
            RecordKind::LogicalStages => Some(&mut self.logical_stages),
            _ => None,
        }
    }
}

/// Outcome of saving one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSave {
    pub kind: String,
    pub submitted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    record_kind: Option<RecordKind>,
}

impl CollectionSave {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-collection log of a save
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub collections: Vec<CollectionSave>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.collections.iter().all(CollectionSave::is_ok)
    }

    pub fn failed_kinds(&self) -> Vec<RecordKind> {
        self.collections
            .iter()
            .filter(|c| !c.is_ok())
            .filter_map(|c| c.record_kind)
            .collect()
    }

    pub fn submitted(&self) -> usize {
        self.collections.iter().map(|c| c.submitted).sum()
    }

    /// Turn a report with failures into a partial-save error
    pub fn into_result(self) -> Result<SaveReport, EngineError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(EngineError::PartialSave {
                failed: self.failed_kinds(),
            })
        }
    }
}

/// A mutable snapshot with dirty tracking
#[derive(Debug, Clone)]
pub struct EditSession {
    snapshot: Snapshot,
    dirty: DirtySet,
}

impl EditSession {
    /// Start a session; records renumbered on load are already dirty
    pub fn new(snapshot: Snapshot) -> Self {
        let dirty = DirtySet {
            stages: snapshot.renumbered_stage_ids().iter().cloned().collect(),
            ..Default::default()
        };
        Self { snapshot, dirty }
    }

    pub fn load<S: RecordStore>(store: &S) -> Result<Self, StoreError> {
        Ok(Self::new(Snapshot::load(store)?))
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn context(&self, scope: Scope) -> ResolutionContext<'_> {
        ResolutionContext::new(&self.snapshot, scope)
    }

    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    fn mark(&mut self, kind: RecordKind, ids: impl IntoIterator<Item = String>) {
        if let Some(set) = self.dirty.ids_mut(kind) {
            set.extend(ids);
        }
    }

    fn mark_order(&mut self, change: &OrderChange) {
        self.mark(RecordKind::Stages, change.changed.iter().cloned());
    }

    pub fn insert_stage(&mut self, request: &InsertRequest) -> Result<Inserted, EngineError> {
        let inserted = ordering::insert(&mut self.snapshot, request)?;
        self.mark_order(&inserted.change);
        Ok(inserted)
    }

    pub fn delete_stage(&mut self, stage_id: &str) -> Result<OrderChange, EngineError> {
        let change = ordering::soft_delete(&mut self.snapshot, stage_id)?;
        self.mark_order(&change);
        Ok(change)
    }

    pub fn swap(&mut self, scope: &Scope, index: i64, direction: Direction) -> Result<OrderChange, EngineError> {
        let change = ordering::swap(&mut self.snapshot, scope, index, direction)?;
        self.mark_order(&change);
        Ok(change)
    }

    pub fn drag_move(&mut self, scope: &Scope, from: i64, drop: i64) -> Result<OrderChange, EngineError> {
        let change = ordering::drag_move(&mut self.snapshot, scope, from, drop)?;
        self.mark_order(&change);
        Ok(change)
    }

    pub fn bind(&mut self, request: &BindRequest) -> Result<BindOutcome, EngineError> {
        let (outcome, changed) = binding::bind(&mut self.snapshot, request)?;
        self.mark(RecordKind::Bindings, changed);
        Ok(outcome)
    }

    pub fn resolve_conflict(
        &mut self,
        request: &BindRequest,
        resolution: Resolution,
    ) -> Result<BindOutcome, EngineError> {
        let (outcome, changed) = binding::bind_resolved(&mut self.snapshot, request, resolution)?;
        self.mark(RecordKind::Bindings, changed);
        Ok(outcome)
    }

    /// Returns the number of bindings detached
    pub fn unbind(&mut self, credential: &str, division: &str, stage: &str) -> Result<usize, EngineError> {
        let changed = binding::unbind(&mut self.snapshot, credential, division, stage)?;
        let count = changed.len();
        self.mark(RecordKind::Bindings, changed);
        Ok(count)
    }

    /// Set a logical stage's auto-advance flag; returns whether it changed
    pub fn set_auto_advance(&mut self, logical_stage_id: &str, enabled: bool) -> Result<bool, EngineError> {
        let logical = self
            .snapshot
            .logical_stage_mut(logical_stage_id)
            .ok_or_else(|| EngineError::not_found("logical stage", logical_stage_id))?;
        if logical.auto_advance == enabled {
            return Ok(false);
        }
        logical.auto_advance = enabled;
        tracing::info!(logical_stage = %logical_stage_id, enabled, "auto-advance toggled");
        self.mark(RecordKind::LogicalStages, [logical_stage_id.to_string()]);
        Ok(true)
    }

    /// Persist dirty records collection by collection
    pub fn save<S: RecordStore>(&mut self, store: &mut S) -> SaveReport {
        let mut report = SaveReport::default();

        let bindings = dirty_records(self.snapshot.bindings(), &self.dirty.bindings);
        self.save_collection::<S, RequirementBinding>(store, bindings, &mut report);

        let stages = dirty_records(self.snapshot.stages(), &self.dirty.stages);
        self.save_collection::<S, StageRecord>(store, stages, &mut report);

        let logical = dirty_records(self.snapshot.logical_stages(), &self.dirty.logical_stages);
        self.save_collection::<S, LogicalStage>(store, logical, &mut report);

        if report.is_complete() {
            tracing::info!(records = report.submitted(), "session saved");
        } else {
            tracing::warn!(failed = ?report.failed_kinds(), "session saved partially");
        }
        report
    }

    fn save_collection<S: RecordStore, R: Record>(
        &mut self,
        store: &mut S,
        records: Vec<R>,
        report: &mut SaveReport,
    ) {
        if records.is_empty() {
            return;
        }
        let submitted = records.len();
        let error = match store.save_all(&records) {
            Ok(_) => {
                if let Some(set) = self.dirty.ids_mut(R::KIND) {
                    set.clear();
                }
                None
            }
            Err(e) => {
                tracing::warn!(kind = %R::KIND, error = %e, "failed to save collection");
                Some(e.to_string())
            }
        };
        report.collections.push(CollectionSave {
            kind: R::KIND.to_string(),
            submitted,
            error,
            record_kind: Some(R::KIND),
        });
    }
}

fn dirty_records<R: Record>(records: &[R], ids: &BTreeSet<String>) -> Vec<R> {
    records
        .iter()
        .filter(|r| ids.contains(r.id()))
        .cloned()
        .collect()
}
