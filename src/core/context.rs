//! Record snapshot and resolution context
//!
//! A [`Snapshot`] cannot exist without its stage records and logical stages,
//! so every resolver taking a [`ResolutionContext`] can rely on both being
//! loaded. Order anomalies found on construction are renumbered per division
//! and logged before any resolution runs.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::scope::{is_stage_visible, Scope};
use crate::entities::{
    Credential, LogicalStage, RequirementBinding, StageHistoryEntry, StageRecord, Subject,
};
use crate::store::{RecordStore, StoreError};

/// In-memory copy of every record collection the engine reads
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    stages: Vec<StageRecord>,
    logical_stages: Vec<LogicalStage>,
    logical_index: HashMap<String, usize>,
    bindings: Vec<RequirementBinding>,
    subjects: Vec<Subject>,
    credentials: Vec<Credential>,
    history: Vec<StageHistoryEntry>,
    renumbered: Vec<String>,
}

impl Snapshot {
    /// Build a snapshot from the two collections every resolver needs
    pub fn new(stages: Vec<StageRecord>, logical_stages: Vec<LogicalStage>) -> Self {
        let mut snapshot = Self {
            stages,
            logical_stages,
            ..Default::default()
        };
        snapshot.reindex_logical_stages();
        snapshot.renumbered = normalize_orders(&mut snapshot.stages);
        snapshot
    }

    pub fn with_bindings(mut self, bindings: Vec<RequirementBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_subjects(mut self, subjects: Vec<Subject>) -> Self {
        self.subjects = subjects;
        self
    }

    pub fn with_credentials(mut self, credentials: Vec<Credential>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_history(mut self, history: Vec<StageHistoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// Load every collection from a record store
    pub fn load<S: RecordStore>(store: &S) -> Result<Self, StoreError> {
        let logical_stages = store.get_all::<LogicalStage>()?;
        let stages = store.get_all::<StageRecord>()?;
        let snapshot = Self::new(stages, logical_stages)
            .with_bindings(store.get_all()?)
            .with_subjects(store.get_all()?)
            .with_credentials(store.get_all()?)
            .with_history(store.get_all()?);
        tracing::debug!(
            stages = snapshot.stages.len(),
            logical_stages = snapshot.logical_stages.len(),
            bindings = snapshot.bindings.len(),
            subjects = snapshot.subjects.len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    fn reindex_logical_stages(&mut self) {
        self.logical_index = self
            .logical_stages
            .iter()
            .enumerate()
            .map(|(i, l)| (l.id.clone(), i))
            .collect();
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn logical_stages(&self) -> &[LogicalStage] {
        &self.logical_stages
    }

    pub fn bindings(&self) -> &[RequirementBinding] {
        &self.bindings
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn history(&self) -> &[StageHistoryEntry] {
        &self.history
    }

    /// Ids of stage records whose order was renumbered on construction
    pub fn renumbered_stage_ids(&self) -> &[String] {
        &self.renumbered
    }

    pub fn logical_stage(&self, id: &str) -> Option<&LogicalStage> {
        self.logical_index
            .get(id)
            .and_then(|&i| self.logical_stages.get(i))
    }

    pub fn stage(&self, id: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn binding(&self, id: &str) -> Option<&RequirementBinding> {
        self.bindings.iter().find(|b| b.id == id)
    }

    pub(crate) fn stages_mut(&mut self) -> &mut Vec<StageRecord> {
        &mut self.stages
    }

    pub(crate) fn bindings_mut(&mut self) -> &mut Vec<RequirementBinding> {
        &mut self.bindings
    }

    pub(crate) fn logical_stage_mut(&mut self, id: &str) -> Option<&mut LogicalStage> {
        let index = *self.logical_index.get(id)?;
        self.logical_stages.get_mut(index)
    }

    pub(crate) fn subjects_mut(&mut self) -> &mut Vec<Subject> {
        &mut self.subjects
    }

    pub(crate) fn history_mut(&mut self) -> &mut Vec<StageHistoryEntry> {
        &mut self.history
    }

    /// Credentials held by a subject: the embedded list plus the collection
    ///
    /// A credential present in both places (same non-empty id) is returned once.
    pub fn held_credentials<'a>(&'a self, subject: &'a Subject) -> Vec<&'a Credential> {
        let mut seen = HashSet::new();
        subject
            .credentials
            .iter()
            .chain(self.credentials.iter().filter(|c| c.subject_id == subject.id))
            .filter(|c| c.id.is_empty() || seen.insert(c.id.as_str()))
            .collect()
    }

    /// The stage record a subject currently sits at
    ///
    /// Looks up the stored stage id first, then falls back to an active
    /// record in the subject's division whose name matches case-insensitively.
    pub fn current_stage_record(&self, subject: &Subject) -> Option<&StageRecord> {
        if let Some(stage) = subject.stage_id.as_deref().and_then(|id| self.stage(id)) {
            return Some(stage);
        }
        if subject.stage_name.trim().is_empty() {
            return None;
        }
        self.stages.iter().find(|s| {
            s.is_active() && s.division == subject.division && s.name_matches(&subject.stage_name)
        })
    }
}

/// Renumber the active records of every division whose orders are not 1..N
///
/// Returns the ids of records whose order changed.
fn normalize_orders(stages: &mut [StageRecord]) -> Vec<String> {
    let mut by_division: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, stage) in stages.iter().enumerate() {
        if stage.is_active() {
            by_division.entry(stage.division.clone()).or_default().push(i);
        }
    }

    let mut changed = Vec::new();
    for (division, mut indices) in by_division {
        indices.sort_by_key(|&i| stages[i].order_index());
        let dense = indices
            .iter()
            .enumerate()
            .all(|(pos, &i)| stages[i].order.trim() == (pos + 1).to_string());
        if dense {
            continue;
        }
        tracing::warn!(
            division = %division,
            stages = indices.len(),
            "stage order is not a dense 1..N sequence, renumbering"
        );
        for (pos, &i) in indices.iter().enumerate() {
            let order = pos as u32 + 1;
            if stages[i].order.trim() != order.to_string() {
                stages[i].set_order(order);
                changed.push(stages[i].id.clone());
            }
        }
    }
    changed
}

/// Everything a resolver call needs: the records, the scope and "now"
#[derive(Debug, Clone)]
pub struct ResolutionContext<'a> {
    snapshot: &'a Snapshot,
    scope: Scope,
    as_of: DateTime<Utc>,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(snapshot: &'a Snapshot, scope: Scope) -> Self {
        Self {
            snapshot,
            scope,
            as_of: Utc::now(),
        }
    }

    /// Evaluate expiry against a fixed instant instead of the current time
    pub fn as_of(mut self, at: DateTime<Utc>) -> Self {
        self.as_of = at;
        self
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.as_of
    }

    /// The same context restricted to one division
    pub fn narrowed_to(&self, division: &str) -> ResolutionContext<'a> {
        ResolutionContext {
            snapshot: self.snapshot,
            scope: self.scope.narrowed_to(division),
            as_of: self.as_of,
        }
    }

    /// Visibility of a stage record in this context's scope
    pub fn is_visible(&self, record: &StageRecord) -> bool {
        is_stage_visible(record, |id| self.snapshot.logical_stage(id), &self.scope)
    }

    /// Visible stage records in stored order
    pub fn visible_stages(&self) -> impl Iterator<Item = &'a StageRecord> + '_ {
        self.snapshot
            .stages()
            .iter()
            .filter(move |s| self.is_visible(s))
    }

    /// Subjects belonging to the scope's division (every subject under ALL)
    pub fn subjects_in_scope(&self) -> impl Iterator<Item = &'a Subject> + '_ {
        self.snapshot
            .subjects()
            .iter()
            .filter(move |s| self.scope.division.matches(&s.division))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;

    #[test]
    fn test_new_renumbers_gapped_division() {
        let mut a = StageRecord::new("A", "D1", 1, "L1");
        a.id = "a".into();
        let mut b = StageRecord::new("B", "D1", 5, "L2");
        b.id = "b".into();
        let mut c = StageRecord::new("C", "D1", 5, "L3");
        c.id = "c".into();
        let mut other = StageRecord::new("X", "D2", 1, "L1");
        other.id = "x".into();

        let snapshot = Snapshot::new(vec![a, b, c, other], fixtures::logical_stages());
        let orders: Vec<_> = snapshot
            .stages()
            .iter()
            .map(|s| (s.id.as_str(), s.order.as_str()))
            .collect();
        assert_eq!(orders, vec![("a", "1"), ("b", "2"), ("c", "3"), ("x", "1")]);
        assert_eq!(snapshot.renumbered_stage_ids(), ["b", "c"]);
    }

    #[test]
    fn test_dense_division_is_left_alone() {
        let snapshot = fixtures::snapshot();
        assert!(snapshot.renumbered_stage_ids().is_empty());
    }

    #[test]
    fn test_held_credentials_merges_embedded_and_collection() {
        let snapshot = fixtures::snapshot();
        let subject = snapshot.subject("s-ann").unwrap();
        let held = snapshot.held_credentials(subject);
        assert_eq!(held.len(), 2);
    }

    #[test]
    fn test_current_stage_falls_back_to_name() {
        let snapshot = fixtures::snapshot();
        let mut subject = Subject::new("tmp", "D1", "training");
        assert_eq!(
            snapshot.current_stage_record(&subject).map(|s| s.id.as_str()),
            Some("d1-training")
        );
        subject.stage_id = Some("d1-field".into());
        assert_eq!(
            snapshot.current_stage_record(&subject).map(|s| s.id.as_str()),
            Some("d1-field")
        );
    }
}
