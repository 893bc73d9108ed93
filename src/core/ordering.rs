//! Order mutator
//!
//! Insert, swap, drag-move and soft-delete for the stage records of one
//! division. Every operation runs through [`apply`], which compacts the
//! division's active records back to 1..N afterwards, so no mutation can
//! leave a gap or a duplicate behind.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::core::context::{ResolutionContext, Snapshot};
use crate::core::error::EngineError;
use crate::core::scope::Scope;
use crate::core::workflow::{order_stages, resolve_workflow};
use crate::entities::StageRecord;

/// Direction of a one-step swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn offset(self) -> i64 {
        match self {
            Direction::Up => -1,
            Direction::Down => 1,
        }
    }
}

/// Ids of stage records a mutation changed, in first-touched order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderChange {
    pub changed: Vec<String>,
}

impl OrderChange {
    fn touch(&mut self, id: &str) {
        if !self.changed.iter().any(|c| c == id) {
            self.changed.push(id.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// A new or restored stage at a 1-based position of a division
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertRequest {
    pub division: String,
    pub name: String,
    pub position: Option<u32>,
    pub logical_stage_id: Option<String>,
}

impl InsertRequest {
    pub fn new(
        division: impl Into<String>,
        name: impl Into<String>,
        position: u32,
        logical_stage_id: impl Into<String>,
    ) -> Self {
        Self {
            division: division.into(),
            name: name.into(),
            position: Some(position),
            logical_stage_id: Some(logical_stage_id.into()),
        }
    }
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inserted {
    pub stage_id: String,
    pub restored: bool,
    #[serde(flatten)]
    pub change: OrderChange,
}

/// Renumber a division's active records to 1..N by current order
///
/// Ties keep stored position. Returns the ids whose order changed.
pub fn compact_division(stages: &mut [StageRecord], division: &str) -> Vec<String> {
    let mut indices: Vec<usize> = (0..stages.len())
        .filter(|&i| stages[i].is_active() && stages[i].division == division)
        .collect();
    indices.sort_by_key(|&i| stages[i].order_index());

    let mut changed = Vec::new();
    for (pos, &i) in indices.iter().enumerate() {
        let order = pos as u32 + 1;
        if stages[i].order.trim() != order.to_string() {
            stages[i].set_order(order);
            changed.push(stages[i].id.clone());
        }
    }
    changed
}

/// Run a mutation on one division, then compact it
fn apply<F, T>(snapshot: &mut Snapshot, division: &str, mutate: F) -> Result<(T, OrderChange), EngineError>
where
    F: FnOnce(&mut Vec<StageRecord>, &mut OrderChange) -> Result<T, EngineError>,
{
    let mut change = OrderChange::default();
    let value = mutate(snapshot.stages_mut(), &mut change)?;
    for id in compact_division(snapshot.stages_mut(), division) {
        change.touch(&id);
    }
    Ok((value, change))
}

/// The division a reorder applies to, rejecting the unbounded scope
fn reorder_division(scope: &Scope) -> Result<&str, EngineError> {
    scope.division.as_division().ok_or(EngineError::ScopeRequired)
}

/// Stage ids of the visible workflow, in workflow order
fn visible_ids(snapshot: &Snapshot, scope: &Scope) -> Vec<String> {
    let ctx = ResolutionContext::new(snapshot, scope.clone());
    resolve_workflow(&ctx)
        .iter()
        .map(|s| s.stage_id().to_string())
        .collect()
}

fn check_index(index: i64, len: usize) -> Result<usize, EngineError> {
    if index < 0 || index as usize >= len {
        return Err(EngineError::OutOfRange { index, len });
    }
    Ok(index as usize)
}

fn position_of(stages: &[StageRecord], id: &str) -> Result<usize, EngineError> {
    stages
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| EngineError::not_found("stage", id))
}

/// Exchange the order of the workflow entry at `index` with its neighbour
pub fn swap(
    snapshot: &mut Snapshot,
    scope: &Scope,
    index: i64,
    direction: Direction,
) -> Result<OrderChange, EngineError> {
    let division = reorder_division(scope)?.to_string();
    let ids = visible_ids(snapshot, scope);
    let from = check_index(index, ids.len())?;
    let to = check_index(index + direction.offset(), ids.len())?;

    let (_, change) = apply(snapshot, &division, |stages, change| {
        let a = position_of(stages, &ids[from])?;
        let b = position_of(stages, &ids[to])?;
        let order_a = stages[a].order.clone();
        let order_b = std::mem::replace(&mut stages[b].order, order_a);
        stages[a].order = order_b;
        change.touch(&ids[from]);
        change.touch(&ids[to]);
        Ok(())
    })?;
    tracing::info!(%division, from, to, "swapped stages");
    Ok(change)
}

/// Move the workflow entry at `from` to the drop slot `drop`
///
/// `drop` addresses the gaps of the current list (0 = before the first
/// entry, len = after the last). The visible entries then take their
/// existing order slots in the new sequence.
pub fn drag_move(
    snapshot: &mut Snapshot,
    scope: &Scope,
    from: i64,
    drop: i64,
) -> Result<OrderChange, EngineError> {
    let division = reorder_division(scope)?.to_string();
    let mut ids = visible_ids(snapshot, scope);
    let from = check_index(from, ids.len())?;
    if drop < 0 || drop as usize > ids.len() {
        return Err(EngineError::OutOfRange {
            index: drop,
            len: ids.len(),
        });
    }
    let drop = drop as usize;
    let target = if from < drop { drop - 1 } else { drop };
    if target == from {
        return Ok(OrderChange::default());
    }

    let (_, change) = apply(snapshot, &division, |stages, change| {
        let slots: BTreeSet<u32> = ids
            .iter()
            .map(|id| position_of(stages, id).map(|i| stages[i].order_index()))
            .collect::<Result<_, _>>()?;
        let mut slots: Vec<u32> = slots.into_iter().collect();
        // duplicate orders among visible entries collapse in the set; top up
        // past the highest slot so every entry still gets one
        while slots.len() < ids.len() {
            let next = slots.last().map_or(1, |s| s + 1);
            slots.push(next);
        }

        let moved = ids.remove(from);
        ids.insert(target, moved);
        for (id, slot) in ids.iter().zip(slots) {
            let i = position_of(stages, id)?;
            if stages[i].order.trim() != slot.to_string() {
                stages[i].set_order(slot);
                change.touch(id);
            }
        }
        Ok(())
    })?;
    tracing::info!(%division, from, target, "moved stage");
    Ok(change)
}

/// Insert a new stage, or restore a soft-deleted one of the same name
///
/// Active records at or after the position shift up by one first.
pub fn insert(snapshot: &mut Snapshot, request: &InsertRequest) -> Result<Inserted, EngineError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("stage name is required"));
    }
    if request.division.trim().is_empty() {
        return Err(EngineError::validation("a division is required"));
    }
    let position = request
        .position
        .ok_or_else(|| EngineError::validation("no target position given"))?;
    let logical_stage_id = request
        .logical_stage_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| EngineError::validation("no logical stage selected"))?
        .to_string();
    if snapshot.logical_stage(&logical_stage_id).is_none() {
        return Err(EngineError::not_found("logical stage", logical_stage_id));
    }

    let division = request.division.as_str();
    let in_division = || {
        snapshot
            .stages()
            .iter()
            .filter(move |s| s.division == division && s.name_matches(name))
    };
    if in_division().any(StageRecord::is_active) {
        return Err(EngineError::validation(format!(
            "stage '{}' already exists in division {}",
            name, division
        )));
    }
    let restore_id = in_division()
        .find(|s| !s.is_active())
        .map(|s| s.id.clone());

    let active = snapshot
        .stages()
        .iter()
        .filter(|s| s.is_active() && s.division == division)
        .count();
    if position == 0 || position as usize > active + 1 {
        return Err(EngineError::OutOfRange {
            index: i64::from(position),
            len: active,
        });
    }

    let restored = restore_id.is_some();
    let (stage_id, change) = apply(snapshot, division, |stages, change| {
        for stage in stages.iter_mut() {
            let is_target = restore_id.as_deref() == Some(stage.id.as_str());
            if stage.is_active() && stage.division == division && !is_target && stage.order_index() >= position {
                stage.set_order(stage.order_index() + 1);
                change.touch(&stage.id);
            }
        }

        let stage_id = match restore_id.as_deref() {
            Some(id) => {
                let i = position_of(stages, id)?;
                stages[i].restore(logical_stage_id.clone());
                stages[i].set_order(position);
                id.to_string()
            }
            None => {
                let mut record = StageRecord::new(name, division, position, logical_stage_id.clone());
                record.id = ulid::Ulid::new().to_string();
                let id = record.id.clone();
                stages.push(record);
                id
            }
        };
        change.touch(&stage_id);
        Ok(stage_id)
    })?;

    tracing::info!(
        stage = %name,
        %division,
        position,
        restored,
        shifted = change.changed.len().saturating_sub(1),
        "inserted stage"
    );
    Ok(Inserted {
        stage_id,
        restored,
        change,
    })
}

/// Soft-delete a stage record and close the gap it leaves
///
/// The deleted record keeps its order for a later restore; its requirement
/// bindings are left alone.
pub fn soft_delete(snapshot: &mut Snapshot, stage_id: &str) -> Result<OrderChange, EngineError> {
    let stage = snapshot
        .stage(stage_id)
        .ok_or_else(|| EngineError::not_found("stage", stage_id))?;
    if !stage.is_active() {
        return Err(EngineError::validation(format!(
            "stage '{}' is already deleted",
            stage.name
        )));
    }
    let division = stage.division.clone();
    let former = stage.order_index();

    let (_, change) = apply(snapshot, &division, |stages, change| {
        let target = position_of(stages, stage_id)?;
        stages[target].mark_deleted();
        change.touch(stage_id);
        for stage in stages.iter_mut() {
            if stage.is_active() && stage.division == division && stage.order_index() > former {
                stage.set_order(stage.order_index() - 1);
                change.touch(&stage.id);
            }
        }
        Ok(())
    })?;
    tracing::info!(stage = %stage_id, %division, "soft-deleted stage");
    Ok(change)
}

/// Resolve a stage record id from a name within a division
pub fn find_stage_id(snapshot: &Snapshot, division: &str, name: &str) -> Result<String, EngineError> {
    snapshot
        .stages()
        .iter()
        .find(|s| s.is_active() && s.division == division && s.name_matches(name))
        .map(|s| s.id.clone())
        .ok_or_else(|| EngineError::not_found("stage", format!("{} in division {}", name, division)))
}

/// Active orders of a division's records, sorted
pub fn division_orders(snapshot: &Snapshot, division: &str) -> Vec<u32> {
    order_stages(
        snapshot
            .stages()
            .iter()
            .filter(|s| s.is_active() && s.division == division),
    )
    .iter()
    .map(|s| s.order_index())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::entities::LogicalStage;

    fn abc() -> Snapshot {
        let logical = vec![
            LogicalStage::new("LA", "A"),
            LogicalStage::new("LB", "B"),
            LogicalStage::new("LC", "C"),
            LogicalStage::new("LX", "X"),
        ];
        let stages = ["A", "B", "C"]
            .iter()
            .enumerate()
            .map(|(i, n)| {
                let mut s = StageRecord::new(*n, "D", i as u32 + 1, format!("L{}", n));
                s.id = n.to_lowercase();
                s
            })
            .collect();
        Snapshot::new(stages, logical)
    }

    fn visible(snapshot: &Snapshot) -> Vec<(String, u32)> {
        let ctx = ResolutionContext::new(snapshot, Scope::division("D"));
        resolve_workflow(&ctx)
            .iter()
            .map(|s| (s.name.to_string(), s.order))
            .collect()
    }

    fn pairs(items: &[(&str, u32)]) -> Vec<(String, u32)> {
        items.iter().map(|(n, o)| (n.to_string(), *o)).collect()
    }

    #[test]
    fn test_insert_mid_sequence() {
        let mut snapshot = abc();
        let inserted = insert(&mut snapshot, &InsertRequest::new("D", "X", 2, "LX")).unwrap();
        assert!(!inserted.restored);
        assert_eq!(visible(&snapshot), pairs(&[("A", 1), ("X", 2), ("B", 3), ("C", 4)]));
        assert!(inserted.change.changed.contains(&"b".to_string()));
        assert!(inserted.change.changed.contains(&inserted.stage_id));
        assert!(!inserted.change.changed.contains(&"a".to_string()));
    }

    #[test]
    fn test_soft_delete_then_compact() {
        let mut snapshot = abc();
        let change = soft_delete(&mut snapshot, "b").unwrap();
        assert_eq!(change.changed, vec!["b", "c"]);
        assert_eq!(visible(&snapshot), pairs(&[("A", 1), ("C", 2)]));
        let b = snapshot.stage("b").unwrap();
        assert!(!b.is_active());
        assert_eq!(b.order_index(), 2);
    }

    #[test]
    fn test_insert_restores_deleted_record() {
        let mut snapshot = abc();
        soft_delete(&mut snapshot, "b").unwrap();
        let inserted = insert(&mut snapshot, &InsertRequest::new("D", "b", 1, "LX")).unwrap();
        assert!(inserted.restored);
        assert_eq!(inserted.stage_id, "b");
        assert_eq!(visible(&snapshot), pairs(&[("B", 1), ("A", 2), ("C", 3)]));
        assert_eq!(
            snapshot.stage("b").unwrap().logical_stage_id.as_deref(),
            Some("LX")
        );
        assert_eq!(snapshot.stages().len(), 3);
    }

    #[test]
    fn test_insert_validation() {
        let mut snapshot = abc();
        let mut request = InsertRequest::new("D", "X", 2, "LX");
        request.position = None;
        assert!(matches!(insert(&mut snapshot, &request), Err(EngineError::Validation { .. })));

        let mut request = InsertRequest::new("D", "X", 2, "LX");
        request.logical_stage_id = None;
        assert!(matches!(insert(&mut snapshot, &request), Err(EngineError::Validation { .. })));

        let request = InsertRequest::new("D", "X", 2, "L404");
        assert!(matches!(insert(&mut snapshot, &request), Err(EngineError::NotFound { .. })));

        let request = InsertRequest::new("D", "X", 5, "LX");
        assert!(matches!(insert(&mut snapshot, &request), Err(EngineError::OutOfRange { .. })));

        let request = InsertRequest::new("D", "a", 1, "LX");
        assert!(matches!(insert(&mut snapshot, &request), Err(EngineError::Validation { .. })));

        assert_eq!(visible(&snapshot), pairs(&[("A", 1), ("B", 2), ("C", 3)]));
    }

    #[test]
    fn test_insert_at_end() {
        let mut snapshot = abc();
        insert(&mut snapshot, &InsertRequest::new("D", "X", 4, "LX")).unwrap();
        assert_eq!(division_orders(&snapshot, "D"), vec![1, 2, 3, 4]);
        assert_eq!(visible(&snapshot)[3].0, "X");
    }

    #[test]
    fn test_swap_exchanges_neighbours() {
        let mut snapshot = abc();
        let change = swap(&mut snapshot, &Scope::division("D"), 0, Direction::Down).unwrap();
        assert_eq!(change.changed, vec!["a", "b"]);
        assert_eq!(visible(&snapshot), pairs(&[("B", 1), ("A", 2), ("C", 3)]));
    }

    #[test]
    fn test_swap_rejects_out_of_range_and_all_scope() {
        let mut snapshot = abc();
        assert!(matches!(
            swap(&mut snapshot, &Scope::division("D"), 0, Direction::Up),
            Err(EngineError::OutOfRange { index: -1, len: 3 })
        ));
        assert!(matches!(
            swap(&mut snapshot, &Scope::division("D"), 2, Direction::Down),
            Err(EngineError::OutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            swap(&mut snapshot, &Scope::all(), 0, Direction::Down),
            Err(EngineError::ScopeRequired)
        ));
        assert_eq!(visible(&snapshot), pairs(&[("A", 1), ("B", 2), ("C", 3)]));
    }

    #[test]
    fn test_drag_forward_adjusts_for_removal() {
        let mut snapshot = abc();
        // drop A into the gap after B
        drag_move(&mut snapshot, &Scope::division("D"), 0, 2).unwrap();
        assert_eq!(visible(&snapshot), pairs(&[("B", 1), ("A", 2), ("C", 3)]));
    }

    #[test]
    fn test_drag_backward_and_to_end() {
        let mut snapshot = abc();
        drag_move(&mut snapshot, &Scope::division("D"), 2, 0).unwrap();
        assert_eq!(visible(&snapshot), pairs(&[("C", 1), ("A", 2), ("B", 3)]));
        drag_move(&mut snapshot, &Scope::division("D"), 0, 3).unwrap();
        assert_eq!(visible(&snapshot), pairs(&[("A", 1), ("B", 2), ("C", 3)]));
    }

    #[test]
    fn test_drag_to_own_slot_is_a_no_op() {
        let mut snapshot = abc();
        assert!(drag_move(&mut snapshot, &Scope::division("D"), 1, 2).unwrap().is_empty());
        assert!(drag_move(&mut snapshot, &Scope::division("D"), 1, 4).is_err());
    }

    #[test]
    fn test_reorder_keeps_hidden_records_in_place() {
        let mut snapshot = fixtures::snapshot();
        let scope = Scope::division("D1");
        drag_move(&mut snapshot, &scope, 3, 0).unwrap();
        assert_eq!(snapshot.stage("d1-field").unwrap().order_index(), 1);
        assert_eq!(snapshot.stage("d1-accident").unwrap().order_index(), 5);
        assert_eq!(division_orders(&snapshot, "D1"), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_soft_delete_errors() {
        let mut snapshot = abc();
        assert!(matches!(soft_delete(&mut snapshot, "zz"), Err(EngineError::NotFound { .. })));
        soft_delete(&mut snapshot, "a").unwrap();
        assert!(matches!(soft_delete(&mut snapshot, "a"), Err(EngineError::Validation { .. })));
    }
}
