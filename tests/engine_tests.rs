//! Engine property tests over seeded operation sequences

use std::collections::{HashMap, HashSet};

use chrono::{TimeZone, Utc};
use olt::core::advance::{candidates, decide};
use olt::core::binding::{bind, bind_resolved, normalize_credential_name, BindOutcome, BindRequest, Resolution};
use olt::core::compliance::{aggregate_compliance, evaluate_subject};
use olt::core::ordering::{self, division_orders, Direction, InsertRequest};
use olt::core::requirements::{resolve_derived, resolve_for_stage};
use olt::core::{AdvanceDecision, EditSession, EngineError, ResolutionContext, Scope, Snapshot};
use olt::entities::{Credential, LogicalStage, RequirementBinding, StageRecord, Subject};
use olt::store::{MemoryStore, RecordKind, RecordStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NAMES: [&str; 6] = ["APPLIED", "SCREENING", "TRAINING", "PROBATION", "FIELD", "SENIOR"];

fn logical_stages() -> Vec<LogicalStage> {
    NAMES
        .iter()
        .map(|name| LogicalStage::new(format!("L-{}", name), *name))
        .collect()
}

fn stages(division: &str) -> Vec<StageRecord> {
    NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut stage = StageRecord::new(*name, division, i as u32 + 1, format!("L-{}", name));
            stage.id = format!("{}-{}", division.to_lowercase(), name.to_lowercase());
            stage
        })
        .collect()
}

fn binding(id: &str, credential: &str, division: &str, logical: &str) -> RequirementBinding {
    let mut b = RequirementBinding::new(credential, division, logical);
    b.id = id.to_string();
    b
}

fn snapshot() -> Snapshot {
    let mut all = stages("D1");
    all.extend(stages("D2"));
    Snapshot::new(all, logical_stages()).with_bindings(vec![
        binding("b-1", "CPR", "D1", "L-TRAINING"),
        binding("b-2", "DRUG TEST", "D1", "L-TRAINING"),
        binding("b-3", "CDL", "D1", "L-FIELD"),
        binding("b-4", "BACKGROUND", "D1", "L-SCREENING"),
        binding("b-5", "CPR", "D2", "L-FIELD"),
    ])
}

fn assert_dense(snapshot: &Snapshot, division: &str) {
    let orders = division_orders(snapshot, division);
    let expected: Vec<u32> = (1..=orders.len() as u32).collect();
    assert_eq!(orders, expected, "orders of {} are not 1..N", division);
}

#[test]
fn test_random_reorders_keep_orders_dense() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut snapshot = snapshot();
    let scope = Scope::division("D1");
    let mut inserted = 0;

    for _ in 0..300 {
        let len = division_orders(&snapshot, "D1").len() as i64;
        let before = division_orders(&snapshot, "D2");
        let result = match rng.random_range(0..4) {
            0 => {
                let direction = if rng.random_bool(0.5) { Direction::Up } else { Direction::Down };
                ordering::swap(&mut snapshot, &scope, rng.random_range(-1..=len), direction).map(|_| ())
            }
            1 => ordering::drag_move(
                &mut snapshot,
                &scope,
                rng.random_range(0..len.max(1)),
                rng.random_range(0..=len),
            )
            .map(|_| ()),
            2 => {
                inserted += 1;
                let logical = format!("L-{}", NAMES[rng.random_range(0..NAMES.len())]);
                let position = rng.random_range(1..=len as u32 + 1);
                let request = InsertRequest::new("D1", format!("EXTRA {}", inserted), position, logical);
                ordering::insert(&mut snapshot, &request).map(|_| ())
            }
            _ => {
                let active: Vec<String> = snapshot
                    .stages()
                    .iter()
                    .filter(|s| s.is_active() && s.division == "D1")
                    .map(|s| s.id.clone())
                    .collect();
                if active.len() <= 1 {
                    continue;
                }
                let id = &active[rng.random_range(0..active.len())];
                ordering::soft_delete(&mut snapshot, id).map(|_| ())
            }
        };

        match result {
            Ok(()) | Err(EngineError::OutOfRange { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert_dense(&snapshot, "D1");
        assert_eq!(division_orders(&snapshot, "D2"), before, "other division changed");
    }
}

#[test]
fn test_direct_and_derived_resolution_agree() {
    let snapshot = snapshot();
    for division in ["D1", "D2"] {
        let ctx = ResolutionContext::new(&snapshot, Scope::division(division));
        for stage in ctx.visible_stages() {
            let direct: HashSet<&str> = resolve_for_stage(&ctx, stage).binding_ids().into_iter().collect();
            let derived: HashSet<&str> = resolve_derived(&ctx, &stage.name).binding_ids().into_iter().collect();
            assert_eq!(direct, derived, "stage {} in {}", stage.name, division);
        }
    }
}

#[test]
fn test_random_binds_never_duplicate_a_credential() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut snapshot = snapshot();
    let credentials = ["CPR", "cpr ", "Drug  Test", "CDL", "FIRST AID"];

    for _ in 0..200 {
        let division = if rng.random_bool(0.7) { "D1" } else { "D2" };
        let request = BindRequest::new(
            credentials[rng.random_range(0..credentials.len())],
            division,
            NAMES[rng.random_range(0..NAMES.len())],
        );
        let (outcome, _) = bind(&mut snapshot, &request).unwrap();
        if let BindOutcome::Conflict(_) = outcome {
            let resolution = if rng.random_bool(0.5) { Resolution::Move } else { Resolution::Cancel };
            bind_resolved(&mut snapshot, &request, resolution).unwrap();
        }

        let mut owners: HashMap<(String, String), HashSet<String>> = HashMap::new();
        for b in snapshot.bindings().iter().filter(|b| !b.deleted && b.is_bound()) {
            owners
                .entry((b.division.clone(), normalize_credential_name(&b.credential)))
                .or_default()
                .insert(b.logical_stage_id.clone().unwrap_or_default());
        }
        for ((division, credential), logical) in owners {
            assert!(logical.len() <= 1, "{} bound to {:?} in {}", credential, logical, division);
        }
    }
}

fn population() -> Snapshot {
    let mut subjects = Vec::new();
    let mut credentials = Vec::new();
    for (i, stage) in ["TRAINING", "TRAINING", "FIELD", "SCREENING", "APPLIED"].iter().enumerate() {
        let id = format!("s-{}", i);
        let mut subject = Subject::new(&id, "D1", *stage);
        subject.stage_id = Some(format!("d1-{}", stage.to_lowercase()));
        subjects.push(subject);
        if i % 2 == 0 {
            let mut cpr = Credential::new(&id, "b-1");
            cpr.id = format!("c-{}-cpr", i);
            credentials.push(cpr);
        }
        if i == 2 {
            let mut cdl = Credential::new(&id, "b-3")
                .expiring(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
            cdl.id = format!("c-{}-cdl", i);
            credentials.push(cdl);
        }
    }
    snapshot().with_subjects(subjects).with_credentials(credentials)
}

#[test]
fn test_aggregate_matches_per_subject_sums() {
    let snapshot = population();
    let ctx = ResolutionContext::new(&snapshot, Scope::division("D1"));
    let summary = aggregate_compliance(&ctx);

    let (mut required, mut valid) = (0, 0);
    for subject in ctx.subjects_in_scope() {
        let result = evaluate_subject(&ctx, subject);
        required += result.required();
        valid += result.valid();
    }
    assert_eq!(summary.total_required_slots, required);
    assert_eq!(summary.fulfilled_slots, valid);
    assert!(summary.fulfilled_slots <= summary.total_required_slots);
    // TRAINING x2 (CPR, DRUG TEST), FIELD (CDL), SCREENING (BACKGROUND)
    assert_eq!(summary.total_required_slots, 6);
    assert_eq!(summary.fulfilled_slots, 1);
    assert_eq!(summary.percent, 17);
}

#[test]
fn test_auto_stage_without_requirements_is_never_a_candidate() {
    let mut logical = logical_stages();
    for l in logical.iter_mut().filter(|l| l.name == "APPLIED" || l.name == "TRAINING") {
        l.auto_advance = true;
    }
    let base = population();
    let snapshot = Snapshot::new(base.stages().to_vec(), logical)
        .with_bindings(base.bindings().to_vec())
        .with_subjects(base.subjects().to_vec())
        .with_credentials(base.credentials().to_vec());
    let ctx = ResolutionContext::new(&snapshot, Scope::division("D1"));

    let applied = snapshot.subject("s-4").unwrap();
    assert_eq!(decide(&ctx, applied), AdvanceDecision::EligibleNoRequirements);

    let found: Vec<String> = candidates(&ctx).into_iter().map(|c| c.subject_id).collect();
    assert!(!found.contains(&"s-4".to_string()));
    for id in &found {
        let subject = snapshot.subject(id).unwrap();
        assert!(evaluate_subject(&ctx, subject).is_complete());
    }
}

#[test]
fn test_partial_save_reports_failed_collection() {
    let snapshot = snapshot();
    let mut store = MemoryStore::new()
        .with_records(snapshot.stages())
        .with_records(snapshot.logical_stages())
        .with_records(snapshot.bindings());
    store.fail_writes_to(RecordKind::Stages);

    let mut session = EditSession::new(Snapshot::load(&store).unwrap());
    session.swap(&Scope::division("D1"), 0, Direction::Down).unwrap();
    session
        .resolve_conflict(&BindRequest::new("CDL", "D1", "SENIOR"), Resolution::Move)
        .unwrap();

    let report = session.save(&mut store);
    assert_eq!(report.failed_kinds(), vec![RecordKind::Stages]);
    assert!(matches!(
        report.into_result(),
        Err(EngineError::PartialSave { ref failed }) if failed == &vec![RecordKind::Stages]
    ));

    let bindings: Vec<RequirementBinding> = store.get_all().unwrap();
    let cdl = bindings.iter().find(|b| b.id == "b-3").unwrap();
    assert_eq!(cdl.logical_stage_id.as_deref(), Some("L-SENIOR"));

    let stored: Vec<StageRecord> = store.get_all().unwrap();
    let applied = stored.iter().find(|s| s.id == "d1-applied").unwrap();
    assert_eq!(applied.order, "1");
    assert!(!session.dirty().stages.is_empty());
}
