//! Shared records for engine unit tests
//!
//! Division D1: APPLIED(1) TRAINING(2) TRAINING PHASE 2(3, same logical
//! stage as TRAINING) FIELD(4) ACCIDENT(5, non-operator milestone).
//! Division D2: APPLIED(1) TRAINING(2) ONBOARD(3, tenant GLOBEX).

use chrono::{DateTime, TimeZone, Utc};

use crate::core::context::Snapshot;
use crate::entities::{
    Credential, LogicalStage, RequirementBinding, StageHistoryEntry, StageRecord, Subject,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

fn logical(id: &str, name: &str, tenant: &str) -> LogicalStage {
    let mut l = LogicalStage::new(id, name);
    l.tenant_id = Some(tenant.to_string());
    l
}

pub fn logical_stages() -> Vec<LogicalStage> {
    let mut training = logical("L-TRAINING", "TRAINING", "ACME");
    training.auto_advance = true;
    let mut accident = LogicalStage::new("L-ACCIDENT", "ACCIDENT");
    accident.operator = false;
    vec![
        logical("L-APPLIED", "APPLIED", "ACME"),
        training,
        logical("L-FIELD", "FIELD", "ACME"),
        accident,
        logical("L-ONBOARD", "ONBOARD", "GLOBEX"),
    ]
}

fn stage(id: &str, name: &str, division: &str, order: u32, logical: &str) -> StageRecord {
    let mut s = StageRecord::new(name, division, order, logical);
    s.id = id.to_string();
    s
}

pub fn stages() -> Vec<StageRecord> {
    vec![
        stage("d1-applied", "APPLIED", "D1", 1, "L-APPLIED"),
        stage("d1-training", "TRAINING", "D1", 2, "L-TRAINING"),
        stage("d1-training2", "TRAINING PHASE 2", "D1", 3, "L-TRAINING"),
        stage("d1-field", "FIELD", "D1", 4, "L-FIELD"),
        stage("d1-accident", "ACCIDENT", "D1", 5, "L-ACCIDENT"),
        stage("d2-applied", "APPLIED", "D2", 1, "L-APPLIED"),
        stage("d2-training", "TRAINING", "D2", 2, "L-TRAINING"),
        stage("d2-onboard", "ONBOARD", "D2", 3, "L-ONBOARD"),
    ]
}

fn binding(id: &str, credential: &str, division: &str, logical: Option<&str>) -> RequirementBinding {
    let mut b = RequirementBinding::new(credential, division, logical.unwrap_or_default());
    b.id = id.to_string();
    if logical.is_none() {
        b.unbind();
    }
    b
}

pub fn bindings() -> Vec<RequirementBinding> {
    let mut hazmat = binding("b-hazmat", "HAZMAT", "D1", Some("L-FIELD"));
    hazmat.deleted = true;
    vec![
        binding("b-bg", "BACKGROUND", "D1", Some("L-APPLIED")),
        binding("b-cpr", "CPR", "D1", Some("L-TRAINING")),
        binding("b-drug", "DRUG TEST", "D1", Some("L-TRAINING")),
        binding("b-cdl", "CDL", "D1", Some("L-FIELD")),
        binding("b-aid", "FIRST AID", "D1", None),
        hazmat,
        binding("b2-cpr", "CPR", "D2", Some("L-TRAINING")),
    ]
}

fn held(id: &str, subject: &str, binding: &str) -> Credential {
    let mut c = Credential::new(subject, binding);
    c.id = id.to_string();
    c
}

pub fn subjects() -> Vec<Subject> {
    let mut ann = Subject::new("s-ann", "D1", "TRAINING");
    ann.first_name = "Ann".into();
    ann.last_name = "Lee".into();
    ann.stage_id = Some("d1-training".into());
    ann.credentials = vec![held("c-ann-cpr", "s-ann", "b-cpr")];

    let mut bob = Subject::new("s-bob", "D1", "TRAINING");
    bob.stage_id = Some("d1-training".into());

    let cat = Subject::new("s-cat", "D1", "field");

    let mut dan = Subject::new("s-dan", "D2", "TRAINING");
    dan.stage_id = Some("d2-training".into());

    vec![ann, bob, cat, dan]
}

pub fn credentials() -> Vec<Credential> {
    let expired = held("c-cat-cdl", "s-cat", "b-cdl")
        .expiring(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
    let mut unapproved = held("c-cat-bg", "s-cat", "b-bg");
    unapproved.approved = false;
    vec![
        held("c-ann-bg", "s-ann", "b-bg"),
        held("c-bob-bg", "s-bob", "b-bg"),
        held("c-bob-cpr", "s-bob", "b-cpr"),
        held("c-bob-drug", "s-bob", "b-drug"),
        expired,
        unapproved,
        held("c-dan-cpr", "s-dan", "b2-cpr"),
    ]
}

pub fn history() -> Vec<StageHistoryEntry> {
    let entry = |id: &str, stage: &str, y, m, d| StageHistoryEntry {
        id: id.to_string(),
        subject_id: "s-ann".to_string(),
        stage_id: stage.to_string(),
        division: "D1".to_string(),
        date: Some(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()),
    };
    vec![
        entry("h-1", "d1-applied", 2025, 12, 1),
        entry("h-2", "d1-training", 2026, 1, 30),
        entry("h-3", "d1-training", 2026, 2, 20),
    ]
}

pub fn snapshot() -> Snapshot {
    Snapshot::new(stages(), logical_stages())
        .with_bindings(bindings())
        .with_subjects(subjects())
        .with_credentials(credentials())
        .with_history(history())
}
