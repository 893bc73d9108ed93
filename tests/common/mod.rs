//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to get an olt command with no scope leaking in from the environment
pub fn olt() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("olt"));
    cmd.env_remove("OLT_DIVISION")
        .env_remove("OLT_TENANT")
        .env_remove("OLT_LOG");
    cmd
}

/// Helper to create an empty test project in a temp directory
pub fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    olt().current_dir(tmp.path()).arg("init").assert().success();
    tmp
}

pub fn data_file(tmp: &TempDir, stem: &str) -> PathBuf {
    tmp.path().join("data").join(format!("{}.yaml", stem))
}

pub fn read_data(tmp: &TempDir, stem: &str) -> String {
    fs::read_to_string(data_file(tmp, stem)).unwrap()
}

/// Helper to create a project seeded with two divisions, written the way
/// an exporter would (mixed field spellings, loosely typed values)
///
/// D1: APPLIED(1) TRAINING(2, auto-advance) FIELD(3)
/// D2: APPLIED(1)
/// Ann Lee holds CPR and DRUG TEST; Bob Ray holds CPR only; both at TRAINING.
pub fn setup_seeded_project() -> TempDir {
    let tmp = setup_test_project();

    write(
        &tmp,
        "logical_stages",
        r#"
- ID: L-APPLIED
  Status: APPLIED
  IsOperator: 1
  ClientId: ACME
- ID: L-TRAINING
  Status: TRAINING
  IsOperator: "1"
  ClientId: ACME
  IsAuto: true
- ID: L-FIELD
  Status: FIELD
  IsOperator: true
  ClientId: ACME
  IsAuto: 0
"#,
    );

    write(
        &tmp,
        "stages",
        r#"
- ID: d1-applied
  Status: APPLIED
  DivisionID: D1
  OrderID: "1"
  PizzaStatusID: L-APPLIED
- ID: d1-training
  Status: TRAINING
  DivisionId: D1
  OrderID: 2
  PizzaStatusID: L-TRAINING
  isDeleted: 0
- ID: d1-field
  Status: FIELD
  divisionId: D1
  OrderID: "3"
  PizzaStatusId: L-FIELD
- ID: d2-applied
  Status: APPLIED
  DivisionID: D2
  OrderID: 1
  PizzaStatusID: L-APPLIED
"#,
    );

    write(
        &tmp,
        "bindings",
        r#"
- ID: b-bg
  Certification: BACKGROUND
  DivisionID: D1
  PizzaStatusID: L-APPLIED
- ID: b-cpr
  Certification: CPR
  DivisionID: D1
  PizzaStatusID: L-TRAINING
- ID: b-drug
  Certification: DRUG TEST
  DivisionID: D1
  PizzaStatusID: L-TRAINING
- ID: b-cdl
  Certification: CDL
  DivisionID: D1
  PizzaStatusID: L-FIELD
"#,
    );

    write(
        &tmp,
        "subjects",
        r#"
- OperatorID: s-ann
  FirstName: Ann
  LastName: Lee
  DivisionID: D1
  Status: TRAINING
  StatusID: d1-training
- OperatorID: s-bob
  FirstName: Bob
  LastName: Ray
  DivisionID: D1
  Status: TRAINING
  StatusID: d1-training
- OperatorID: s-dan
  FirstName: Dan
  LastName: Fox
  DivisionID: D2
  Status: APPLIED
"#,
    );

    write(
        &tmp,
        "credentials",
        r#"
- CertificationId: c-ann-cpr
  OperatorID: s-ann
  CertTypeID: b-cpr
  IsApproved: 1
  ExpirationDate: "2099-01-01"
- CertificationId: c-ann-drug
  OperatorID: s-ann
  CertTypeID: b-drug
  IsApproved: 1
- CertificationId: c-bob-cpr
  OperatorID: s-bob
  CertTypeID: b-cpr
  IsApproved: "true"
"#,
    );

    write(
        &tmp,
        "stage_history",
        r#"
- ID: h-1
  OperatorID: s-ann
  StatusID: d1-training
  DivisionID: D1
  Date: "2020-01-15"
"#,
    );

    tmp
}

fn write(tmp: &TempDir, stem: &str, content: &str) {
    fs::write(data_file(tmp, stem), content.trim_start()).unwrap();
}
