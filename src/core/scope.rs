//! Resolution scope and the stage visibility predicate
//!
//! [`is_stage_visible`] is the single definition of which stage records a
//! resolution call may see. The workflow resolver, the derived requirement
//! lookup, aggregate compliance and auto-advance all go through it.

use serde::Serialize;

use crate::entities::{LogicalStage, StageRecord};

/// Division half of a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(untagged)]
pub enum DivisionSelector {
    /// Every division
    #[default]
    All,
    /// One named division
    Division(String),
}

impl DivisionSelector {
    pub fn is_all(&self) -> bool {
        matches!(self, DivisionSelector::All)
    }

    pub fn matches(&self, division: &str) -> bool {
        match self {
            DivisionSelector::All => true,
            DivisionSelector::Division(d) => d == division,
        }
    }

    pub fn as_division(&self) -> Option<&str> {
        match self {
            DivisionSelector::All => None,
            DivisionSelector::Division(d) => Some(d),
        }
    }
}

impl std::str::FromStr for DivisionSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err("Division selector cannot be empty".to_string())
        } else if s.eq_ignore_ascii_case("all") {
            Ok(DivisionSelector::All)
        } else {
            Ok(DivisionSelector::Division(s.to_string()))
        }
    }
}

impl std::fmt::Display for DivisionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivisionSelector::All => write!(f, "ALL"),
            DivisionSelector::Division(d) => write!(f, "{}", d),
        }
    }
}

/// The (division, tenant) pair restricting what a resolution call sees
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Scope {
    pub division: DivisionSelector,
    pub tenant: Option<String>,
}

impl Scope {
    /// Every division, no tenant restriction
    pub fn all() -> Self {
        Self::default()
    }

    pub fn division(division: impl Into<String>) -> Self {
        Self {
            division: DivisionSelector::Division(division.into()),
            tenant: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn is_all(&self) -> bool {
        self.division.is_all()
    }

    /// The same tenant restriction narrowed to one division
    pub fn narrowed_to(&self, division: &str) -> Self {
        Self {
            division: DivisionSelector::Division(division.to_string()),
            tenant: self.tenant.clone(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tenant {
            Some(t) => write!(f, "division={} tenant={}", self.division, t),
            None => write!(f, "division={}", self.division),
        }
    }
}

/// Whether a logical stage is in the engine's population and tenant scope
pub fn is_logical_stage_in_scope(logical: &LogicalStage, scope: &Scope) -> bool {
    if !logical.is_population_included() {
        return false;
    }
    match &scope.tenant {
        Some(tenant) => logical.tenant_id.as_deref() == Some(tenant.as_str()),
        None => true,
    }
}

/// Whether a stage record is visible in a scope
///
/// All must hold: the record is active, it references a logical stage that
/// exists, neither population-exclusion flag is set, the logical stage is
/// population-included, the division matches a specific selector, and the
/// logical stage's tenant matches a set tenant selector.
pub fn is_stage_visible<'a, F>(record: &StageRecord, lookup: F, scope: &Scope) -> bool
where
    F: Fn(&str) -> Option<&'a LogicalStage>,
{
    if !record.is_active() {
        return false;
    }
    let Some(logical_id) = record.logical_stage_id.as_deref() else {
        return false;
    };
    let Some(logical) = lookup(logical_id) else {
        return false;
    };
    if record.is_excluded_population() {
        return false;
    }
    if !scope.division.matches(&record.division) {
        return false;
    }
    is_logical_stage_in_scope(logical, scope)
}
