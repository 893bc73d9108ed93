//! Credential - evidence a subject holds against a requirement binding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::{Record, RecordKind};
use crate::store::normalize::{flex_bool, flex_datetime, flex_opt_string, flex_string};

/// A held credential (certification)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default, deserialize_with = "flex_string")]
    pub id: String,

    /// Subject holding the credential
    #[serde(default, deserialize_with = "flex_string")]
    pub subject_id: String,

    /// Requirement binding this credential satisfies
    #[serde(default, deserialize_with = "flex_opt_string")]
    pub binding_id: Option<String>,

    /// Display name, informational only (matching is by binding id)
    #[serde(
        default,
        deserialize_with = "flex_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "flex_bool")]
    pub approved: bool,

    #[serde(default, deserialize_with = "flex_bool")]
    pub deleted: bool,

    #[serde(
        default,
        deserialize_with = "flex_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(subject_id: impl Into<String>, binding_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            binding_id: Some(binding_id.into()),
            approved: true,
            ..Default::default()
        }
    }

    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// A credential counts only when approved and not soft-deleted
    pub fn counts(&self) -> bool {
        self.approved && !self.deleted
    }

    /// Expired as of `now` (credentials without an expiry never expire)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn satisfies(&self, binding_id: &str) -> bool {
        self.binding_id.as_deref() == Some(binding_id)
    }
}

impl Record for Credential {
    const KIND: RecordKind = RecordKind::Credentials;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_counts_requires_approval_and_not_deleted() {
        let mut cred = Credential::new("S1", "B1");
        assert!(cred.counts());
        cred.approved = false;
        assert!(!cred.counts());
        cred.approved = true;
        cred.deleted = true;
        assert!(!cred.counts());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let cred = Credential::new("S1", "B1");
        assert!(!cred.is_expired(now));
        let cred = cred.expiring(now - Duration::days(1));
        assert!(cred.is_expired(now));
        let cred = Credential::new("S1", "B1").expiring(now + Duration::days(30));
        assert!(!cred.is_expired(now));
    }
}
