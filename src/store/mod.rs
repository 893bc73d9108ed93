//! Record-store collaborator
//!
//! Stores hold one collection per [`RecordKind`]. The engine reads whole
//! collections and writes back only the records it changed; `save_all`
//! performs an upsert-merge against the stored collection so two sessions
//! editing disjoint records do not clobber each other (last writer wins
//! per record).

pub mod file;
pub mod memory;
pub mod normalize;

use chrono::Utc;
use miette::Diagnostic;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::core::entity::{Record, RecordKind};
use crate::entities::{StageHistoryEntry, Subject};
use crate::yaml::YamlError;
pub use file::{DataFormat, FileStore};
pub use memory::MemoryStore;

/// Errors raised by record stores
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    #[diagnostic(code(olt::store::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Yaml(#[from] YamlError),

    #[error("JSON error in {path}: {source}")]
    #[diagnostic(code(olt::store::json))]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("The {kind} collection is not a list of records")]
    #[diagnostic(
        code(olt::store::shape),
        help("A collection file must be a list, or an object wrapping a single list")
    )]
    NotACollection { kind: RecordKind },

    #[error("Invalid record #{index} in {kind}: {message}")]
    #[diagnostic(code(olt::store::record))]
    InvalidRecord {
        kind: RecordKind,
        index: usize,
        message: String,
    },

    #[error("Failed to encode {kind} record: {message}")]
    #[diagnostic(code(olt::store::encode))]
    Encode { kind: RecordKind, message: String },

    #[error("The {kind} store is unavailable: {message}")]
    #[diagnostic(code(olt::store::unavailable))]
    Unavailable { kind: RecordKind, message: String },
}

/// Bulk subject-stage update: move every listed subject to one stage
#[derive(Debug, Clone, PartialEq)]
pub struct BulkStageUpdate {
    pub subject_ids: Vec<String>,
    pub stage_id: String,
    pub stage_name: String,
    pub order: String,
}

/// Access to stored record collections
///
/// Implementors provide the two raw primitives; typed access, the
/// upsert-merge and the bulk stage update are shared.
pub trait RecordStore {
    /// Load a collection as canonicalized documents
    fn load_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError>;

    /// Replace a stored collection
    fn write_raw(&mut self, kind: RecordKind, docs: Vec<Value>) -> Result<(), StoreError>;

    fn get_all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        decode_all(R::KIND, self.load_raw(R::KIND)?)
    }

    fn get_by_division<R: Record>(&self, division: &str) -> Result<Vec<R>, StoreError> {
        Ok(self
            .get_all::<R>()?
            .into_iter()
            .filter(|r| r.division() == Some(division))
            .collect())
    }

    /// Upsert-merge changed records into the stored collection
    ///
    /// Returns the ids of the submitted records, including ids generated
    /// for records that had none.
    fn save_all<R: Record>(&mut self, dirty: &[R]) -> Result<Vec<String>, StoreError> {
        if dirty.is_empty() {
            return Ok(Vec::new());
        }
        let mut existing = self.load_raw(R::KIND)?;
        let mut encoded = Vec::with_capacity(dirty.len());
        for record in dirty {
            let doc = serde_json::to_value(record).map_err(|e| StoreError::Encode {
                kind: R::KIND,
                message: e.to_string(),
            })?;
            encoded.push(doc);
        }
        let ids = merge_records(&mut existing, encoded);
        self.write_raw(R::KIND, existing)?;
        tracing::info!(kind = %R::KIND, count = ids.len(), "saved records");
        Ok(ids)
    }

    /// Persist a new current stage for each subject and log the stage entry
    ///
    /// Returns the number of subjects updated; unknown ids are skipped.
    fn update_subject_stages(&mut self, update: &BulkStageUpdate) -> Result<usize, StoreError> {
        let subjects = self.get_all::<Subject>()?;
        let mut changed = Vec::new();
        for id in &update.subject_ids {
            match subjects.iter().find(|s| &s.id == id) {
                Some(subject) => {
                    let mut subject = subject.clone();
                    subject.stage_id = Some(update.stage_id.clone());
                    subject.stage_name = update.stage_name.clone();
                    subject.order = Some(update.order.clone());
                    changed.push(subject);
                }
                None => tracing::warn!(subject = %id, "bulk stage update skipped unknown subject"),
            }
        }
        if changed.is_empty() {
            return Ok(0);
        }

        self.save_all(&changed)?;

        let now = Utc::now();
        let entries: Vec<StageHistoryEntry> = changed
            .iter()
            .map(|s| StageHistoryEntry {
                id: String::new(),
                subject_id: s.id.clone(),
                stage_id: update.stage_id.clone(),
                division: s.division.clone(),
                date: Some(now),
            })
            .collect();
        self.save_all(&entries)?;

        Ok(changed.len())
    }
}

/// Decode canonical documents into typed records
pub fn decode_all<R: Record>(kind: RecordKind, docs: Vec<Value>) -> Result<Vec<R>, StoreError> {
    docs.into_iter()
        .enumerate()
        .map(|(index, doc)| {
            serde_json::from_value(doc).map_err(|e| StoreError::InvalidRecord {
                kind,
                index,
                message: e.to_string(),
            })
        })
        .collect()
}

fn doc_id(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str).filter(|id| !id.is_empty())
}

/// Upsert-merge `incoming` into `existing`
///
/// Records without an id get a generated one and are appended; records
/// with a known id overwrite the stored record field-by-field (fields the
/// incoming record does not carry are kept); unknown ids are appended.
pub fn merge_records(existing: &mut Vec<Value>, incoming: Vec<Value>) -> Vec<String> {
    let mut ids = Vec::with_capacity(incoming.len());
    for mut doc in incoming {
        let id = match doc_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                let id = ulid::Ulid::new().to_string();
                if let Value::Object(map) = &mut doc {
                    map.insert("id".to_string(), Value::String(id.clone()));
                }
                id
            }
        };

        match existing.iter_mut().find(|d| doc_id(d) == Some(id.as_str())) {
            Some(slot) => match (slot, doc) {
                (Value::Object(stored), Value::Object(fields)) => {
                    for (k, v) in fields {
                        stored.insert(k, v);
                    }
                }
                (slot, doc) => *slot = doc,
            },
            None => existing.push(doc),
        }
        ids.push(id);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_known_ids_in_place() {
        let mut existing = vec![
            json!({"id": "1", "name": "A", "order": "1"}),
            json!({"id": "2", "name": "B", "order": "2"}),
        ];
        let ids = merge_records(&mut existing, vec![json!({"id": "2", "order": "5"})]);
        assert_eq!(ids, vec!["2"]);
        assert_eq!(existing.len(), 2);
        assert_eq!(existing[1]["order"], "5");
        assert_eq!(existing[1]["name"], "B");
    }

    #[test]
    fn test_merge_appends_unknown_and_generates_missing_ids() {
        let mut existing = vec![json!({"id": "1"})];
        let ids = merge_records(
            &mut existing,
            vec![json!({"id": "9", "name": "X"}), json!({"id": "", "name": "Y"})],
        );
        assert_eq!(existing.len(), 3);
        assert_eq!(ids[0], "9");
        assert_eq!(ids[1].len(), 26);
        assert_eq!(existing[2]["id"], json!(ids[1]));
    }
}
