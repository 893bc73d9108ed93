//! File-backed record store - one YAML or JSON file per collection

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::store::normalize::{canonicalize, collection_items};
use crate::store::{RecordKind, RecordStore, StoreError};
use crate::yaml::parse_yaml;

/// On-disk encoding of collection files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Yaml,
    Json,
}

impl DataFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Yaml => "yaml",
            DataFormat::Json => "json",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Record store over a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    format: DataFormat,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, format: DataFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the collection file for a record kind
    pub fn path_for(&self, kind: RecordKind) -> PathBuf {
        self.dir
            .join(format!("{}.{}", kind.file_stem(), self.format.extension()))
    }

    fn read_doc(&self, path: &Path) -> Result<Value, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        match self.format {
            DataFormat::Yaml => Ok(parse_yaml(&content, &path.display().to_string())?),
            DataFormat::Json => serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl RecordStore for FileStore {
    fn load_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError> {
        let path = self.path_for(kind);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "collection file missing, treating as empty");
            return Ok(Vec::new());
        }
        let doc = self.read_doc(&path)?;
        let items = collection_items(doc).ok_or(StoreError::NotACollection { kind })?;
        Ok(items
            .into_iter()
            .map(|item| canonicalize(kind, item))
            .collect())
    }

    fn write_raw(&mut self, kind: RecordKind, docs: Vec<Value>) -> Result<(), StoreError> {
        let path = self.path_for(kind);
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let doc = Value::Array(docs);
        let contents = match self.format {
            DataFormat::Yaml => serde_yml::to_string(&doc).map_err(|e| StoreError::Encode {
                kind,
                message: e.to_string(),
            })?,
            DataFormat::Json => {
                serde_json::to_string_pretty(&doc).map_err(|source| StoreError::Json {
                    path: path.clone(),
                    source,
                })?
            }
        };

        std::fs::write(&path, contents).map_err(|source| StoreError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{StageRecord, Subject};
    use crate::store::BulkStageUpdate;
    use tempfile::tempdir;

    #[test]
    fn test_missing_collection_is_empty() {
        let tmp = tempdir().unwrap();
        let store = FileStore::new(tmp.path(), DataFormat::Yaml);
        let stages: Vec<StageRecord> = store.get_all().unwrap();
        assert!(stages.is_empty());
    }

    #[test]
    fn test_reads_aliased_yaml_collection() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join("stages.yaml"),
            r#"- ID: "1"
  Status: APPLIED
  DivisionID: "3 - TX"
  OrderID: "1"
  PizzaStatusID: "10"
  isDeleted: false
- ID: "2"
  Status: TRAINING
  DivisionID: "3 - TX"
  OrderID: "2"
  PizzaStatusID: "11"
  IsDelete: 1
"#,
        )
        .unwrap();

        let store = FileStore::new(tmp.path(), DataFormat::Yaml);
        let stages: Vec<StageRecord> = store.get_by_division("3 - TX").unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "APPLIED");
        assert!(stages[1].deleted);
    }

    #[test]
    fn test_reads_wrapped_json_collection() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join("subjects.json"),
            r#"{"operators": [{"ID": "op-1", "DivisionID": "D1", "StatusName": "FIELD"}]}"#,
        )
        .unwrap();

        let store = FileStore::new(tmp.path(), DataFormat::Json);
        let subjects: Vec<Subject> = store.get_all().unwrap();
        assert_eq!(subjects[0].stage_name, "FIELD");
    }

    #[test]
    fn test_save_all_merges_with_stored_collection() {
        let tmp = tempdir().unwrap();
        let mut store = FileStore::new(tmp.path(), DataFormat::Yaml);

        let mut a = StageRecord::new("A", "D1", 1, "L1");
        a.id = "a".to_string();
        let mut b = StageRecord::new("B", "D1", 2, "L2");
        b.id = "b".to_string();
        store.save_all(&[a, b.clone()]).unwrap();

        b.set_order(7);
        let new = StageRecord::new("C", "D1", 3, "L3");
        let ids = store.save_all(&[b, new]).unwrap();

        let stages: Vec<StageRecord> = store.get_all().unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[1].order, "7");
        assert_eq!(stages[2].id, ids[1]);
    }

    #[test]
    fn test_update_subject_stages_appends_history() {
        let tmp = tempdir().unwrap();
        let mut store = FileStore::new(tmp.path(), DataFormat::Json);
        store
            .save_all(&[Subject::new("s1", "D1", "TRAINING"), Subject::new("s2", "D1", "TRAINING")])
            .unwrap();

        let updated = store
            .update_subject_stages(&BulkStageUpdate {
                subject_ids: vec!["s1".into(), "missing".into()],
                stage_id: "st-3".into(),
                stage_name: "FIELD".into(),
                order: "3".into(),
            })
            .unwrap();
        assert_eq!(updated, 1);

        let subjects: Vec<Subject> = store.get_all().unwrap();
        assert_eq!(subjects[0].stage_name, "FIELD");
        assert_eq!(subjects[0].stage_id.as_deref(), Some("st-3"));
        assert_eq!(subjects[1].stage_name, "TRAINING");

        let history: Vec<crate::entities::StageHistoryEntry> = store.get_all().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].subject_id, "s1");
        assert!(history[0].date.is_some());
    }

    #[test]
    fn test_invalid_yaml_surfaces_diagnostic() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("stages.yaml"), "- ID: 1\n  Status: [unclosed\n").unwrap();
        let store = FileStore::new(tmp.path(), DataFormat::Yaml);
        let result: Result<Vec<StageRecord>, _> = store.get_all();
        assert!(matches!(result, Err(StoreError::Yaml(_))));
    }
}
