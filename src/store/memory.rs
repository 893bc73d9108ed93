//! In-process record store for embedding and tests

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::store::normalize::canonicalize;
use crate::store::{Record, RecordKind, RecordStore, StoreError};

/// A record store held entirely in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    collections: HashMap<RecordKind, Vec<Value>>,
    failing_writes: HashSet<RecordKind>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection from typed records
    pub fn with_records<R: Record>(mut self, records: &[R]) -> Self {
        let docs = records
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        self.collections.insert(R::KIND, docs);
        self
    }

    /// Seed a collection from raw documents as an exporter would write them
    pub fn with_raw(mut self, kind: RecordKind, docs: Vec<Value>) -> Self {
        let docs = docs.into_iter().map(|d| canonicalize(kind, d)).collect();
        self.collections.insert(kind, docs);
        self
    }

    /// Make every write to `kind` fail, simulating an unavailable backend
    pub fn fail_writes_to(&mut self, kind: RecordKind) {
        self.failing_writes.insert(kind);
    }

    pub fn heal(&mut self) {
        self.failing_writes.clear();
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.collections.get(&kind).map_or(0, Vec::len)
    }
}

impl RecordStore for MemoryStore {
    fn load_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError> {
        Ok(self.collections.get(&kind).cloned().unwrap_or_default())
    }

    fn write_raw(&mut self, kind: RecordKind, docs: Vec<Value>) -> Result<(), StoreError> {
        if self.failing_writes.contains(&kind) {
            return Err(StoreError::Unavailable {
                kind,
                message: "write rejected".to_string(),
            });
        }
        self.collections.insert(kind, docs);
        Ok(())
    }
}
