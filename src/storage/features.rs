//! Manually submitted desired-value records.
//!
//! Records live in the `desired_values` sled tree keyed by a monotonically
//! increasing id (big-endian, so iteration is in submission order). Values
//! are JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::StorageError;
use crate::types::DesiredValues;

const TREE_NAME: &str = "desired_values";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: u64,
    pub elongation: f64,
    pub uts: f64,
    pub conductivity: f64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FeatureStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl std::fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStore")
            .field("records", &self.tree.len())
            .finish()
    }
}

impl FeatureStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// In-memory store that disappears on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { db, tree })
    }

    /// Persist one submission and return the stored record.
    pub fn insert(&self, values: &DesiredValues) -> Result<FeatureRecord, StorageError> {
        // sled ids start at 0; records are numbered from 1.
        let id = self.db.generate_id()? + 1;
        let record = FeatureRecord {
            id,
            elongation: values.elongation,
            uts: values.uts,
            conductivity: values.conductivity,
            submitted_at: Utc::now(),
        };
        self.tree
            .insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        self.tree.flush()?;
        debug!(id = id, "Desired values stored");
        Ok(record)
    }

    /// Delete one record. Returns whether it existed.
    pub fn remove(&self, id: u64) -> Result<bool, StorageError> {
        let existed = self.tree.remove(id.to_be_bytes())?.is_some();
        self.tree.flush()?;
        Ok(existed)
    }

    /// All records, oldest first. Unreadable entries are skipped.
    pub fn list(&self) -> Vec<FeatureRecord> {
        self.tree
            .iter()
            .filter_map(|item| match item {
                Ok((_, bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable desired-values record");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Desired-values scan error");
                    None
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(uts: f64) -> DesiredValues {
        DesiredValues {
            elongation: 12.0,
            uts,
            conductivity: 61.3,
        }
    }

    #[test]
    fn test_ids_increase_and_list_in_order() {
        let store = FeatureStore::temporary().unwrap();
        let a = store.insert(&values(11.0)).unwrap();
        let b = store.insert(&values(11.5)).unwrap();
        assert_eq!(a.id, 1);
        assert!(b.id > a.id);

        let all = store.list();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].uts, 11.0);
        assert_eq!(all[1].uts, 11.5);
    }

    #[test]
    fn test_remove_record() {
        let store = FeatureStore::temporary().unwrap();
        let a = store.insert(&values(11.0)).unwrap();
        let b = store.insert(&values(11.5)).unwrap();
        assert!(store.remove(a.id).unwrap());
        assert!(!store.remove(a.id).unwrap());
        let all = store.list();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, b.id);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join("features.db");
        {
            let store = FeatureStore::open(&path).unwrap();
            store.insert(&values(11.0)).unwrap();
        }
        let store = FeatureStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.list()[0].conductivity, 61.3);
    }
}
