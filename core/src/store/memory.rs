//! In-memory row store

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use log::debug;
use uuid::Uuid;

use super::RowStore;
use crate::error::{to_storage_error, Result};
use crate::models::Document;

/// Row store keeping every snapshot in memory
///
/// Each snapshot is an immutable `Arc<Vec<_>>` swapped under the write lock,
/// so a replace is a single pointer swap.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    snapshots: RwLock<HashMap<Uuid, Arc<Vec<Document>>>>,
}

impl MemoryRowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle on the current snapshot of `table`
    pub fn snapshot(&self, table: Uuid) -> Result<Arc<Vec<Document>>> {
        let snapshots = self.snapshots.read().map_err(to_storage_error)?;
        Ok(snapshots.get(&table).cloned().unwrap_or_default())
    }
}

impl RowStore for MemoryRowStore {
    fn replace_rows(&self, table: Uuid, rows: Vec<Document>) -> Result<()> {
        let snapshot = Arc::new(rows);
        let mut snapshots = self.snapshots.write().map_err(to_storage_error)?;
        debug!("Replacing {} rows of table {}", snapshot.len(), table);
        snapshots.insert(table, snapshot);
        Ok(())
    }

    fn rows_for(&self, table: Uuid) -> Result<Vec<Document>> {
        Ok(self.snapshot(table)?.as_ref().clone())
    }

    fn remove_table(&self, table: Uuid) -> Result<()> {
        self.snapshots.write().map_err(to_storage_error)?.remove(&table);
        Ok(())
    }

    fn row_count(&self, table: Uuid) -> Result<usize> {
        Ok(self.snapshot(table)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{doc, exercise_store};
    use serde_json::json;

    #[test]
    fn test_memory_store_contract() {
        exercise_store(&MemoryRowStore::new());
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let store = MemoryRowStore::new();
        let table = Uuid::new_v4();
        store.replace_rows(table, vec![doc(json!({"id": 1}))]).unwrap();

        let before = store.snapshot(table).unwrap();
        store.replace_rows(table, Vec::new()).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(store.row_count(table).unwrap(), 0);
    }
}
