//! Row stores
//!
//! A row store holds the current snapshot of rows of every synchronized
//! table. Snapshots are replaced wholesale by each sync cycle; a reader
//! observes either the previous snapshot or the new one, never a mix.

mod memory;
mod sqlite;

pub use memory::MemoryRowStore;
pub use sqlite::SqliteRowStore;

use uuid::Uuid;

use crate::error::Result;
use crate::models::Document;

/// Storage of synchronized row snapshots
pub trait RowStore: Send + Sync {
    /// Atomically replace every row of `table` with `rows`
    fn replace_rows(&self, table: Uuid, rows: Vec<Document>) -> Result<()>;

    /// Current snapshot of `table`, in insertion order; empty if never synced
    fn rows_for(&self, table: Uuid) -> Result<Vec<Document>>;

    /// Drop the snapshot of `table`
    fn remove_table(&self, table: Uuid) -> Result<()>;

    /// Number of rows in the snapshot of `table`
    fn row_count(&self, table: Uuid) -> Result<usize> {
        Ok(self.rows_for(table)?.len())
    }
}
