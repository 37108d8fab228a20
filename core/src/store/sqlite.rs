//! SQLite-backed row store

use std::path::Path;
use std::sync::Mutex;
use log::debug;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::RowStore;
use crate::error::{to_storage_error, Result};
use crate::models::Document;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS synchronized_rows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id TEXT NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS synchronized_rows_table_id ON synchronized_rows (table_id);
";

/// Row store persisting snapshots as JSON documents in SQLite
///
/// A replace runs the delete and every insert inside one transaction.
#[derive(Debug)]
pub struct SqliteRowStore {
    conn: Mutex<Connection>,
}

impl SqliteRowStore {
    /// Open (or create) a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a store living only in memory
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteRowStore {
            conn: Mutex::new(conn),
        })
    }
}

impl RowStore for SqliteRowStore {
    fn replace_rows(&self, table: Uuid, rows: Vec<Document>) -> Result<()> {
        let table_id = table.to_string();
        let mut conn = self.conn.lock().map_err(to_storage_error)?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM synchronized_rows WHERE table_id = ?1", params![table_id])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO synchronized_rows (table_id, data) VALUES (?1, ?2)")?;
            for row in &rows {
                insert.execute(params![table_id, serde_json::to_string(row)?])?;
            }
        }

        tx.commit()?;
        debug!("Replaced {} rows of table {}", rows.len(), table);
        Ok(())
    }

    fn rows_for(&self, table: Uuid) -> Result<Vec<Document>> {
        let conn = self.conn.lock().map_err(to_storage_error)?;
        let mut stmt =
            conn.prepare("SELECT data FROM synchronized_rows WHERE table_id = ?1 ORDER BY id")?;
        let raw = stmt
            .query_map(params![table.to_string()], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|data| serde_json::from_str::<Document>(data).map_err(Into::into))
            .collect()
    }

    fn remove_table(&self, table: Uuid) -> Result<()> {
        let conn = self.conn.lock().map_err(to_storage_error)?;
        conn.execute(
            "DELETE FROM synchronized_rows WHERE table_id = ?1",
            params![table.to_string()],
        )?;
        Ok(())
    }

    fn row_count(&self, table: Uuid) -> Result<usize> {
        let conn = self.conn.lock().map_err(to_storage_error)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM synchronized_rows WHERE table_id = ?1",
            params![table.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
