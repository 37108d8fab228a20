//! Synchronization of upstream tables
//!
//! One sync cycle fetches every active table of a connection and replaces
//! its snapshot in the row store. A table whose fetch fails keeps its
//! previous snapshot; the other tables of the connection are still synced.
//! When a destination is configured each fresh snapshot is also mirrored
//! there.
//!
//! Two overlapping cycles over the same table are not serialized here; the
//! scheduler never runs two cycles of one connection at once.

use std::sync::Arc;
use std::time::Duration;
use log::{error, info, warn};
use serde::Serialize;
use tablemap_core::models::{Connection, Document, Table, TableInfo};
use tablemap_core::sql::{columns_from_descriptors, DdlStatement, TableDefinition};
use tablemap_core::{Catalog, RowStore};
use uuid::Uuid;

use crate::destination::DestinationStore;
use crate::error::{timed, Result, SyncError};
use crate::upstream::UpstreamSource;

/// Outcome of one table in a sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    /// The snapshot was replaced
    Synced {
        /// Number of rows in the new snapshot
        rows: usize,
    },

    /// The snapshot was replaced but mirroring it failed
    MirrorFailed {
        /// Number of rows in the new snapshot
        rows: usize,
        /// What went wrong
        error: String,
    },

    /// The previous snapshot was kept
    Failed {
        /// What went wrong
        error: String,
    },
}

/// Outcome of a sync cycle of one connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Connection that was synced
    pub connection: Uuid,

    /// Outcome per local table name
    pub tables: Vec<(String, TableOutcome)>,
}

impl SyncReport {
    /// Number of tables whose snapshot was kept
    pub fn failures(&self) -> usize {
        self.tables
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TableOutcome::Failed { .. }))
            .count()
    }
}

/// Runs sync cycles against a row store and an optional destination
pub struct Synchronizer {
    store: Arc<dyn RowStore>,
    destination: Option<Arc<dyn DestinationStore>>,
    fetch_timeout: Duration,
    destination_timeout: Duration,
}

impl Synchronizer {
    /// Create a synchronizer
    pub fn new(
        store: Arc<dyn RowStore>,
        destination: Option<Arc<dyn DestinationStore>>,
        fetch_timeout: Duration,
        destination_timeout: Duration,
    ) -> Self {
        Self {
            store,
            destination,
            fetch_timeout,
            destination_timeout,
        }
    }

    /// Tables of `connection` that a sync cycle covers
    pub fn tables_to_sync<'a>(connection: &Connection, tables: &'a [Table]) -> Vec<&'a Table> {
        tables
            .iter()
            .filter(|t| t.connection == Some(connection.id) && t.is_active && !t.is_virtual)
            .filter(|t| t.table_origin.is_some())
            .collect()
    }

    /// Fields fetched for `table`: the selection of the connection, else every known field
    pub fn fields_to_fetch(connection: &Connection, table: &Table) -> Vec<String> {
        let origin = table.table_origin.as_deref().unwrap_or_default();
        connection
            .info_to_sync_selected
            .iter()
            .find(|s| s.table == origin)
            .map(|s| s.fields.clone())
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(|| table.fields.iter().map(|f| f.field.clone()).collect())
    }

    /// Run one sync cycle over the active tables of `connection`
    pub async fn sync_connection(
        &self,
        source: &dyn UpstreamSource,
        connection: &Connection,
        tables: &[Table],
    ) -> SyncReport {
        let mut report = SyncReport {
            connection: connection.id,
            tables: Vec::new(),
        };

        for table in Self::tables_to_sync(connection, tables) {
            let outcome = match self.sync_table(source, connection, table).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Sync of {} from {} failed: {}", table.table, connection.label(), e);
                    TableOutcome::Failed { error: e.to_string() }
                }
            };
            report.tables.push((table.table.clone(), outcome));
        }

        info!(
            "Synced {} tables of {} ({} failed)",
            report.tables.len(),
            connection.label(),
            report.failures()
        );
        report
    }

    async fn sync_table(
        &self,
        source: &dyn UpstreamSource,
        connection: &Connection,
        table: &Table,
    ) -> Result<TableOutcome> {
        let origin = table.table_origin.as_deref().unwrap_or_default();
        let fields = Self::fields_to_fetch(connection, table);
        let what = format!("fetch of {}", origin);
        let rows = timed(self.fetch_timeout, &what, source.fetch_rows(origin, &fields)).await?;
        let count = rows.len();

        let mirrored = self.destination.as_ref().map(|_| rows.clone());
        self.replace(table.id, rows).await?;

        if let (Some(destination), Some(rows)) = (&self.destination, mirrored) {
            if let Err(e) = self.mirror(destination.as_ref(), table, &rows).await {
                warn!("Mirror of {} failed: {}", table.table, e);
                return Ok(TableOutcome::MirrorFailed {
                    rows: count,
                    error: e.to_string(),
                });
            }
        }

        Ok(TableOutcome::Synced { rows: count })
    }

    async fn replace(&self, table: Uuid, rows: Vec<Document>) -> Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.replace_rows(table, rows))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;
        Ok(())
    }

    async fn mirror(&self, destination: &dyn DestinationStore, table: &Table, rows: &[Document]) -> Result<()> {
        let statements = mirror_statements(table, rows)?;
        if statements.is_empty() {
            return Ok(());
        }

        let what = format!("mirror of {}", table.table);
        timed(self.destination_timeout, &what, destination.execute_batch(&statements)).await
    }
}

/// Statements recreating the mirror of `table` in the destination
///
/// Drop, create from the table's columns, insert `rows` when there are any.
/// Nothing is produced for a table without columns.
pub fn mirror_statements(table: &Table, rows: &[Document]) -> Result<Vec<String>> {
    let columns = columns_from_descriptors(&table.fields);
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut statements = vec![
        DdlStatement::drop_table(&table.table)?.sql,
        DdlStatement::create_table(TableDefinition {
            name: table.table.clone(),
            columns,
        })?
        .sql,
    ];
    if let Some(insert) = DdlStatement::insert_rows(&table.table, &names, rows)? {
        statements.push(insert.sql);
    }

    Ok(statements)
}

/// Read the catalogue of tables and columns of an upstream source
pub async fn discover(source: &dyn UpstreamSource, timeout: Duration) -> Result<Vec<TableInfo>> {
    let names = timed(timeout, "table listing", source.list_tables()).await?;
    let mut infos = Vec::with_capacity(names.len());

    for table in names {
        let what = format!("description of {}", table);
        match timed(timeout, &what, source.describe_table(&table)).await {
            Ok(fields) => infos.push(TableInfo { table, fields }),
            Err(e) => warn!("Skipping upstream table {}: {}", table, e),
        }
    }

    Ok(infos)
}

/// Record a discovered catalogue and register the connection's selected tables
///
/// Returns the ids of the tables of `connection` updated from the catalogue.
pub fn apply_discovery(catalog: &mut Catalog, connection: &Connection, infos: Vec<TableInfo>) -> Result<Vec<Uuid>> {
    catalog.set_discovered(connection.id, infos.clone())?;

    let mut updated = Vec::new();
    for info in infos.iter().filter(|info| connection.is_selected(&info.table)) {
        updated.push(catalog.upsert_discovered_table(connection, info)?);
    }
    Ok(updated)
}

/// Create empty mirrors of `tables` in the destination
pub async fn create_mirrors(destination: &dyn DestinationStore, tables: &[Table], timeout: Duration) -> Result<()> {
    for table in tables {
        let statements = mirror_statements(table, &[])?;
        if statements.is_empty() {
            continue;
        }
        let what = format!("creation of {}", table.table);
        timed(timeout, &what, destination.execute_batch(&statements)).await?;
    }
    Ok(())
}
