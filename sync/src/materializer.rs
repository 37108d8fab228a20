//! Materialization of virtual tables
//!
//! Committed catalog changes are mirrored in the destination: saving a
//! virtual table drops and recreates its physical table from the generated
//! `SELECT`, deleting any table drops its physical table. Events are
//! applied one at a time, in commit order, by a background task.

use std::sync::Arc;
use std::time::Duration;
use log::{error, info, warn};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tablemap_core::sql::DdlStatement;
use tablemap_core::{CatalogEvent, CatalogObserver};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::destination::DestinationStore;
use crate::error::{timed, Result, SyncError};

/// Check that `sql` is exactly one query
pub fn validate_select(sql: &str) -> Result<()> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| SyncError::InvalidSql(e.to_string()))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        _ => Err(SyncError::InvalidSql(format!(
            "Expected a single SELECT, got {} statements",
            statements.len()
        ))),
    }
}

/// Apply one catalog event to the destination
pub async fn materialize(destination: &dyn DestinationStore, event: &CatalogEvent, timeout: Duration) -> Result<()> {
    match event {
        CatalogEvent::VirtualTableSaved { table, sql } => {
            let select = sql.statement().ok_or_else(|| {
                SyncError::InvalidSql(format!("No SELECT to materialize {}", table.table))
            })?;
            validate_select(select)?;

            let statements = vec![
                DdlStatement::drop_table(&table.table)?.sql,
                DdlStatement::create_table_as(&table.table, select)?.sql,
            ];
            let what = format!("materialization of {}", table.table);
            timed(timeout, &what, destination.execute_batch(&statements)).await?;
            info!("Materialized virtual table {}", table.table);
        }
        CatalogEvent::TableDeleted { name, .. } => {
            let drop = DdlStatement::drop_table(name)?;
            let what = format!("drop of {}", name);
            timed(timeout, &what, destination.execute(&drop.sql)).await?;
            info!("Dropped physical table {}", name);
        }
    }
    Ok(())
}

/// Catalog observer forwarding committed changes to the destination
pub struct Materializer {
    sender: UnboundedSender<CatalogEvent>,
}

impl Materializer {
    /// Start the background task applying events to `destination`
    ///
    /// The task ends once the materializer is dropped and every queued event
    /// has been applied.
    pub fn spawn(destination: Arc<dyn DestinationStore>, timeout: Duration) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<CatalogEvent>();

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = materialize(destination.as_ref(), &event, timeout).await {
                    error!("Materialization failed: {}", e);
                }
            }
        });

        (Self { sender }, handle)
    }
}

impl CatalogObserver for Materializer {
    fn on_commit(&self, event: &CatalogEvent) {
        if self.sender.send(event.clone()).is_err() {
            warn!("Materializer stopped, dropping {:?}", event);
        }
    }
}
