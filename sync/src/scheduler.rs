//! Periodic synchronization
//!
//! The scheduler wakes up on a fixed tick, reads the connections of the
//! catalog and starts a sync cycle for every active connection whose
//! interval has elapsed. A connection is never synced by two cycles at once:
//! while a cycle is running, the connection is skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use log::{debug, error, info};
use tablemap_core::models::{Connection, Table};
use tablemap_core::Catalog;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::synchronizer::{SyncReport, Synchronizer};
use crate::upstream::SourceFactory;

/// Connections due for a sync cycle at `now`
///
/// A connection seen for the first time is due immediately. Every returned
/// connection gets its next due time moved one interval past `now`;
/// connections that are gone or inactive are forgotten.
pub fn due_connections<'a>(
    connections: &'a [Connection],
    next_due: &mut HashMap<Uuid, Instant>,
    now: Instant,
) -> Vec<&'a Connection> {
    next_due.retain(|id, _| connections.iter().any(|c| c.id == *id && c.is_active));

    let mut due = Vec::new();
    for connection in connections.iter().filter(|c| c.is_active) {
        let deadline = next_due.entry(connection.id).or_insert(now);
        if *deadline <= now {
            *deadline = now + connection.interval();
            due.push(connection);
        }
    }
    due
}

/// Drives sync cycles over the connections of a shared catalog
pub struct Scheduler {
    catalog: Arc<RwLock<Catalog>>,
    synchronizer: Arc<Synchronizer>,
    sources: Arc<dyn SourceFactory>,
    tick: Duration,
}

impl Scheduler {
    /// Create a scheduler waking up every `tick`
    pub fn new(
        catalog: Arc<RwLock<Catalog>>,
        synchronizer: Arc<Synchronizer>,
        sources: Arc<dyn SourceFactory>,
        tick: Duration,
    ) -> Self {
        Self {
            catalog,
            synchronizer,
            sources,
            tick,
        }
    }

    async fn catalog_view(&self) -> (Vec<Connection>, Vec<Table>) {
        let catalog = self.catalog.read().await;
        (catalog.connections().to_vec(), catalog.tables().to_vec())
    }

    /// Run until `shutdown` turns true, then wait for the running cycles
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started with a tick of {:?}", self.tick);

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut next_due = HashMap::new();
        let mut running: HashMap<Uuid, JoinHandle<SyncReport>> = HashMap::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            running.retain(|_, handle| !handle.is_finished());

            let (connections, tables) = self.catalog_view().await;
            for connection in due_connections(&connections, &mut next_due, Instant::now()) {
                if running.contains_key(&connection.id) {
                    debug!("Skipping {}: previous cycle still running", connection.label());
                    continue;
                }
                let handle = self.spawn_cycle(connection.clone(), tables.clone());
                running.insert(connection.id, handle);
            }
        }

        info!("Scheduler stopping, waiting for {} running cycles", running.len());
        for (id, handle) in running {
            if let Err(e) = handle.await {
                error!("Sync cycle of {} failed: {}", id, e);
            }
        }
    }

    fn spawn_cycle(&self, connection: Connection, tables: Vec<Table>) -> JoinHandle<SyncReport> {
        let synchronizer = self.synchronizer.clone();
        let sources = self.sources.clone();
        tokio::spawn(async move { sync_with(&synchronizer, sources.as_ref(), &connection, &tables).await })
    }

    /// Run one cycle of every active connection, one after the other
    pub async fn sync_all(&self) -> Vec<SyncReport> {
        let (connections, tables) = self.catalog_view().await;
        let mut reports = Vec::new();
        for connection in connections.iter().filter(|c| c.is_active) {
            reports.push(sync_with(&self.synchronizer, self.sources.as_ref(), connection, &tables).await);
        }
        reports
    }
}

async fn sync_with(
    synchronizer: &Synchronizer,
    sources: &dyn SourceFactory,
    connection: &Connection,
    tables: &[Table],
) -> SyncReport {
    let source = match sources.open(connection) {
        Ok(source) => source,
        Err(e) => {
            error!("Cannot open {}: {}", connection.label(), e);
            return SyncReport {
                connection: connection.id,
                tables: Vec::new(),
            };
        }
    };

    let report = synchronizer.sync_connection(source.as_ref(), connection, tables).await;
    if let Err(e) = source.close().await {
        debug!("Closing {} failed: {}", connection.label(), e);
    }
    report
}
