//! Shared state of the HTTP service

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tablemap_core::{Catalog, RowStore};
use tablemap_sync::DestinationStore;
use tokio::sync::RwLock;

use crate::api::ApiError;

/// The shared application state
pub struct AppState {
    /// Catalog of tables, relations and map settings
    pub catalog: RwLock<Catalog>,

    /// Synchronized rows
    pub store: Arc<dyn RowStore>,

    /// Destination used to run previews
    pub destination: Option<Arc<dyn DestinationStore>>,

    /// File the catalog is saved to after every change
    pub catalog_path: Option<PathBuf>,

    /// Timeout of one destination operation
    pub destination_timeout: Duration,
}

impl AppState {
    /// State without persistence or destination
    pub fn new(catalog: Catalog, store: Arc<dyn RowStore>) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            store,
            destination: None,
            catalog_path: None,
            destination_timeout: Duration::from_secs(30),
        }
    }

    /// Save `catalog` when a catalog file is configured
    ///
    /// Called with the write lock held so that saves happen in commit order.
    pub fn persist(&self, catalog: &Catalog) -> Result<(), ApiError> {
        if let Some(path) = &self.catalog_path {
            catalog.save(path)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("catalog_path", &self.catalog_path)
            .field("destination", &self.destination.is_some())
            .finish()
    }
}
