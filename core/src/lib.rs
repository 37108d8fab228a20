//! # tablemap core
//!
//! Core data structures and engines of tablemap: the catalog of synchronized
//! and virtual tables, row stores, the join engine, the geo/field projector
//! and the SQL text generator.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod join;
pub mod models;
pub mod projector;
pub mod search;
pub mod sql;
pub mod store;
pub mod utils;

/// Re-export common types for ease of use
pub use catalog::{Catalog, CatalogEvent, CatalogObserver, CatalogSnapshot, VirtualTableRequest};
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use models::{Connection, DataGroup, Document, FieldDescriptor, Relation, Row, Table};
pub use projector::{GeoPoint, Projection};
pub use sql::{GeneratedSql, VirtualDefinition};
pub use store::{MemoryRowStore, RowStore, SqliteRowStore};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
