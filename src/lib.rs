//! tablemap - synchronized and virtual tables for map visualization
//!
//! This is the root crate that provides workspace-level documentation.
//! Actual implementation is in the subcrates:
//! - `tablemap-core`: catalog, row stores, join engine, projector and SQL generation
//! - `tablemap-sync`: upstream MySQL synchronization, scheduling and materialization
//! - `tablemap-api`: JSON API over the catalog and the row store

/// Returns the version of the package.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
