//! tablemap synchronization service
//!
//! This crate mirrors upstream MySQL tables into the tablemap row store,
//! mirrors them in a destination PostgreSQL database, and materializes
//! virtual tables there.

#![forbid(unsafe_code)]

// Error types and result
pub mod error;
pub use error::{Result, SyncError};

// Configuration
pub mod config;
pub use config::{DestinationConfig, SyncConfig};

// Upstream sources
pub mod upstream;
pub use upstream::{MySqlSource, MySqlSourceFactory, SourceFactory, UpstreamSource};

// Destination store
pub mod destination;
pub use destination::{DestinationStore, PostgresDestination};

// Sync cycles and introspection
pub mod synchronizer;
pub use synchronizer::{SyncReport, Synchronizer, TableOutcome};

// Periodic scheduling
pub mod scheduler;
pub use scheduler::Scheduler;

// Virtual table materialization
pub mod materializer;
pub use materializer::Materializer;

// Virtual table preview
pub mod preview;
pub use preview::{preview, PreviewResult};
