//! Error types for the core crate
//!
//! This module provides a consolidated error type for the core crate,
//! wrapping errors from the catalog, the row stores and serialization.

use thiserror::Error;
use uuid::Uuid;

use crate::models::PropertyConflict;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Validation of a catalog mutation failed; nothing was applied
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A data group reuses properties already owned by another group of the same table
    #[error(
        "Some selected properties already exist in another data group for this table: {}",
        .conflicts.iter().map(|c| c.property.as_str()).collect::<Vec<_>>().join(", ")
    )]
    DataGroupOverlap {
        /// Table the data group belongs to
        table: Uuid,
        /// Every overlapping property with the group that already owns it
        conflicts: Vec<PropertyConflict>,
    },

    /// A relation between the two tables already exists
    #[error("There is already a relationship between these tables ({existing})")]
    DuplicateRelation {
        /// Identifier of the existing relation
        existing: Uuid,
    },

    /// The table is still referenced and cannot be removed
    #[error("Table {table} is referenced by {references} and cannot be deleted")]
    TableInUse {
        /// Local name of the table
        table: String,
        /// Human readable list of referencing entities
        references: String,
    },

    /// The relation defines a virtual table and cannot be removed
    #[error("Relation {relation} defines virtual table {table} and cannot be deleted")]
    RelationInUse {
        /// Identifier of the relation
        relation: Uuid,
        /// Local name of the virtual table
        table: String,
    },

    /// Unknown table
    #[error("Table not found: {0}")]
    TableNotFound(Uuid),

    /// Unknown relation
    #[error("Relation not found: {0}")]
    RelationNotFound(Uuid),

    /// Unknown data group
    #[error("Data group not found: {0}")]
    DataGroupNotFound(Uuid),

    /// Identifier that cannot be interpolated into SQL text
    #[error("Invalid identifier for {kind}: {name:?}")]
    InvalidIdentifier {
        /// What the identifier names (table, field, alias...)
        kind: &'static str,
        /// The rejected identifier
        name: String,
    },

    /// Row store failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, CoreError>;

/// Convert a displayable error into a StorageError
pub fn to_storage_error<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::StorageError(err.to_string())
}
