//! Data models for tablemap
//!
//! This module provides data structures for representing synchronized and
//! virtual tables, their rows, the relations between them, data groups,
//! map display configuration and upstream connections.

mod table;
mod row;
mod relation;
mod data_group;
mod marker;
mod connection;

pub use table::{FieldDescriptor, Table};
pub use row::{Document, Row};
pub use relation::Relation;
pub use data_group::{DataGroup, PropertyConflict};
pub use marker::{FieldRef, IconKind, Line, Marker};
pub use connection::{Connection, DatabaseOrigin, IntervalPeriod, SyncSelection, TableInfo};

use serde::Serialize;

/// A `{value, description}` pair describing one choice of an enumerated field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChoice {
    /// Stored value
    pub value: serde_json::Value,

    /// Human readable description
    pub description: &'static str,
}

/// Choices of the enumerated model field called `field`, if there is one
pub fn field_choices(field: &str) -> Option<Vec<FieldChoice>> {
    match field {
        "type_icon" => Some(
            IconKind::ALL
                .iter()
                .map(|kind| FieldChoice {
                    value: serde_json::json!(*kind as u8),
                    description: kind.description(),
                })
                .collect(),
        ),
        "period_interval" => Some(
            IntervalPeriod::ALL
                .iter()
                .map(|period| FieldChoice {
                    value: serde_json::json!(period.as_str()),
                    description: period.description(),
                })
                .collect(),
        ),
        "database_origin" => Some(vec![FieldChoice {
            value: serde_json::json!(DatabaseOrigin::MySql.as_str()),
            description: "MySQL",
        }]),
        _ => None,
    }
}
