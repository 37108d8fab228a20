//! Synchronized row representation
//!
//! A row is an opaque JSON document. Its keys are the source field names of
//! the owning table, although a sync may carry extra fields that are
//! projected away at read time.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Field name to scalar (or null) mapping
pub type Document = Map<String, Value>;

/// One synchronized record belonging to a table
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Table this row belongs to
    pub table: Uuid,

    /// Column values
    pub data: Document,
}

impl Debug for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Row {{ table: {}, fields: {} }}", self.table, self.data.len())
    }
}

impl Row {
    /// Create a new row
    pub fn new(table: Uuid, data: Document) -> Self {
        Row { table, data }
    }

    /// Get a value by field name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Set a value for a field
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.data.insert(field.into(), value);
    }

    /// Consume the row, keeping only its document
    pub fn into_document(self) -> Document {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_accessors() {
        let table = Uuid::new_v4();
        let mut row = Row::new(table, Document::new());
        assert!(row.get("name").is_none());

        row.set("name", json!("Caracas"));
        row.set("population", json!(2_245_744));

        assert_eq!(row.get("name"), Some(&json!("Caracas")));
        assert_eq!(row.into_document().len(), 2);
    }
}
