//! Join rules between two tables

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// A join rule between two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Stable identifier
    pub id: Uuid,

    /// First table
    pub table_one: Uuid,

    /// Second table
    pub table_two: Uuid,

    /// Join key on the first table
    pub property_table_one: String,

    /// Join key on the second table
    pub property_table_two: String,

    /// Honour the relation in the reverse direction for display joins
    #[serde(default)]
    pub two_dimensional: bool,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl Relation {
    /// Create a new relation
    pub fn new(
        table_one: Uuid,
        property_table_one: impl Into<String>,
        table_two: Uuid,
        property_table_two: impl Into<String>,
    ) -> Self {
        Relation {
            id: Uuid::new_v4(),
            table_one,
            table_two,
            property_table_one: property_table_one.into(),
            property_table_two: property_table_two.into(),
            two_dimensional: false,
            created: Utc::now(),
        }
    }

    /// Mark the relation as two-dimensional
    pub fn two_dimensional(mut self) -> Self {
        self.two_dimensional = true;
        self
    }

    /// Whether `table` is one of the two sides
    pub fn involves(&self, table: Uuid) -> bool {
        self.table_one == table || self.table_two == table
    }

    /// Whether the relation links `a` and `b`, in either order
    pub fn links(&self, a: Uuid, b: Uuid) -> bool {
        (self.table_one == a && self.table_two == b) || (self.table_one == b && self.table_two == a)
    }

    /// Join key of `table`, if it is one of the sides
    pub fn key_of(&self, table: Uuid) -> Option<&str> {
        if self.table_one == table {
            Some(&self.property_table_one)
        } else if self.table_two == table {
            Some(&self.property_table_two)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_sides() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let relation = Relation::new(a, "id", b, "client_id");

        assert!(relation.involves(a));
        assert!(!relation.involves(c));
        assert!(relation.links(b, a));
        assert!(!relation.links(a, c));
        assert_eq!(relation.key_of(b), Some("client_id"));
        assert_eq!(relation.key_of(c), None);
        assert!(!relation.two_dimensional);
        assert!(relation.two_dimensional().two_dimensional);
    }
}
