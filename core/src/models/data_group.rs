//! Curated field subsets of a table
//!
//! A data group names the fields of a table a viewer is allowed to see. A
//! field belongs to at most one data group per table.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A named subset of a table's fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGroup {
    /// Stable identifier
    pub id: Uuid,

    /// Unique description
    pub description: String,

    /// Owning table
    pub table: Uuid,

    /// Ordered field names
    #[serde(deserialize_with = "deserialize_properties")]
    pub properties: Vec<String>,
}

/// A property that already belongs to another data group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyConflict {
    /// The overlapping field name
    pub property: String,

    /// Data group that already owns the field
    pub data_group: Uuid,

    /// Description of that data group
    pub description: String,
}

/// Properties arrive either as plain names or as field descriptors
#[derive(Deserialize)]
#[serde(untagged)]
enum PropertyRef {
    Name(String),
    Descriptor {
        #[serde(rename = "Field")]
        field: String,
    },
}

fn deserialize_properties<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let refs = Vec::<PropertyRef>::deserialize(deserializer)?;
    Ok(refs
        .into_iter()
        .map(|r| match r {
            PropertyRef::Name(name) => name,
            PropertyRef::Descriptor { field } => field,
        })
        .collect())
}

impl DataGroup {
    /// Create a new data group
    pub fn new(description: impl Into<String>, table: Uuid, properties: Vec<String>) -> Self {
        DataGroup {
            id: Uuid::new_v4(),
            description: description.into(),
            table,
            properties,
        }
    }

    /// Properties of `self` already owned by `other`
    pub fn conflicts_with(&self, other: &DataGroup) -> Vec<PropertyConflict> {
        if self.table != other.table || self.id == other.id {
            return Vec::new();
        }

        self.properties
            .iter()
            .filter(|p| other.properties.contains(p))
            .map(|p| PropertyConflict {
                property: p.clone(),
                data_group: other.id,
                description: other.description.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties_accept_names_and_descriptors() {
        let group: DataGroup = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "description": "contact",
            "table": Uuid::new_v4(),
            "properties": ["email", {"Field": "phone", "Type": "varchar(20)"}]
        }))
        .unwrap();

        assert_eq!(group.properties, vec!["email", "phone"]);
    }

    #[test]
    fn test_conflicts_only_within_same_table() {
        let table = Uuid::new_v4();
        let existing = DataGroup::new("public", table, vec!["name".into(), "phone".into()]);
        let candidate = DataGroup::new("sales", table, vec!["phone".into(), "credit".into()]);
        let elsewhere = DataGroup::new("other", Uuid::new_v4(), vec!["phone".into()]);

        let conflicts = candidate.conflicts_with(&existing);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].property, "phone");
        assert_eq!(conflicts[0].description, "public");

        assert!(candidate.conflicts_with(&elsewhere).is_empty());
    }
}
