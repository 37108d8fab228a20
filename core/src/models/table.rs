//! Synchronized and virtual table representation
//!
//! A table is either mirrored from an upstream connection or "virtual", in
//! which case its rows are computed by joining two other tables through its
//! defining relation.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

/// Description of one field of a table
///
/// Serialized with the column names reported by `SHOW COLUMNS` on the
/// upstream source, which is where synchronized descriptors come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Source field name
    #[serde(rename = "Field")]
    pub field: String,

    /// Upstream column type, e.g. `int(11)`
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    /// Upstream nullability, `YES` or `NO`
    #[serde(rename = "Null", default, skip_serializing_if = "Option::is_none")]
    pub null: Option<String>,

    /// Display alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Whether the field is exposed
    #[serde(default)]
    pub selected: bool,

    /// Owning table, for fields of a virtual table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Uuid>,
}

impl FieldDescriptor {
    /// Create a descriptor for a field with no type information
    pub fn new(field: impl Into<String>) -> Self {
        FieldDescriptor {
            field: field.into(),
            field_type: None,
            null: None,
            alias: None,
            selected: false,
            table: None,
        }
    }

    /// Create a selected descriptor of a virtual table field
    pub fn of_table(table: Uuid, field: impl Into<String>, alias: Option<String>) -> Self {
        FieldDescriptor {
            alias,
            selected: true,
            table: Some(table),
            ..FieldDescriptor::new(field)
        }
    }

    /// Set the upstream type and nullability
    pub fn with_type(mut self, field_type: impl Into<String>, nullable: bool) -> Self {
        self.field_type = Some(field_type.into());
        self.null = Some(if nullable { "YES" } else { "NO" }.to_string());
        self
    }

    /// Mark the field as selected
    pub fn selected(mut self) -> Self {
        self.selected = true;
        self
    }

    /// Whether the upstream column accepts nulls (unknown counts as nullable)
    pub fn is_nullable(&self) -> bool {
        self.null.as_deref() != Some("NO")
    }

    /// Key under which the field is exposed: the alias when set, else the field name
    pub fn output_name(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.is_empty() => alias,
            _ => &self.field,
        }
    }
}

/// A synchronized or virtual table
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Stable identifier
    pub id: Uuid,

    /// Name of the table on the upstream source
    pub table_origin: Option<String>,

    /// Local table name
    pub table: String,

    /// Human alias
    pub alias: String,

    /// Ordered field descriptors
    pub fields: Vec<FieldDescriptor>,

    /// Upstream connection
    pub connection: Option<Uuid>,

    /// Whether the table is synchronized
    pub is_active: bool,

    /// Whether rows are computed from the defining relation
    pub is_virtual: bool,

    /// Whether rows carry a map point
    pub show_on_map: bool,

    /// Field holding the latitude
    pub property_latitude: Option<String>,

    /// Field holding the longitude
    pub property_longitude: Option<String>,

    /// Field holding the icon
    pub property_icon: Option<String>,

    /// Defining relation of a virtual table
    pub relation: Option<Uuid>,

    /// Side of the defining relation used as geo anchor
    pub geo_table: Option<Uuid>,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Last modification timestamp
    pub updated: DateTime<Utc>,
}

impl Debug for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("alias", &self.alias)
            .field("fields", &self.fields.len())
            .field("is_virtual", &self.is_virtual)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl Table {
    /// Create a table mirrored from `origin` on an upstream connection
    pub fn synchronized(
        connection: Uuid,
        origin: impl Into<String>,
        table: impl Into<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        let now = Utc::now();
        Table {
            id: Uuid::new_v4(),
            table_origin: Some(origin.into()),
            table: table.into(),
            alias: String::new(),
            fields,
            connection: Some(connection),
            is_active: true,
            is_virtual: false,
            show_on_map: false,
            property_latitude: None,
            property_longitude: None,
            property_icon: None,
            relation: None,
            geo_table: None,
            created: now,
            updated: now,
        }
    }

    /// Create a virtual table defined by `relation`
    pub fn virtual_table(
        table: impl Into<String>,
        alias: impl Into<String>,
        relation: Uuid,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        let now = Utc::now();
        Table {
            id: Uuid::new_v4(),
            table_origin: None,
            table: table.into(),
            alias: alias.into(),
            fields,
            connection: None,
            is_active: true,
            is_virtual: true,
            show_on_map: false,
            property_latitude: None,
            property_longitude: None,
            property_icon: None,
            relation: Some(relation),
            geo_table: None,
            created: now,
            updated: now,
        }
    }

    /// Show rows on the map using the given coordinate fields
    pub fn with_geo(mut self, latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        self.show_on_map = true;
        self.property_latitude = Some(latitude.into());
        self.property_longitude = Some(longitude.into());
        self
    }

    /// Get a field descriptor by name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// Check whether the table declares a field
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.field == name)
    }

    /// Keys exposed by the table's details
    ///
    /// Virtual tables expose every descriptor under its output name, native
    /// tables expose the selected field names.
    pub fn output_fields(&self) -> Vec<String> {
        if self.is_virtual {
            self.fields.iter().map(|f| f.output_name().to_string()).collect()
        } else {
            self.fields
                .iter()
                .filter(|f| f.selected)
                .map(|f| f.field.clone())
                .collect()
        }
    }

    /// Record a modification
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_table() -> Table {
        Table::synchronized(
            Uuid::new_v4(),
            "clients",
            "shop_clients",
            vec![
                FieldDescriptor::new("id").with_type("int(11)", false).selected(),
                FieldDescriptor::new("name").with_type("varchar(100)", true).selected(),
                FieldDescriptor::new("secret").with_type("varchar(100)", true),
            ],
        )
    }

    #[test]
    fn test_output_fields_of_native_table() {
        let table = create_test_table();
        assert_eq!(table.output_fields(), vec!["id", "name"]);
        assert!(table.has_field("secret"));
        assert!(!table.field("id").unwrap().is_nullable());
        assert!(table.field("name").unwrap().is_nullable());
    }

    #[test]
    fn test_output_fields_of_virtual_table() {
        let one = Uuid::new_v4();
        let two = Uuid::new_v4();
        let table = Table::virtual_table(
            "virtual_a_b_view",
            "view",
            Uuid::new_v4(),
            vec![
                FieldDescriptor::of_table(one, "name", Some("client".to_string())),
                FieldDescriptor::of_table(two, "name", Some(String::new())),
            ],
        );

        assert_eq!(table.output_fields(), vec!["client", "name"]);
    }

    #[test]
    fn test_descriptor_deserializes_show_columns_shape() {
        let descriptor: FieldDescriptor = serde_json::from_value(serde_json::json!({
            "Field": "latitude",
            "Type": "double",
            "Null": "YES",
            "Key": "",
            "Default": null,
            "Extra": ""
        }))
        .unwrap();

        assert_eq!(descriptor.field, "latitude");
        assert_eq!(descriptor.field_type.as_deref(), Some("double"));
        assert!(!descriptor.selected);
        assert!(descriptor.is_nullable());
    }
}
