//! Catalog validation
//!
//! Every mutation of the catalog is checked here before it is applied. A
//! rejected mutation leaves the catalog untouched.

use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::{Connection, DataGroup, Line, Marker, Relation, Table};
use crate::utils::ensure_identifier;

/// Catalog validator
#[derive(Debug, Clone)]
pub struct CatalogValidator;

impl CatalogValidator {
    /// Validate a table on its own
    pub fn validate_table(table: &Table) -> Result<()> {
        ensure_identifier("table", &table.table)?;

        let mut names = HashSet::new();
        for descriptor in &table.fields {
            ensure_identifier("field", &descriptor.field)?;
            if let Some(alias) = descriptor.alias.as_deref().filter(|a| !a.is_empty()) {
                ensure_identifier("alias", alias)?;
            }

            // Native tables are keyed by field, virtual tables by output name
            let name = if table.is_virtual {
                descriptor.output_name()
            } else {
                descriptor.field.as_str()
            };
            if !names.insert(name) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate field {} in table {}",
                    name, table.table
                )));
            }
        }

        for property in [&table.property_latitude, &table.property_longitude, &table.property_icon]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
        {
            ensure_identifier("field", property)?;
        }

        if table.is_virtual && table.relation.is_none() {
            return Err(CoreError::ValidationError(format!(
                "Virtual table {} needs a defining relation",
                table.table
            )));
        }

        Ok(())
    }

    /// Validate a virtual table against its defining relation
    pub fn validate_virtual(table: &Table, relation: &Relation) -> Result<()> {
        if table.fields.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Virtual table {} has no fields",
                table.table
            )));
        }

        for descriptor in &table.fields {
            match descriptor.table {
                Some(owner) if relation.involves(owner) => {}
                _ => {
                    return Err(CoreError::ValidationError(format!(
                        "Field {} does not belong to a table of relation {}",
                        descriptor.field, relation.id
                    )))
                }
            }
        }

        if let Some(geo) = table.geo_table {
            if !relation.involves(geo) {
                return Err(CoreError::ValidationError(format!(
                    "Geo table {} is not part of relation {}",
                    geo, relation.id
                )));
            }
        }

        Ok(())
    }

    /// Validate a new relation against the existing ones
    pub fn validate_relation(relation: &Relation, tables: &[Table], relations: &[Relation]) -> Result<()> {
        for side in [relation.table_one, relation.table_two] {
            if !tables.iter().any(|t| t.id == side) {
                return Err(CoreError::TableNotFound(side));
            }
        }
        if relation.table_one == relation.table_two {
            return Err(CoreError::ValidationError(
                "A relation needs two different tables".to_string(),
            ));
        }

        ensure_identifier("field", &relation.property_table_one)?;
        ensure_identifier("field", &relation.property_table_two)?;

        if let Some(existing) = relations
            .iter()
            .find(|r| r.id != relation.id && r.links(relation.table_one, relation.table_two))
        {
            return Err(CoreError::DuplicateRelation { existing: existing.id });
        }

        Ok(())
    }

    /// Validate a data group against the other groups
    pub fn validate_data_group(group: &DataGroup, tables: &[Table], groups: &[DataGroup]) -> Result<()> {
        if !tables.iter().any(|t| t.id == group.table) {
            return Err(CoreError::TableNotFound(group.table));
        }
        if group.description.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "A data group needs a description".to_string(),
            ));
        }
        if groups
            .iter()
            .any(|g| g.id != group.id && g.description == group.description)
        {
            return Err(CoreError::ValidationError(format!(
                "Data group {} already exists",
                group.description
            )));
        }
        for property in &group.properties {
            ensure_identifier("field", property)?;
        }

        let conflicts: Vec<_> = groups.iter().flat_map(|g| group.conflicts_with(g)).collect();
        if !conflicts.is_empty() {
            return Err(CoreError::DataGroupOverlap {
                table: group.table,
                conflicts,
            });
        }

        Ok(())
    }

    /// Validate a marker
    pub fn validate_marker(marker: &Marker, tables: &[Table]) -> Result<()> {
        let known = |id: Uuid| tables.iter().any(|t| t.id == id);

        for id in std::iter::once(marker.table).chain(marker.tables.iter().copied()) {
            if !known(id) {
                return Err(CoreError::TableNotFound(id));
            }
        }
        for field in marker.field_refs() {
            if !known(field.table) {
                return Err(CoreError::TableNotFound(field.table));
            }
            ensure_identifier("field", &field.field)?;
        }

        Ok(())
    }

    /// Validate a line
    pub fn validate_line(line: &Line, tables: &[Table]) -> Result<()> {
        for field in [&line.origin_field, &line.destination_field] {
            if !tables.iter().any(|t| t.id == field.table) {
                return Err(CoreError::TableNotFound(field.table));
            }
            ensure_identifier("field", &field.field)?;
        }

        Ok(())
    }

    /// Validate a connection
    pub fn validate_connection(connection: &Connection) -> Result<()> {
        if connection.host.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "A connection needs a host".to_string(),
            ));
        }
        ensure_identifier("database", &connection.database_name)?;

        for selection in &connection.info_to_sync_selected {
            ensure_identifier("table", &connection.local_table_name(&selection.table))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldDescriptor;

    // Helper to create a test table with an id and a name field
    fn create_test_table(name: &str) -> Table {
        Table::synchronized(
            Uuid::new_v4(),
            name,
            format!("shop_{}", name),
            vec![FieldDescriptor::new("id"), FieldDescriptor::new("name")],
        )
    }

    #[test]
    fn test_duplicate_output_names_rejected() {
        let relation = Uuid::new_v4();
        let table = Table::virtual_table(
            "virtual_a_b_view",
            "view",
            relation,
            vec![
                FieldDescriptor::of_table(Uuid::new_v4(), "name", None),
                FieldDescriptor::of_table(Uuid::new_v4(), "title", Some("name".to_string())),
            ],
        );

        let err = CatalogValidator::validate_table(&table).unwrap_err();
        assert!(err.to_string().contains("Duplicate field name"));
    }

    #[test]
    fn test_relation_rules() {
        let a = create_test_table("clients");
        let b = create_test_table("orders");
        let tables = vec![a.clone(), b.clone()];
        let existing = Relation::new(a.id, "id", b.id, "client_id");

        let reversed = Relation::new(b.id, "client_id", a.id, "id");
        match CatalogValidator::validate_relation(&reversed, &tables, &[existing.clone()]) {
            Err(CoreError::DuplicateRelation { existing: id }) => assert_eq!(id, existing.id),
            other => panic!("expected a duplicate relation, got {:?}", other),
        }

        let dangling = Relation::new(a.id, "id", Uuid::new_v4(), "client_id");
        assert!(matches!(
            CatalogValidator::validate_relation(&dangling, &tables, &[]),
            Err(CoreError::TableNotFound(_))
        ));

        let bad_key = Relation::new(a.id, "id", b.id, "client id");
        assert!(CatalogValidator::validate_relation(&bad_key, &tables, &[]).is_err());
    }

    #[test]
    fn test_data_group_overlap_enumerates_fields() {
        let table = create_test_table("clients");
        let tables = vec![table.clone()];
        let public = DataGroup::new("public", table.id, vec!["name".into(), "phone".into(), "email".into()]);
        let sales = DataGroup::new("sales", table.id, vec!["email".into(), "phone".into(), "credit".into()]);

        let err = CatalogValidator::validate_data_group(&sales, &tables, &[public]).unwrap_err();

        match &err {
            CoreError::DataGroupOverlap { conflicts, .. } => {
                let names: Vec<_> = conflicts.iter().map(|c| c.property.as_str()).collect();
                assert_eq!(names, vec!["email", "phone"]);
            }
            other => panic!("expected an overlap, got {:?}", other),
        }
        assert!(err.to_string().ends_with("email, phone"));
    }

    #[test]
    fn test_data_group_description_is_unique() {
        let table = create_test_table("clients");
        let tables = vec![table.clone()];
        let first = DataGroup::new("public", table.id, vec!["name".into()]);
        let second = DataGroup::new("public", table.id, vec!["id".into()]);

        assert!(CatalogValidator::validate_data_group(&second, &tables, &[first]).is_err());
    }
}
