//! SQL text generation
//!
//! Renders the `SELECT` statement equivalent to a virtual table definition,
//! used to preview the definition and to materialize it as a physical table
//! in the destination store.
//!
//! Identifiers are interpolated without quoting. Every table and field name
//! is checked with [`crate::utils::is_valid_identifier`] here, on top of the
//! checks made when it entered the catalog.

pub mod ddl;

pub use ddl::{
    columns_from_descriptors, mysql_to_postgres_type, quote_literal, ColumnSpec, DdlOperation,
    DdlStatement, TableDefinition,
};

use std::collections::HashMap;
use std::fmt::Write as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::models::{FieldDescriptor, Relation};
use crate::utils::ensure_identifier;

/// Lookup of local table names by table identifier
pub trait TableResolver {
    /// Local name of table `id`
    fn table_name(&self, id: Uuid) -> Option<&str>;
}

impl TableResolver for HashMap<Uuid, String> {
    fn table_name(&self, id: Uuid) -> Option<&str> {
        self.get(&id).map(String::as_str)
    }
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectField {
    /// Table owning the field
    pub table: Uuid,

    /// Source field name
    #[serde(rename = "Field")]
    pub field: String,

    /// Output alias
    #[serde(default)]
    pub alias: Option<String>,
}

impl SelectField {
    /// Select entry of a virtual table descriptor, if it names its table
    pub fn from_descriptor(descriptor: &FieldDescriptor) -> Option<Self> {
        Some(SelectField {
            table: descriptor.table?,
            field: descriptor.field.clone(),
            alias: descriptor.alias.clone().filter(|a| !a.is_empty()),
        })
    }
}

/// Equality predicate between two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPredicate {
    /// First table
    pub table_one: Uuid,

    /// Field of the first table
    pub field_one: String,

    /// Second table
    pub table_two: Uuid,

    /// Field of the second table
    pub field_two: String,
}

impl From<&Relation> for JoinPredicate {
    fn from(relation: &Relation) -> Self {
        JoinPredicate {
            table_one: relation.table_one,
            field_one: relation.property_table_one.clone(),
            table_two: relation.table_two,
            field_two: relation.property_table_two.clone(),
        }
    }
}

/// Everything needed to render a virtual table as SQL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDefinition {
    /// Select list, in output order
    #[serde(default)]
    pub fields: Vec<SelectField>,

    /// Join predicates
    #[serde(default)]
    pub relations: Vec<JoinPredicate>,

    /// Tables added to `FROM` without a predicate
    #[serde(default)]
    pub tables: Vec<Uuid>,

    /// Row limit
    #[serde(default)]
    pub limit: Option<usize>,
}

impl VirtualDefinition {
    /// Set the row limit
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// Result of SQL generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GeneratedSql {
    /// A complete statement
    Statement {
        /// SQL text
        sql: String,
    },

    /// There is nothing to select
    NoSql,

    /// Generation failed
    Failed {
        /// SQL text built before the failure
        sql: String,
        /// What went wrong
        error: String,
    },
}

impl GeneratedSql {
    /// The complete statement, if any
    pub fn statement(&self) -> Option<&str> {
        match self {
            GeneratedSql::Statement { sql } => Some(sql),
            _ => None,
        }
    }

    /// The statement, or an error for "no SQL" and failures
    pub fn into_result(self) -> Result<String> {
        match self {
            GeneratedSql::Statement { sql } => Ok(sql),
            GeneratedSql::NoSql => Err(CoreError::ValidationError("No fields to select".to_string())),
            GeneratedSql::Failed { sql, error } => Err(CoreError::ValidationError(format!(
                "{} (generated so far: {:?})",
                error, sql
            ))),
        }
    }
}

fn resolve<'r, R: TableResolver + ?Sized>(resolver: &'r R, id: Uuid) -> Result<&'r str> {
    let name = resolver.table_name(id).ok_or(CoreError::TableNotFound(id))?;
    ensure_identifier("table", name)?;
    Ok(name)
}

fn push_table<'a>(from: &mut Vec<&'a str>, name: &'a str) {
    if !from.contains(&name) {
        from.push(name);
    }
}

/// Render `definition` as `SELECT <fields> FROM <tables> [WHERE ...] [LIMIT n]`
///
/// `FROM` lists the tables of the predicates, then the flat tables, then the
/// tables of the select list, each once, in order of first appearance.
pub fn generate_sql<R>(definition: &VirtualDefinition, resolver: &R) -> GeneratedSql
where
    R: TableResolver + ?Sized,
{
    if definition.fields.is_empty() {
        return GeneratedSql::NoSql;
    }

    let mut sql = String::new();
    match build(definition, resolver, &mut sql) {
        Ok(()) => GeneratedSql::Statement { sql },
        Err(e) => GeneratedSql::Failed {
            sql,
            error: e.to_string(),
        },
    }
}

fn build<R>(definition: &VirtualDefinition, resolver: &R, sql: &mut String) -> Result<()>
where
    R: TableResolver + ?Sized,
{
    let mut field_tables = Vec::new();

    sql.push_str("SELECT ");
    for (i, entry) in definition.fields.iter().enumerate() {
        let table = resolve(resolver, entry.table)?;
        ensure_identifier("field", &entry.field)?;
        if i > 0 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "{}.{}", table, entry.field);
        if let Some(alias) = entry.alias.as_deref().filter(|a| !a.is_empty()) {
            ensure_identifier("alias", alias)?;
            let _ = write!(sql, " AS {}", alias);
        }
        field_tables.push(table);
    }

    let mut from = Vec::new();
    let mut predicates = Vec::new();
    for predicate in &definition.relations {
        let one = resolve(resolver, predicate.table_one)?;
        let two = resolve(resolver, predicate.table_two)?;
        ensure_identifier("field", &predicate.field_one)?;
        ensure_identifier("field", &predicate.field_two)?;
        push_table(&mut from, one);
        push_table(&mut from, two);
        predicates.push(format!(
            "{}.{} = {}.{}",
            one, predicate.field_one, two, predicate.field_two
        ));
    }
    for id in &definition.tables {
        push_table(&mut from, resolve(resolver, *id)?);
    }
    for table in field_tables {
        push_table(&mut from, table);
    }

    let _ = write!(sql, " FROM {}", from.join(", "));
    if !predicates.is_empty() {
        let _ = write!(sql, " WHERE {}", predicates.join(" AND "));
    }
    if let Some(limit) = definition.limit {
        let _ = write!(sql, " LIMIT {}", limit);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    fn field(table: Uuid, name: &str, alias: Option<&str>) -> SelectField {
        SelectField {
            table,
            field: name.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    fn assert_parses(sql: &str) {
        Parser::parse_sql(&PostgreSqlDialect {}, sql).unwrap();
    }

    #[test]
    fn test_single_field_without_relations() {
        let t = Uuid::new_v4();
        let resolver = HashMap::from([(t, "T".to_string())]);
        let definition = VirtualDefinition {
            fields: vec![field(t, "x", Some("x1"))],
            ..Default::default()
        };

        let generated = generate_sql(&definition, &resolver);

        assert_eq!(generated.statement(), Some("SELECT T.x AS x1 FROM T"));
    }

    #[test]
    fn test_relation_becomes_where_clause() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let resolver = HashMap::from([(a, "A".to_string()), (b, "B".to_string())]);
        let definition = VirtualDefinition {
            fields: vec![field(b, "total", None), field(a, "name", Some("client"))],
            relations: vec![JoinPredicate {
                table_one: a,
                field_one: "id".to_string(),
                table_two: b,
                field_two: "a_id".to_string(),
            }],
            tables: vec![b],
            limit: Some(100),
        };

        let sql = generate_sql(&definition, &resolver).into_result().unwrap();

        assert_eq!(
            sql,
            "SELECT B.total, A.name AS client FROM A, B WHERE A.id = B.a_id LIMIT 100"
        );
        assert_parses(&sql);
    }

    #[test]
    fn test_flat_and_field_tables_join_from() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let resolver = HashMap::from([
            (a, "A".to_string()),
            (b, "B".to_string()),
            (c, "C".to_string()),
        ]);
        let definition = VirtualDefinition {
            fields: vec![field(c, "code", None), field(a, "id", None)],
            tables: vec![b, a],
            ..Default::default()
        };

        let sql = generate_sql(&definition, &resolver).into_result().unwrap();

        assert_eq!(sql, "SELECT C.code, A.id FROM B, A, C");
        assert_parses(&sql);
    }

    #[test]
    fn test_no_fields_is_no_sql() {
        let resolver: HashMap<Uuid, String> = HashMap::new();
        let definition = VirtualDefinition {
            tables: vec![Uuid::new_v4()],
            ..Default::default()
        };

        assert_eq!(generate_sql(&definition, &resolver), GeneratedSql::NoSql);
        assert!(GeneratedSql::NoSql.into_result().is_err());
    }

    #[test]
    fn test_unknown_table_keeps_partial_sql() {
        let (a, missing) = (Uuid::new_v4(), Uuid::new_v4());
        let resolver = HashMap::from([(a, "A".to_string())]);
        let definition = VirtualDefinition {
            fields: vec![field(a, "id", None), field(missing, "name", None)],
            ..Default::default()
        };

        match generate_sql(&definition, &resolver) {
            GeneratedSql::Failed { sql, error } => {
                assert_eq!(sql, "SELECT A.id");
                assert!(error.contains(&missing.to_string()));
            }
            other => panic!("expected a failure, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_identifier_fails() {
        let a = Uuid::new_v4();
        let resolver = HashMap::from([(a, "A".to_string())]);
        let definition = VirtualDefinition {
            fields: vec![field(a, "id", Some("x; DROP TABLE A"))],
            ..Default::default()
        };

        let generated = generate_sql(&definition, &resolver);

        assert!(matches!(generated, GeneratedSql::Failed { .. }));
    }

    #[test]
    fn test_generated_sql_serializes_with_status() {
        let value = serde_json::to_value(GeneratedSql::NoSql).unwrap();
        assert_eq!(value, serde_json::json!({"status": "no_sql"}));
    }
}
