//! Data Definition Language (DDL) statements for the destination store
//!
//! Builds the statements that mirror synchronized tables and materialize
//! virtual tables in PostgreSQL: `DROP TABLE IF EXISTS`, `CREATE TABLE` from
//! a column list, `CREATE TABLE ... AS SELECT` and bulk `INSERT`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Document, FieldDescriptor};
use crate::utils::ensure_identifier;

/// Prefix of aggregate columns reported by some upstream views; they end the column list
const AGGREGATE_PREFIX: &str = "MAX(";

/// Map a MySQL column type to its PostgreSQL equivalent
pub fn mysql_to_postgres_type(mysql_type: &str) -> String {
    let t = mysql_type.trim();
    if t.starts_with("int") || t.starts_with("tinyint") {
        "integer".to_string()
    } else if t.starts_with("bigint") {
        "bigint".to_string()
    } else if t.starts_with("date") {
        // covers datetime, kept as text to survive zero dates
        "varchar(30)".to_string()
    } else if t.starts_with("float") || t.starts_with("double") {
        "double precision".to_string()
    } else if let Some(rest) = t.strip_prefix("varbinary").or_else(|| t.strip_prefix("binary")) {
        if rest == "(0)" {
            "bit".to_string()
        } else {
            format!("bit{}", rest)
        }
    } else {
        t.to_string()
    }
}

/// One column of a destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,

    /// PostgreSQL type
    pub sql_type: String,

    /// Whether the column accepts nulls
    pub nullable: bool,
}

/// Columns of the mirror of an upstream table
///
/// Descriptors without a type are mapped to `text`. The list ends at the
/// first aggregate column.
pub fn columns_from_descriptors(fields: &[FieldDescriptor]) -> Vec<ColumnSpec> {
    fields
        .iter()
        .take_while(|f| !f.field.starts_with(AGGREGATE_PREFIX))
        .map(|f| ColumnSpec {
            name: f.field.clone(),
            sql_type: f
                .field_type
                .as_deref()
                .map(mysql_to_postgres_type)
                .unwrap_or_else(|| "text".to_string()),
            nullable: f.is_nullable(),
        })
        .collect()
}

/// Definition of a destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Name of the table
    pub name: String,

    /// Columns in the table
    pub columns: Vec<ColumnSpec>,
}

/// DDL operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdlOperation {
    /// Drop a table if it exists
    DropTable(String),

    /// Create a table from a column list
    CreateTable(TableDefinition),

    /// Create a table from the result of a query
    CreateTableAs {
        /// Name of the table
        name: String,
        /// Defining `SELECT`
        select: String,
    },

    /// Insert rows into a table
    Insert {
        /// Name of the table
        table: String,
        /// Number of inserted rows
        rows: usize,
    },
}

/// DDL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlStatement {
    /// DDL operation
    pub ddl: DdlOperation,

    /// SQL statement
    pub sql: String,
}

impl DdlStatement {
    /// `DROP TABLE IF EXISTS <name>`
    pub fn drop_table(name: &str) -> Result<Self> {
        ensure_identifier("table", name)?;

        Ok(DdlStatement {
            ddl: DdlOperation::DropTable(name.to_string()),
            sql: format!("DROP TABLE IF EXISTS {}", name),
        })
    }

    /// `CREATE TABLE <name> (<column> <type> [NOT NULL], ...)`
    pub fn create_table(table: TableDefinition) -> Result<Self> {
        ensure_identifier("table", &table.name)?;

        let mut columns = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            ensure_identifier("field", &column.name)?;
            let not_null = if column.nullable { "" } else { " NOT NULL" };
            columns.push(format!("{} {}{}", column.name, column.sql_type, not_null));
        }

        Ok(DdlStatement {
            sql: format!("CREATE TABLE {} ({})", table.name, columns.join(", ")),
            ddl: DdlOperation::CreateTable(table),
        })
    }

    /// `CREATE TABLE <name> AS <select>`
    pub fn create_table_as(name: &str, select: &str) -> Result<Self> {
        ensure_identifier("table", name)?;

        Ok(DdlStatement {
            ddl: DdlOperation::CreateTableAs {
                name: name.to_string(),
                select: select.to_string(),
            },
            sql: format!("CREATE TABLE {} AS {}", name, select),
        })
    }

    /// Multi-row `INSERT` of `rows` restricted to `columns`; `None` when there is nothing to insert
    pub fn insert_rows(table: &str, columns: &[String], rows: &[Document]) -> Result<Option<Self>> {
        ensure_identifier("table", table)?;
        for column in columns {
            ensure_identifier("field", column)?;
        }
        if rows.is_empty() || columns.is_empty() {
            return Ok(None);
        }

        let values: Vec<String> = rows
            .iter()
            .map(|row| {
                let literals: Vec<String> = columns
                    .iter()
                    .map(|c| quote_literal(row.get(c).unwrap_or(&Value::Null)))
                    .collect();
                format!("({})", literals.join(", "))
            })
            .collect();

        Ok(Some(DdlStatement {
            ddl: DdlOperation::Insert {
                table: table.to_string(),
                rows: rows.len(),
            },
            sql: format!(
                "INSERT INTO {} ({}) VALUES {}",
                table,
                columns.join(", "),
                values.join(", ")
            ),
        }))
    }
}

/// Render a row value as a SQL literal
///
/// Null becomes `NULL`, the MySQL zero date becomes an empty string, and
/// everything else is quoted with embedded quotes doubled.
pub fn quote_literal(value: &Value) -> String {
    let text = match value {
        Value::Null => return "NULL".to_string(),
        Value::String(s) if s == "0000-00-00" => return "''".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };

    format!("'{}'", text.replace('\'', "''"))
}
