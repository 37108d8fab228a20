//! Upstream sources
//!
//! An upstream source is the external database tables are mirrored from.
//! The MySQL implementation keeps a connection pool per upstream
//! connection; every operation checks a connection out and returns it to the
//! pool when done, whatever the outcome.

use async_trait::async_trait;
use log::debug;
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool, Row as MySqlRow, Value as MySqlValue};
use serde_json::{json, Value};
use tablemap_core::models::{Connection, Document, FieldDescriptor};
use tablemap_core::utils::ensure_identifier;

use crate::error::{to_upstream_error, Result};

/// Row-oriented access to an upstream database
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Names of the tables of the database
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table`, as reported by `SHOW COLUMNS`
    async fn describe_table(&self, table: &str) -> Result<Vec<FieldDescriptor>>;

    /// Every row of `table`, restricted to `fields` (every column when empty)
    async fn fetch_rows(&self, table: &str, fields: &[String]) -> Result<Vec<Document>>;

    /// Release every resource held by the source
    async fn close(&self) -> Result<()>;
}

/// Opens the upstream source of a connection
#[cfg_attr(test, mockall::automock)]
pub trait SourceFactory: Send + Sync {
    /// Source of `connection`
    fn open(&self, connection: &Connection) -> Result<Box<dyn UpstreamSource>>;
}

/// Opens [`MySqlSource`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlSourceFactory;

impl SourceFactory for MySqlSourceFactory {
    fn open(&self, connection: &Connection) -> Result<Box<dyn UpstreamSource>> {
        Ok(Box::new(MySqlSource::new(connection)))
    }
}

/// MySQL upstream source
#[derive(Debug)]
pub struct MySqlSource {
    pool: Pool,
}

impl MySqlSource {
    /// Create a source for `connection`; nothing is opened until first use
    pub fn new(connection: &Connection) -> Self {
        let opts = OptsBuilder::default()
            .ip_or_hostname(connection.host.clone())
            .tcp_port(connection.database_port)
            .user(Some(connection.database_username.clone()))
            .pass(Some(connection.database_password.clone()))
            .db_name(Some(connection.database_name.clone()));

        Self {
            pool: Pool::new(opts),
        }
    }
}

impl From<Pool> for MySqlSource {
    fn from(pool: Pool) -> Self {
        Self { pool }
    }
}

/// `SELECT` fetching `fields` of `table`
pub fn select_rows_sql(table: &str, fields: &[String]) -> Result<String> {
    ensure_identifier("table", table)?;
    for field in fields {
        ensure_identifier("field", field)?;
    }

    let columns = if fields.is_empty() {
        "*".to_string()
    } else {
        fields.join(", ")
    };
    Ok(format!("SELECT {} FROM {}", columns, table))
}

/// Convert a MySQL value into a JSON value
///
/// Text and blobs become strings, dates and times their MySQL text form.
pub fn mysql_to_json(value: &MySqlValue) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        MySqlValue::Int(i) => json!(i),
        MySqlValue::UInt(u) => json!(u),
        MySqlValue::Float(f) => json!(f64::from(*f)),
        MySqlValue::Double(d) => json!(d),
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            let date = format!("{:04}-{:02}-{:02}", year, month, day);
            if (*hour, *minute, *second, *micros) == (0, 0, 0, 0) {
                Value::String(date)
            } else if *micros == 0 {
                Value::String(format!("{} {:02}:{:02}:{:02}", date, hour, minute, second))
            } else {
                Value::String(format!(
                    "{} {:02}:{:02}:{:02}.{:06}",
                    date, hour, minute, second, micros
                ))
            }
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, _) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            Value::String(format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds))
        }
    }
}

fn row_to_document(row: &MySqlRow) -> Document {
    let mut document = Document::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        let value = row.as_ref(i).map(mysql_to_json).unwrap_or(Value::Null);
        document.insert(column.name_str().into_owned(), value);
    }
    document
}

#[async_trait]
impl UpstreamSource for MySqlSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.get_conn().await.map_err(to_upstream_error)?;
        conn.query::<String, _>("SHOW TABLES")
            .await
            .map_err(to_upstream_error)
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<FieldDescriptor>> {
        ensure_identifier("table", table)?;
        let mut conn = self.pool.get_conn().await.map_err(to_upstream_error)?;
        let rows: Vec<MySqlRow> = conn
            .query(format!("SHOW COLUMNS FROM {}", table))
            .await
            .map_err(to_upstream_error)?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let text = |column: &str| row.get_opt::<String, _>(column).and_then(|v| v.ok());
                let field = text("Field")?;
                let nullable = text("Null").as_deref() == Some("YES");
                Some(FieldDescriptor::new(field).with_type(text("Type").unwrap_or_default(), nullable))
            })
            .collect())
    }

    async fn fetch_rows(&self, table: &str, fields: &[String]) -> Result<Vec<Document>> {
        let sql = select_rows_sql(table, fields)?;
        let mut conn = self.pool.get_conn().await.map_err(to_upstream_error)?;
        // The binary protocol keeps numbers typed
        let rows: Vec<MySqlRow> = conn.exec(sql, ()).await.map_err(to_upstream_error)?;

        debug!("Fetched {} rows of {}", rows.len(), table);
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn close(&self) -> Result<()> {
        self.pool.clone().disconnect().await.map_err(to_upstream_error)
    }
}
