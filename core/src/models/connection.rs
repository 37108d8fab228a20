//! Upstream connections
//!
//! A connection describes an external MySQL database, the tables discovered
//! on it, the subset selected for synchronization and how often the
//! synchronization runs.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::table::FieldDescriptor;

/// Kind of upstream database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DatabaseOrigin {
    /// MySQL or MariaDB
    #[default]
    #[serde(rename = "MySQL")]
    MySql,
}

impl DatabaseOrigin {
    /// Stored name of the origin
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseOrigin::MySql => "MySQL",
        }
    }
}

/// Unit of a synchronization interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalPeriod {
    /// Seconds
    #[default]
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl IntervalPeriod {
    /// Every period, shortest first
    pub const ALL: [IntervalPeriod; 4] = [
        IntervalPeriod::Seconds,
        IntervalPeriod::Minutes,
        IntervalPeriod::Hours,
        IntervalPeriod::Days,
    ];

    /// Stored name of the period
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalPeriod::Seconds => "seconds",
            IntervalPeriod::Minutes => "minutes",
            IntervalPeriod::Hours => "hours",
            IntervalPeriod::Days => "days",
        }
    }

    /// Human readable description
    pub fn description(&self) -> &'static str {
        match self {
            IntervalPeriod::Seconds => "Seconds",
            IntervalPeriod::Minutes => "Minutes",
            IntervalPeriod::Hours => "Hours",
            IntervalPeriod::Days => "Days",
        }
    }

    /// Length of one period in seconds
    pub fn seconds(&self) -> u64 {
        match self {
            IntervalPeriod::Seconds => 1,
            IntervalPeriod::Minutes => 60,
            IntervalPeriod::Hours => 60 * 60,
            IntervalPeriod::Days => 24 * 60 * 60,
        }
    }
}

/// A table discovered on the upstream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Upstream table name
    pub table: String,

    /// Upstream columns
    pub fields: Vec<FieldDescriptor>,
}

/// A table selected for synchronization and the fields to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSelection {
    /// Upstream table name
    pub table: String,

    /// Fields to fetch
    pub fields: Vec<String>,
}

/// An upstream database connection
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Stable identifier
    pub id: Uuid,

    /// Description
    pub description: String,

    /// Host name or address
    pub host: String,

    /// Port
    #[serde(default = "default_port")]
    pub database_port: u16,

    /// Kind of upstream database
    #[serde(default)]
    pub database_origin: DatabaseOrigin,

    /// Database name
    pub database_name: String,

    /// User name
    pub database_username: String,

    /// Password
    #[serde(default)]
    pub database_password: String,

    /// Tables discovered on the source
    #[serde(default)]
    pub info_to_sync: Vec<TableInfo>,

    /// Tables selected for synchronization
    #[serde(default)]
    pub info_to_sync_selected: Vec<SyncSelection>,

    /// Number of periods between synchronizations
    #[serde(default = "default_every_interval")]
    pub every_interval: u64,

    /// Unit of the synchronization interval
    #[serde(default)]
    pub period_interval: IntervalPeriod,

    /// Whether the connection is synchronized
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_port() -> u16 {
    3306
}

fn default_every_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("host", &self.host)
            .field("database_port", &self.database_port)
            .field("database_name", &self.database_name)
            .field("database_username", &self.database_username)
            .field("database_password", &"***")
            .field("selected", &self.info_to_sync_selected.len())
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl Connection {
    /// Time between two synchronizations; never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.every_interval.max(1) * self.period_interval.seconds())
    }

    /// Local name of the mirror of upstream table `table`
    pub fn local_table_name(&self, table: &str) -> String {
        format!("{}_{}", self.database_name, table)
    }

    /// Discovered columns of upstream table `table`
    pub fn discovered_fields(&self, table: &str) -> Option<&[FieldDescriptor]> {
        self.info_to_sync
            .iter()
            .find(|info| info.table == table)
            .map(|info| info.fields.as_slice())
    }

    /// Whether upstream table `table` is selected for synchronization
    pub fn is_selected(&self, table: &str) -> bool {
        self.info_to_sync_selected.iter().any(|s| s.table == table)
    }

    /// Display label, e.g. `erp MySQL (<id>)`
    pub fn label(&self) -> String {
        format!("{} {} ({})", self.description, self.database_origin.as_str(), self.id)
    }
}
