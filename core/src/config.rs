//! Configuration for the core crate
//!
//! Behaviour knobs of the join engine and the SQL generator. The struct is
//! passed explicitly to the routines that need it; there is no global state.

use serde::{Deserialize, Serialize};

/// Suffix appended to colliding keys of the non-primary join side
pub const DEFAULT_COLLISION_SUFFIX: &str = "1";

/// Core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Suffix used to rename keys of the non-primary side on collision
    pub collision_suffix: String,

    /// Row limit applied to virtual table previews
    pub preview_limit: Option<usize>,

    /// Prefix of the physical table created for a virtual table
    pub virtual_table_prefix: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            collision_suffix: DEFAULT_COLLISION_SUFFIX.to_string(),
            preview_limit: Some(100),
            virtual_table_prefix: "virtual".to_string(),
        }
    }
}

impl CoreConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: CoreConfig = serde_json::from_str(r#"{"preview_limit": 10}"#).unwrap();

        assert_eq!(config.preview_limit, Some(10));
        assert_eq!(config.collision_suffix, "1");
        assert_eq!(config.virtual_table_prefix, "virtual");
    }
}
