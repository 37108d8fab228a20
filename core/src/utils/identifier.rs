//! SQL identifier validation
//!
//! Table and field names are interpolated into generated SQL text without
//! quoting. Every name entering the catalog, and every name reaching the SQL
//! generator, must pass [`is_valid_identifier`].

use crate::error::{CoreError, Result};

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Check that `name` matches `[A-Za-z_][A-Za-z0-9_]*` and fits the length limit
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }

    name.len() <= MAX_IDENTIFIER_LENGTH && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reject `name` with an [`CoreError::InvalidIdentifier`] naming `kind`
pub fn ensure_identifier(kind: &'static str, name: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        })
    }
}

/// Lowercase `s` and collapse every run of non-alphanumeric characters into `_`
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_separator = false;

    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("customers", true)]
    #[case("_private", true)]
    #[case("shop_db_orders2", true)]
    #[case("2fast", false)]
    #[case("", false)]
    #[case("name; DROP TABLE x", false)]
    #[case("a.b", false)]
    #[case("MAX(id)", false)]
    fn test_is_valid_identifier(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_valid_identifier(name), expected);
    }

    #[test]
    fn test_identifier_length_limit() {
        assert!(is_valid_identifier(&"a".repeat(63)));
        assert!(!is_valid_identifier(&"a".repeat(64)));
    }

    #[test]
    fn test_ensure_identifier_names_kind() {
        let err = ensure_identifier("field", "bad name").unwrap_err();
        assert_eq!(err.to_string(), "Invalid identifier for field: \"bad name\"");
    }

    #[rstest]
    #[case("Clients by Zone", "clients_by_zone")]
    #[case("  --Route 66--  ", "route_66")]
    #[case("ÁREA", "rea")]
    #[case("", "")]
    fn test_slugify(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }
}
