//! Case-insensitive row search

use serde_json::Value;

use crate::models::Document;

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether any of `fields` of `row` contains `term`, ignoring case
///
/// An empty term matches every row.
pub fn matches(row: &Document, fields: &[String], term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }

    fields
        .iter()
        .filter_map(|f| row.get(f).and_then(text_of))
        .any(|text| text.contains(&term))
}

/// Keep the rows matching `term` over `fields`
pub fn filter_rows(rows: Vec<Document>, fields: &[String], term: Option<&str>) -> Vec<Document> {
    match term {
        Some(term) => rows.into_iter().filter(|row| matches(row, fields, term)).collect(),
        None => rows,
    }
}
