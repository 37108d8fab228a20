//! Join engine
//!
//! Materializes the rows of a virtual table from the snapshots of the two
//! tables of its defining relation.
//!
//! The join is an inner equi-join that takes **at most one** row of the
//! second table per row of the first one: the first row of `rows_two` whose
//! key equals the key of the left row wins, later candidates are ignored.
//! Consumers rely on getting at most one related row per primary row, so
//! this is kept as is rather than generalized into a relational join.
//!
//! The second side is indexed by join value, keeping only its first row per
//! value, which gives first-match-wins in O(n + m). Input rows are never
//! mutated; every output row is a new document.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Document, FieldDescriptor, Relation};

/// Key under which merged rows carry the identifier of their primary side
pub const TABLE_TAG: &str = "table";

/// Which side of the relation owns the merged row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimarySide {
    /// The relation's first table
    One,
    /// The relation's second table
    Two,
}

/// Parameters of one join
#[derive(Debug, Clone)]
pub struct JoinSpec<'a> {
    /// First table
    pub table_one: Uuid,
    /// Join key on the first table
    pub key_one: &'a str,
    /// Second table
    pub table_two: Uuid,
    /// Join key on the second table
    pub key_two: &'a str,
    /// Side whose identifier tags the merged rows and whose keys win collisions
    pub primary: PrimarySide,
    /// Suffix appended to colliding keys of the other side
    pub collision_suffix: &'a str,
}

impl<'a> JoinSpec<'a> {
    /// Join along `relation`, using `geo_table` as primary side
    ///
    /// A `geo_table` that is not part of the relation falls back to the first table.
    pub fn from_relation(relation: &'a Relation, geo_table: Option<Uuid>, collision_suffix: &'a str) -> Self {
        let primary = match geo_table {
            Some(table) if table == relation.table_two && table != relation.table_one => PrimarySide::Two,
            _ => PrimarySide::One,
        };

        JoinSpec {
            table_one: relation.table_one,
            key_one: &relation.property_table_one,
            table_two: relation.table_two,
            key_two: &relation.property_table_two,
            primary,
            collision_suffix,
        }
    }

    /// Identifier of the primary side
    pub fn primary_table(&self) -> Uuid {
        match self.primary {
            PrimarySide::One => self.table_one,
            PrimarySide::Two => self.table_two,
        }
    }
}

/// Hashable form of a scalar join value
///
/// Null, missing, array and object values have no key and never match.
/// Integral numbers compare equal whatever their JSON representation, so
/// `1` matches `1.0`; strings never match numbers. Booleans only match
/// booleans, so `true` does not match `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    /// Boolean
    Bool(bool),
    /// Integral number that fits in `i64`
    Int(i64),
    /// Integral number above `i64::MAX`
    UInt(u64),
    /// Non-integral number, by bit pattern
    Float(u64),
    /// String
    Text(String),
}

impl JoinKey {
    /// Key of a row value, if it can take part in a join
    pub fn from_value(value: Option<&Value>) -> Option<JoinKey> {
        match value? {
            Value::Bool(b) => Some(JoinKey::Bool(*b)),
            Value::String(s) => Some(JoinKey::Text(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(JoinKey::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(JoinKey::UInt(u))
                } else {
                    let f = n.as_f64()?;
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                        Some(JoinKey::Int(f as i64))
                    } else {
                        Some(JoinKey::Float(f.to_bits()))
                    }
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

fn index_first_rows<'a>(rows: &'a [Document], key: &str) -> HashMap<JoinKey, &'a Document> {
    let mut index = HashMap::with_capacity(rows.len());
    for row in rows {
        if let Some(k) = JoinKey::from_value(row.get(key)) {
            index.entry(k).or_insert(row);
        }
    }
    index
}

/// Lazy sequence of matched `(row_one, row_two)` pairs
pub struct JoinPairs<'a> {
    left: std::slice::Iter<'a, Document>,
    key_one: &'a str,
    index: HashMap<JoinKey, &'a Document>,
}

impl<'a> Iterator for JoinPairs<'a> {
    type Item = (&'a Document, &'a Document);

    fn next(&mut self) -> Option<Self::Item> {
        for r1 in self.left.by_ref() {
            let Some(key) = JoinKey::from_value(r1.get(self.key_one)) else {
                continue;
            };
            if let Some(r2) = self.index.get(&key) {
                return Some((r1, *r2));
            }
        }
        None
    }
}

/// Match every row of `rows_one` with the first row of `rows_two` sharing its key
pub fn join_pairs<'a>(
    key_one: &'a str,
    key_two: &str,
    rows_one: &'a [Document],
    rows_two: &'a [Document],
) -> JoinPairs<'a> {
    JoinPairs {
        left: rows_one.iter(),
        key_one,
        index: index_first_rows(rows_two, key_two),
    }
}

/// Lazy sequence of merged rows
pub struct Join<'a> {
    pairs: JoinPairs<'a>,
    primary: PrimarySide,
    tag: Value,
    collision_suffix: &'a str,
}

impl<'a> Iterator for Join<'a> {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        let (r1, r2) = self.pairs.next()?;
        let (primary, other) = match self.primary {
            PrimarySide::One => (r1, r2),
            PrimarySide::Two => (r2, r1),
        };
        Some(merge(primary, other, &self.tag, self.collision_suffix))
    }
}

/// Join `rows_one` and `rows_two` and merge every matched pair
///
/// Merged rows hold every key of the primary side unchanged, every key of
/// the other side, renamed with the collision suffix when the primary side
/// (or the tag) already uses it, and [`TABLE_TAG`] set to the primary
/// side's identifier.
pub fn join<'a>(spec: &JoinSpec<'a>, rows_one: &'a [Document], rows_two: &'a [Document]) -> Join<'a> {
    Join {
        pairs: join_pairs(spec.key_one, spec.key_two, rows_one, rows_two),
        primary: spec.primary,
        tag: Value::String(spec.primary_table().to_string()),
        collision_suffix: spec.collision_suffix,
    }
}

fn merge(primary: &Document, other: &Document, tag: &Value, suffix: &str) -> Document {
    let mut merged = primary.clone();
    merged.insert(TABLE_TAG.to_string(), tag.clone());

    let mut colliding = Vec::new();
    for (key, value) in other {
        if merged.contains_key(key) {
            colliding.push((key, value));
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    for (key, value) in colliding {
        let mut renamed = format!("{}{}", key, suffix);
        while merged.contains_key(&renamed) {
            renamed.push_str(suffix);
        }
        merged.insert(renamed, value.clone());
    }

    merged
}

/// Build the rows of a virtual table
///
/// Every matched pair becomes one row keyed by the descriptors' output
/// names, each value taken from the descriptor's owning side. Descriptors
/// owned by neither side are skipped. Rows are tagged with the primary side.
pub fn virtual_rows(
    spec: &JoinSpec<'_>,
    fields: &[FieldDescriptor],
    rows_one: &[Document],
    rows_two: &[Document],
) -> Vec<Document> {
    let tag = Value::String(spec.primary_table().to_string());

    join_pairs(spec.key_one, spec.key_two, rows_one, rows_two)
        .map(|(r1, r2)| {
            let mut row = Document::new();
            for descriptor in fields {
                let side = match descriptor.table {
                    Some(t) if t == spec.table_one => r1,
                    Some(t) if t == spec.table_two => r2,
                    _ => continue,
                };
                let value = side.get(&descriptor.field).cloned().unwrap_or(Value::Null);
                row.insert(descriptor.output_name().to_string(), value);
            }
            row.insert(TABLE_TAG.to_string(), tag.clone());
            row
        })
        .collect()
}

/// Rows of a related table shown inline in a display join
#[derive(Debug, Clone)]
pub struct RelatedRows<'a> {
    /// Key under which the matches are nested, the related table's local name
    pub name: &'a str,
    /// Join key on the displayed table
    pub own_key: &'a str,
    /// Join key on the related table
    pub other_key: &'a str,
    /// Snapshot of the related table
    pub rows: &'a [Document],
}

/// Nest, under each related table's name, every related row matching each row
///
/// Unlike [`join`], display joins keep every match. A row without a join
/// value gets an empty list.
pub fn nest_related(rows: Vec<Document>, related: &[RelatedRows<'_>]) -> Vec<Document> {
    let indexes: Vec<HashMap<JoinKey, Vec<&Document>>> = related
        .iter()
        .map(|r| {
            let mut index: HashMap<JoinKey, Vec<&Document>> = HashMap::new();
            for row in r.rows {
                if let Some(k) = JoinKey::from_value(row.get(r.other_key)) {
                    index.entry(k).or_default().push(row);
                }
            }
            index
        })
        .collect();

    rows.into_iter()
        .map(|mut row| {
            for (r, index) in related.iter().zip(&indexes) {
                let matches = JoinKey::from_value(row.get(r.own_key))
                    .and_then(|k| index.get(&k))
                    .map(|found| found.iter().map(|d| Value::Object((*d).clone())).collect())
                    .unwrap_or_default();
                row.insert(r.name.to_string(), Value::Array(matches));
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::doc;
    use proptest::prelude::*;
    use serde_json::json;

    fn spec<'a>(one: Uuid, two: Uuid, primary: PrimarySide) -> JoinSpec<'a> {
        JoinSpec {
            table_one: one,
            key_one: "id",
            table_two: two,
            key_two: "client_id",
            primary,
            collision_suffix: "1",
        }
    }

    #[test]
    fn test_first_match_wins() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": 1, "name": "Ana"})), doc(json!({"id": 2, "name": "Luis"}))];
        let orders = vec![
            doc(json!({"client_id": 1, "total": 10})),
            doc(json!({"client_id": 1, "total": 20})),
            doc(json!({"client_id": 3, "total": 30})),
        ];

        let rows: Vec<Document> = join(&spec(one, two, PrimarySide::One), &clients, &orders).collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["total"], json!(10));
        assert_eq!(rows[0][TABLE_TAG], json!(one.to_string()));
    }

    #[test]
    fn test_collision_keeps_primary_value() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": 1, "name": "Ana", "name1": "kept"}))];
        let orders = vec![doc(json!({"client_id": 1, "name": "Order A"}))];

        let rows: Vec<Document> = join(&spec(one, two, PrimarySide::One), &clients, &orders).collect();

        assert_eq!(rows[0]["name"], json!("Ana"));
        assert_eq!(rows[0]["name1"], json!("kept"));
        assert_eq!(rows[0]["name11"], json!("Order A"));
    }

    #[test]
    fn test_second_side_as_primary() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": 7, "name": "Ana"}))];
        let orders = vec![doc(json!({"client_id": 7, "name": "Order A", "lat": 10.1}))];

        let rows: Vec<Document> = join(&spec(one, two, PrimarySide::Two), &clients, &orders).collect();

        assert_eq!(rows[0]["name"], json!("Order A"));
        assert_eq!(rows[0]["name1"], json!("Ana"));
        assert_eq!(rows[0]["id"], json!(7));
        assert_eq!(rows[0][TABLE_TAG], json!(two.to_string()));
    }

    #[test]
    fn test_null_missing_and_mistyped_keys_never_match() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![
            doc(json!({"id": null})),
            doc(json!({"name": "no id"})),
            doc(json!({"id": "5"})),
        ];
        let orders = vec![
            doc(json!({"client_id": null})),
            doc(json!({"total": 1})),
            doc(json!({"client_id": 5})),
        ];

        assert_eq!(join(&spec(one, two, PrimarySide::One), &clients, &orders).count(), 0);
    }

    #[test]
    fn test_integral_float_matches_integer() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": 5}))];
        let orders = vec![doc(json!({"client_id": 5.0}))];

        assert_eq!(join(&spec(one, two, PrimarySide::One), &clients, &orders).count(), 1);
    }

    #[test]
    fn test_booleans_only_match_booleans() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": true}))];
        let numbered = vec![doc(json!({"client_id": 1}))];
        let flagged = vec![doc(json!({"client_id": true}))];

        assert_eq!(join(&spec(one, two, PrimarySide::One), &clients, &numbered).count(), 0);
        assert_eq!(join(&spec(one, two, PrimarySide::One), &clients, &flagged).count(), 1);
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": 1, "name": "Ana"}))];
        let orders = vec![doc(json!({"client_id": 1, "name": "Order"}))];
        let before = (clients.clone(), orders.clone());

        let _ = join(&spec(one, two, PrimarySide::One), &clients, &orders).collect::<Vec<_>>();

        assert_eq!((clients, orders), before);
    }

    #[test]
    fn test_from_relation_picks_geo_side() {
        let relation = Relation::new(Uuid::new_v4(), "id", Uuid::new_v4(), "client_id");

        assert_eq!(JoinSpec::from_relation(&relation, None, "1").primary, PrimarySide::One);
        assert_eq!(
            JoinSpec::from_relation(&relation, Some(relation.table_two), "1").primary,
            PrimarySide::Two
        );
        assert_eq!(
            JoinSpec::from_relation(&relation, Some(Uuid::new_v4()), "1").primary,
            PrimarySide::One
        );
    }

    #[test]
    fn test_virtual_rows_use_output_names() {
        let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
        let clients = vec![doc(json!({"id": 1, "name": "Ana"}))];
        let orders = vec![doc(json!({"client_id": 1, "name": "Order"}))];
        let fields = vec![
            FieldDescriptor::of_table(one, "name", Some("client".to_string())),
            FieldDescriptor::of_table(two, "name", Some("order".to_string())),
            FieldDescriptor::of_table(two, "missing", None),
            FieldDescriptor::of_table(Uuid::new_v4(), "ignored", None),
        ];

        let rows = virtual_rows(&spec(one, two, PrimarySide::Two), &fields, &clients, &orders);

        assert_eq!(
            rows,
            vec![doc(json!({
                "client": "Ana",
                "order": "Order",
                "missing": null,
                "table": two.to_string()
            }))]
        );
    }

    #[test]
    fn test_nest_related_keeps_every_match() {
        let clients = vec![doc(json!({"id": 1})), doc(json!({"id": 2})), doc(json!({"name": "x"}))];
        let orders = vec![
            doc(json!({"client_id": 1, "total": 10})),
            doc(json!({"client_id": 1, "total": 20})),
        ];
        let related = [RelatedRows {
            name: "shop_orders",
            own_key: "id",
            other_key: "client_id",
            rows: &orders,
        }];

        let rows = nest_related(clients, &related);

        assert_eq!(rows[0]["shop_orders"].as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["shop_orders"], json!([]));
        assert_eq!(rows[2]["shop_orders"], json!([]));
    }

    fn arb_rows(key: &'static str) -> impl Strategy<Value = Vec<Document>> {
        prop::collection::vec(
            (prop::option::of(0i64..5), "[a-c]{1}").prop_map(move |(k, name)| {
                let mut row = Document::new();
                if let Some(k) = k {
                    row.insert(key.to_string(), json!(k));
                }
                row.insert("name".to_string(), json!(name));
                row
            }),
            0..12,
        )
    }

    proptest! {
        #[test]
        fn prop_at_most_one_row_per_left_row(
            clients in arb_rows("id"),
            orders in arb_rows("client_id"),
            primary_two in any::<bool>(),
        ) {
            let (one, two) = (Uuid::new_v4(), Uuid::new_v4());
            let primary = if primary_two { PrimarySide::Two } else { PrimarySide::One };
            let spec = spec(one, two, primary);
            let rows: Vec<Document> = join(&spec, &clients, &orders).collect();

            prop_assert!(rows.len() <= clients.len());
            for row in &rows {
                prop_assert_eq!(&row[TABLE_TAG], &json!(spec.primary_table().to_string()));
                // both sides carry `name`, so the other side is always renamed
                prop_assert!(row.contains_key("name1"));
            }
        }
    }
}
