//! Geo/field projector
//!
//! Shapes a native or merged row into the document served to map clients:
//! the allowlisted fields, a `point` when the table is shown on the map, the
//! icon field and every field of the table's data groups.
//!
//! Projection never fails. Missing fields are skipped and unusable
//! coordinates produce `point: null`.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::models::{DataGroup, Document, Table};

/// Key of the computed map point
pub const POINT_KEY: &str = "point";

/// A map coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude
    pub latitude: f64,

    /// Longitude
    pub longitude: f64,
}

impl GeoPoint {
    fn into_value(self) -> Value {
        let mut point = Document::new();
        point.insert("latitude".to_string(), number(self.latitude));
        point.insert("longitude".to_string(), number(self.longitude));
        Value::Object(point)
    }
}

fn number(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// What to keep from the rows of one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Keys copied to the output
    pub fields: Vec<String>,

    /// Whether rows carry a `point`
    pub show_on_map: bool,

    /// Key holding the latitude
    pub latitude: Option<String>,

    /// Key holding the longitude
    pub longitude: Option<String>,

    /// Key holding the icon
    pub icon: Option<String>,

    /// Field lists of the table's data groups
    pub data_groups: Vec<Vec<String>>,
}

impl Projection {
    /// Projection of the rows of `table`
    ///
    /// The data groups of other tables are ignored. The coordinate and icon
    /// fields of a virtual table name fields of its geo anchor, which appear
    /// in its rows under their output name.
    pub fn for_table(table: &Table, data_groups: &[DataGroup]) -> Self {
        let key = |field: &Option<String>| {
            field.as_deref().filter(|f| !f.is_empty()).map(|f| row_key(table, f))
        };

        Projection {
            fields: table.output_fields(),
            show_on_map: table.show_on_map,
            latitude: key(&table.property_latitude),
            longitude: key(&table.property_longitude),
            icon: key(&table.property_icon),
            data_groups: data_groups
                .iter()
                .filter(|g| g.table == table.id)
                .map(|g| g.properties.clone())
                .collect(),
        }
    }
}

fn row_key(table: &Table, field: &str) -> String {
    if !table.is_virtual {
        return field.to_string();
    }

    let anchor = table.geo_table;
    table
        .fields
        .iter()
        .filter(|d| d.field == field)
        .find(|d| anchor.is_none() || d.table == anchor)
        .map(|d| d.output_name().to_string())
        .unwrap_or_else(|| field.to_string())
}

/// Read a coordinate; `0`, `""`, null, booleans and unparsable strings count as missing
pub fn coordinate(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };

    if parsed == 0.0 || !parsed.is_finite() {
        None
    } else {
        Some(parsed)
    }
}

/// Point of `row`, if both coordinates are usable
pub fn geo_point(row: &Document, latitude: &str, longitude: &str) -> Option<GeoPoint> {
    Some(GeoPoint {
        latitude: coordinate(row.get(latitude))?,
        longitude: coordinate(row.get(longitude))?,
    })
}

/// Project one row
pub fn project(row: &Document, projection: &Projection) -> Document {
    let mut output = Document::new();

    let mut copy = |key: &str| {
        if key == POINT_KEY {
            return;
        }
        if let Some(value) = row.get(key) {
            output.insert(key.to_string(), value.clone());
        }
    };

    for field in &projection.fields {
        copy(field);
    }
    if let Some(icon) = &projection.icon {
        copy(icon);
    }
    for group in &projection.data_groups {
        for field in group {
            copy(field);
        }
    }

    if projection.show_on_map {
        let point = match (&projection.latitude, &projection.longitude) {
            (Some(lat), Some(lon)) => geo_point(row, lat, lon),
            _ => None,
        };
        output.insert(
            POINT_KEY.to_string(),
            point.map(GeoPoint::into_value).unwrap_or(Value::Null),
        );
    }

    output
}

/// Project every row
pub fn project_all<'a, I>(rows: I, projection: &Projection) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    rows.into_iter().map(|row| project(row, projection)).collect()
}
