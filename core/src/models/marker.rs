//! Map display configuration
//!
//! Markers tell the map which fields of a table supply coordinates, grouping
//! and icons. Lines connect a field of an origin table to a field of a
//! destination table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Reference to a field of a specific table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    /// Table owning the field
    pub table: Uuid,

    /// Field name
    #[serde(rename = "Field")]
    pub field: String,
}

impl FieldRef {
    /// Create a new field reference
    pub fn new(table: Uuid, field: impl Into<String>) -> Self {
        FieldRef {
            table,
            field: field.into(),
        }
    }
}

/// Where a marker takes its icon from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum IconKind {
    /// A fixed image URL
    Url = 1,

    /// The value of a row field
    Field = 2,

    /// A built-in maps icon
    IconMaps = 3,
}

impl IconKind {
    /// Every icon kind, in declaration order
    pub const ALL: [IconKind; 3] = [IconKind::Url, IconKind::Field, IconKind::IconMaps];

    /// Human readable description
    pub fn description(&self) -> &'static str {
        match self {
            IconKind::Url => "Url",
            IconKind::Field => "Field",
            IconKind::IconMaps => "Maps icon",
        }
    }
}

impl TryFrom<u8> for IconKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        IconKind::ALL
            .into_iter()
            .find(|kind| *kind as u8 == value)
            .ok_or_else(|| format!("unknown icon kind {}", value))
    }
}

impl From<IconKind> for u8 {
    fn from(kind: IconKind) -> u8 {
        kind as u8
    }
}

/// Map marker configuration of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Stable identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Table the marker is drawn for
    pub table: Uuid,

    /// Additional tables contributing to the marker
    #[serde(default)]
    pub tables: Vec<Uuid>,

    /// Field supplying the latitude
    pub field_latitude: FieldRef,

    /// Field supplying the longitude
    pub field_longitude: FieldRef,

    /// Field used to group markers
    #[serde(default)]
    pub group_by_field: Option<FieldRef>,

    /// Icon source
    pub type_icon: IconKind,

    /// Field supplying the icon when `type_icon` is [`IconKind::Field`]
    #[serde(default)]
    pub field_icon: Option<FieldRef>,

    /// Icon URL when `type_icon` is [`IconKind::Url`]
    #[serde(default)]
    pub url_icon: Option<String>,

    /// Icon name when `type_icon` is [`IconKind::IconMaps`]
    #[serde(default)]
    pub maps_icon: Option<String>,

    /// Free-form extra settings for the map client
    #[serde(default)]
    pub settings: Value,
}

impl Marker {
    /// Create a marker using a fixed icon URL
    pub fn new(
        name: impl Into<String>,
        table: Uuid,
        latitude: impl Into<String>,
        longitude: impl Into<String>,
    ) -> Self {
        Marker {
            id: Uuid::new_v4(),
            name: name.into(),
            table,
            tables: Vec::new(),
            field_latitude: FieldRef::new(table, latitude),
            field_longitude: FieldRef::new(table, longitude),
            group_by_field: None,
            type_icon: IconKind::Url,
            field_icon: None,
            url_icon: None,
            maps_icon: None,
            settings: Value::Null,
        }
    }

    /// Field of `self.table` holding the icon, when the icon comes from a field
    pub fn icon_field(&self) -> Option<&str> {
        match (self.type_icon, &self.field_icon) {
            (IconKind::Field, Some(field)) if field.table == self.table => Some(&field.field),
            _ => None,
        }
    }

    /// Every field reference of the marker
    pub fn field_refs(&self) -> impl Iterator<Item = &FieldRef> {
        [Some(&self.field_latitude), Some(&self.field_longitude)]
            .into_iter()
            .chain([self.group_by_field.as_ref(), self.field_icon.as_ref()])
            .flatten()
    }
}

/// Line drawn between the markers of two tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    /// Stable identifier
    pub id: Uuid,

    /// Table of the origin marker
    pub origin_marker: Uuid,

    /// Table of the destination marker
    pub destination_marker: Uuid,

    /// Field of the origin table
    pub origin_field: FieldRef,

    /// Field of the destination table
    pub destination_field: FieldRef,
}

impl Line {
    /// Create a line between two table fields
    pub fn new(origin_field: FieldRef, destination_field: FieldRef) -> Self {
        Line {
            id: Uuid::new_v4(),
            origin_marker: origin_field.table,
            destination_marker: destination_field.table,
            origin_field,
            destination_field,
        }
    }
}
