use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One of the elements taking part in a clash.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClashObject {
    /// Identifier kind, e.g. "Element ID" or "Entity Handle".
    pub attribute_name: String,
    pub attribute_value: String,
    /// Source model file the element came from.
    pub path: String,
}

/// A single detected interference, normalized from any input format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClashRecord {
    /// 1-based source position: data row for delimited input, clash ordinal for XML.
    pub row: usize,
    pub id: String,
    pub name: String,
    /// Clash test the record belongs to. Records of different tests never group.
    pub test: String,
    pub point: Point3,
    pub status: String,
    pub objects: Vec<ClashObject>,
    /// Index into `objects` of the element held responsible.
    pub blame: usize,
    pub metadata: BTreeMap<String, String>,
}

impl ClashRecord {
    pub fn blamed(&self) -> Option<&ClashObject> {
        self.objects.get(self.blame)
    }

    pub fn blame_path(&self) -> &str {
        self.blamed().map(|o| o.path.as_str()).unwrap_or("")
    }

    pub fn blame_attribute_name(&self) -> &str {
        self.blamed().map(|o| o.attribute_name.as_str()).unwrap_or("")
    }

    pub fn blame_attribute_value(&self) -> &str {
        self.blamed().map(|o| o.attribute_value.as_str()).unwrap_or("")
    }
}

/// Records that survived ingestion plus the rows that did not.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub records: Vec<ClashRecord>,
    pub skipped: Vec<RecordError>,
}

// ---------------------------------------------------------------------------
// Field map
// ---------------------------------------------------------------------------

/// Logical clash attribute -> column name in a delimited input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub id: String,
    pub name: String,
    pub test: String,
    pub x: String,
    pub y: String,
    pub z: String,
    pub status: String,
    pub path: String,
    pub attribute_name: String,
    pub attribute_value: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id: "id".into(),
            name: "name".into(),
            test: "test".into(),
            x: "x".into(),
            y: "y".into(),
            z: "z".into(),
            status: "status".into(),
            path: "path".into(),
            attribute_name: "attribute_name".into(),
            attribute_value: "attribute_value".into(),
        }
    }
}

impl FieldMap {
    pub const FIELDS: [&'static str; 10] = [
        "id",
        "name",
        "test",
        "x",
        "y",
        "z",
        "status",
        "path",
        "attribute_name",
        "attribute_value",
    ];

    /// Point the logical `field` at `column`. Returns false for an unknown field.
    pub fn set(&mut self, field: &str, column: impl Into<String>) -> bool {
        let slot = match field {
            "id" => &mut self.id,
            "name" => &mut self.name,
            "test" => &mut self.test,
            "x" => &mut self.x,
            "y" => &mut self.y,
            "z" => &mut self.z,
            "status" => &mut self.status,
            "path" => &mut self.path,
            "attribute_name" => &mut self.attribute_name,
            "attribute_value" => &mut self.attribute_value,
            _ => return false,
        };
        *slot = column.into();
        true
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Every axis within the threshold (axis-aligned box overlap).
    #[default]
    Box,
    Euclidean,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Box => write!(f, "box"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "box" => Ok(Self::Box),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(format!("unknown metric '{other}' (expected 'box' or 'euclidean')")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupingOptions {
    pub threshold: f64,
    pub metric: DistanceMetric,
    /// Also merge records blaming the same element (same attribute value).
    pub join_on_attribute: bool,
}

impl GroupingOptions {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, metric: DistanceMetric::Box, join_on_attribute: false }
    }
}

/// First group id handed out by the engine.
pub const GROUP_ID_BASE: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupAssignment {
    /// Position of the record in the ingested sequence.
    pub index: usize,
    pub record_id: String,
    pub group_id: u32,
}

/// Output of one grouping pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    /// One entry per grouped record, in input order.
    pub assignments: Vec<GroupAssignment>,
    /// Records left out of grouping.
    pub excluded: Vec<RecordError>,
    pub group_count: usize,
}

/// A derived group with its summary metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub id: u32,
    pub test: String,
    /// Indices into the record sequence, in input order.
    pub members: Vec<usize>,
    pub member_ids: Vec<String>,
    /// Earliest member; represents the group in reports.
    pub origin: usize,
    pub centroid: Point3,
    /// Distinct blamed attribute names, first-seen order.
    pub attribute_names: Vec<String>,
    /// Distinct blamed attribute values, first-seen order.
    pub attribute_values: Vec<String>,
}

impl Group {
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Xlsx,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    /// Infer from a path's extension; anything not xlsx/xls is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "xlsx" || ext == "xls" => Self::Xlsx,
            _ => Self::Csv,
        }
    }

    /// Append this format's extension unless the path already carries it.
    /// A legacy `.xls` name is switched to `.xlsx`.
    pub fn ensure_extension(&self, path: &Path) -> PathBuf {
        let current = path.extension().and_then(|e| e.to_str());
        if current.is_some_and(|e| e.eq_ignore_ascii_case(self.extension())) {
            path.to_path_buf()
        } else if *self == Self::Xlsx && current.is_some_and(|e| e.eq_ignore_ascii_case("xls")) {
            path.with_extension(self.extension())
        } else {
            let mut os = path.as_os_str().to_owned();
            os.push(".");
            os.push(self.extension());
            PathBuf::from(os)
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Xlsx),
            other => Err(format!("unknown output format '{other}' (expected 'csv' or 'xlsx')")),
        }
    }
}
