//! Data model shared by the export pipeline.
//!
//! Coordinates, sensor readings, lap boundaries and the error taxonomy
//! that every export surfaces to its caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::storage::StoreError;

/// Attribute and column names used by readings, lap aggregates and CSV titles.
pub mod attribute {
    pub const ELAPSED_TIME: &str = "Elapsed Time";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const ALTITUDE: &str = "Altitude";
    pub const DISTANCE_TRAVELED: &str = "Distance Traveled";
    pub const HEART_RATE: &str = "Heart Rate";
    pub const CADENCE: &str = "Cadence";
    pub const POWER: &str = "Power";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    /// Lap aggregates are stored per lap as `<prefix><lap number>`, e.g. `LapTime2`.
    pub const LAP_TIME: &str = "LapTime";
    pub const LAP_DISTANCE: &str = "LapDistance";
    pub const LAP_CALORIES: &str = "LapCalories";
}

/// A GPS fix. Timestamps strictly increase within an activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    pub altitude_meters: f64,
    /// Unix time in milliseconds
    pub time_ms: u64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, altitude_meters: f64, time_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            altitude_meters,
            time_ms,
        }
    }
}

/// Kinds of auxiliary sensor streams recorded alongside position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    HeartRate,
    Cadence,
    Power,
    Accelerometer,
}

impl SensorKind {
    /// Stable name used by the SQLite store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::HeartRate => "heart_rate",
            SensorKind::Cadence => "cadence",
            SensorKind::Power => "power",
            SensorKind::Accelerometer => "accelerometer",
        }
    }
}

impl std::str::FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heart_rate" => Ok(SensorKind::HeartRate),
            "cadence" => Ok(SensorKind::Cadence),
            "power" => Ok(SensorKind::Power),
            "accelerometer" => Ok(SensorKind::Accelerometer),
            other => Err(format!("unknown sensor kind: {}", other)),
        }
    }
}

/// One timestamped sample from an auxiliary sensor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    /// Unix time in milliseconds
    pub time_ms: u64,
    /// Named values, e.g. `"Heart Rate" -> 142.0` or `"x" -> 0.12`
    pub values: BTreeMap<String, f64>,
}

impl SensorReading {
    pub fn new(time_ms: u64) -> Self {
        Self {
            time_ms,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a named value.
    pub fn with_value(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    /// Look up a named value.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Start of a lap after the first one. The first lap starts at the
/// activity start and the last lap ends at the activity end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapBoundary {
    pub start_time_ms: u64,
}

impl LapBoundary {
    pub fn new(start_time_ms: u64) -> Self {
        Self { start_time_ms }
    }
}

/// Cumulative distance at a position sample. One entry per position
/// sample after the first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeDistancePair {
    pub time_ms: u64,
    pub distance_meters: f64,
}

impl TimeDistancePair {
    pub fn new(time_ms: u64, distance_meters: f64) -> Self {
        Self {
            time_ms,
            distance_meters,
        }
    }
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// TCX format (hierarchical XML with lap aggregates)
    #[default]
    Tcx,
    /// GPX format (track-only XML)
    Gpx,
    /// FIT format (flat binary records)
    Fit,
    /// CSV format (flat tables)
    Csv,
}

impl ExportFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Tcx => "tcx",
            ExportFormat::Gpx => "gpx",
            ExportFormat::Fit => "fit",
            ExportFormat::Csv => "csv",
        }
    }

    /// Whether the format can be produced from a live coordinate producer.
    ///
    /// FIT and CSV need whole-table sensor data and lap aggregates.
    pub fn supports_live(&self) -> bool {
        matches!(self, ExportFormat::Tcx | ExportFormat::Gpx)
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Tcx => write!(f, "TCX"),
            ExportFormat::Gpx => write!(f, "GPX"),
            ExportFormat::Fit => write!(f, "FIT"),
            ExportFormat::Csv => write!(f, "CSV"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcx" => Ok(ExportFormat::Tcx),
            "gpx" => Ok(ExportFormat::Gpx),
            "fit" => Ok(ExportFormat::Fit),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A stored activity attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    /// Attribute exists but was never computed
    NotSet,
    /// Duration or timestamp in seconds
    Time(i64),
    Double(f64),
    Integer(u64),
}

impl AttributeValue {
    /// Numeric view of the value, `None` when unset.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::NotSet => None,
            AttributeValue::Time(t) => Some(*t as f64),
            AttributeValue::Double(d) => Some(*d),
            AttributeValue::Integer(i) => Some(*i as f64),
        }
    }
}

/// Activity metadata as resolved by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    /// User-facing name, may be empty
    pub name: String,
    /// Sport/activity type, e.g. "Cycling" or "Mountain Biking"
    pub activity_type: String,
    /// Unix time in milliseconds
    pub start_time_ms: u64,
    /// Unix time in milliseconds
    pub end_time_ms: u64,
    /// False for stationary activities (strength, indoor sets) that never
    /// record a position stream.
    pub has_position_data: bool,
}

/// Per-activity summary row used by the summary CSV export.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub id: String,
    pub name: String,
    pub activity_type: String,
    /// Unix time in seconds
    pub start_time: i64,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl ActivitySummary {
    /// Fallible attribute lookup; `None` when the attribute is absent.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Errors during activity export.
///
/// Alignment misses are not errors; they surface as `None` from the aligner
/// and as sentinel or omitted values in the output.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Activity id could not be resolved
    #[error("Activity not found: {0}")]
    NotFound(String),

    /// Format or format/pipeline combination is not defined
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Create, write, seek or rename failure
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// XML generation error
    #[error("XML error: {0}")]
    XmlError(String),

    /// Source data violates an ordering or cardinality invariant
    #[error("Malformed source data: {0}")]
    MalformedSource(String),

    /// A writer operation was invoked out of order
    #[error("Writer protocol violation: {0}")]
    ProtocolViolation(String),

    /// Store retrieval failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<quick_xml::Error> for ExportError {
    fn from(e: quick_xml::Error) -> Self {
        ExportError::XmlError(e.to_string())
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::IoError(e.into())
    }
}
