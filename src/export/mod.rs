//! Activity export: stream alignment, lap segmentation and format writers.

pub mod aligner;
pub mod engine;
pub mod laps;
pub mod naming;
pub mod summary;
pub mod types;
pub mod writer;

pub use aligner::{SensorCursor, ALIGNMENT_TOLERANCE_MS};
pub use engine::{CoordinateProducer, ExportEngine, LiveActivity, LiveExporter};
pub use laps::{segment_laps, LapAggregates, LapWindow};
pub use naming::{generate_file_name, generate_named_file_name};
pub use summary::export_activity_summary;
pub use types::{
    ActivityRecord, ActivitySummary, AttributeValue, Coordinate, ExportError, ExportFormat,
    LapBoundary, SensorKind, SensorReading, TimeDistancePair,
};
pub use writer::{TrackWriter, WriterState};
