//! Format writers and the open/emit/close protocol they share.
//!
//! Every track writer walks the same state machine:
//!
//! ```text
//! Created -> FileOpen -> DocumentStarted
//!     -> (LapOpen -> TrackOpen -> [records] -> TrackClosed -> LapClosed)*
//!     -> DocumentEnded -> FileClosed
//! ```
//!
//! Calls made out of order fail with [`ExportError::ProtocolViolation`]. A
//! failed write moves the writer to `Failed`, after which every call fails;
//! the engine discards the partial output.

pub mod csv;
pub mod fit;
pub mod gpx;
pub mod tcx;

pub use self::csv::{CsvFileWriter, CsvTable};
pub use fit::FitWriter;
pub use gpx::GpxWriter;
pub use tcx::TcxWriter;

use crate::export::laps::{LapAggregates, LapWindow};
use crate::export::types::{Coordinate, ExportError};

/// Writer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterState {
    #[default]
    Created,
    FileOpen,
    DocumentStarted,
    LapOpen,
    TrackOpen,
    TrackClosed,
    LapClosed,
    DocumentEnded,
    FileClosed,
    /// A write failed; the output is unusable
    Failed,
}

/// Transition bookkeeping embedded in every writer.
#[derive(Debug, Default)]
pub struct Protocol {
    state: WriterState,
}

impl Protocol {
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Fail unless the writer is in one of `allowed`.
    pub fn expect(&self, operation: &str, allowed: &[WriterState]) -> Result<(), ExportError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ExportError::ProtocolViolation(format!(
                "{} not allowed in state {:?}",
                operation, self.state
            )))
        }
    }

    /// Record the outcome of an operation: move to `next` on success,
    /// to `Failed` otherwise.
    pub fn complete<T>(
        &mut self,
        result: Result<T, ExportError>,
        next: WriterState,
    ) -> Result<T, ExportError> {
        self.state = if result.is_ok() {
            next
        } else {
            WriterState::Failed
        };
        result
    }

    pub fn open_file(&mut self) -> Result<(), ExportError> {
        self.expect("open_file", &[WriterState::Created])?;
        self.state = WriterState::FileOpen;
        Ok(())
    }
}

/// Document-level metadata written by `start_document`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentHeader {
    pub activity_type: String,
    /// Activity name; writers substitute a placeholder when empty
    pub name: String,
    /// Unix time in milliseconds
    pub start_time_ms: u64,
    /// Application name recorded as the file's creator
    pub creator: String,
}

/// Lap-level data written by `start_lap`, ahead of any trackpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapHeader {
    pub window: LapWindow,
    pub aggregates: LapAggregates,
}

/// One composite record: a position fix plus the aligned auxiliary values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRecord {
    pub coordinate: Coordinate,
    /// Cumulative distance in meters, when the pipeline tracks it
    pub distance_meters: Option<f64>,
    pub heart_rate: Option<f64>,
    pub cadence: Option<f64>,
    pub power: Option<f64>,
}

impl TrackRecord {
    pub fn position_only(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            distance_meters: None,
            heart_rate: None,
            cadence: None,
            power: None,
        }
    }

    pub fn has_sensor_data(&self) -> bool {
        self.heart_rate.is_some() || self.cadence.is_some() || self.power.is_some()
    }
}

/// Common interface of the lap/track-structured formats (TCX, GPX, FIT).
pub trait TrackWriter {
    /// The sink handed back once the file is closed.
    type Sink;

    fn state(&self) -> WriterState;
    fn start_document(&mut self, header: &DocumentHeader) -> Result<(), ExportError>;
    fn start_lap(&mut self, lap: &LapHeader) -> Result<(), ExportError>;
    fn start_track(&mut self) -> Result<(), ExportError>;
    fn write_record(&mut self, record: &TrackRecord) -> Result<(), ExportError>;
    fn end_track(&mut self) -> Result<(), ExportError>;
    fn end_lap(&mut self) -> Result<(), ExportError>;
    fn end_document(&mut self) -> Result<(), ExportError>;
    /// Flush and finalize the file.
    fn close(self) -> Result<Self::Sink, ExportError>
    where
        Self: Sized;
}

/// Allowed predecessor states, shared by the implementations.
pub(crate) mod allowed {
    use super::WriterState::{self, *};

    pub const START_DOCUMENT: &[WriterState] = &[FileOpen];
    pub const START_LAP: &[WriterState] = &[DocumentStarted, LapClosed];
    pub const START_TRACK: &[WriterState] = &[LapOpen];
    pub const RECORD: &[WriterState] = &[TrackOpen];
    pub const END_TRACK: &[WriterState] = &[TrackOpen];
    pub const END_LAP: &[WriterState] = &[TrackClosed];
    pub const END_DOCUMENT: &[WriterState] = &[DocumentStarted, LapClosed];
    pub const CLOSE: &[WriterState] = &[DocumentEnded];
}
