//! Export orchestration.
//!
//! Two pipelines share the aligner and the writers:
//!
//! - **Batch** ([`ExportEngine::export_activity`]) reads everything from an
//!   [`ActivityStore`], segments the activity into lap windows and walks the
//!   position stream once, aligning each auxiliary stream with its own
//!   forward-only cursor.
//! - **Live** ([`LiveExporter::export`]) pulls coordinates from a
//!   [`CoordinateProducer`] and cuts laps at caller-supplied hints. Only the
//!   XML formats are available live.
//!
//! Output goes to a hidden temporary file in the target directory and is
//! renamed into place only after the writer has closed cleanly.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::export::aligner::SensorCursor;
use crate::export::laps::{haversine_distance, segment_laps, LapAggregates, LapWindow};
use crate::export::naming::generate_file_name;
use crate::export::summary;
use crate::export::types::{
    attribute, ActivityRecord, Coordinate, ExportError, ExportFormat, SensorKind, SensorReading,
    TimeDistancePair,
};
use crate::export::writer::{
    CsvFileWriter, DocumentHeader, FitWriter, GpxWriter, LapHeader, TcxWriter, TrackRecord,
    TrackWriter,
};
use crate::storage::{ActivityStore, ExportSettings};

/// Creator string used when none is configured.
pub const DEFAULT_CREATOR: &str = concat!("activity-export ", env!("CARGO_PKG_VERSION"));

/// Store-backed exporter.
pub struct ExportEngine<S: ActivityStore> {
    store: S,
    creator: String,
    csv_precision: Option<usize>,
}

/// Position and auxiliary streams of one activity, loaded up front.
struct BatchSource {
    coordinates: Vec<Coordinate>,
    distances: Vec<TimeDistancePair>,
    windows: Vec<LapWindow>,
    heart_rate: Vec<SensorReading>,
    cadence: Vec<SensorReading>,
    power: Vec<SensorReading>,
}

impl BatchSource {
    /// Cumulative distance at `coordinates[index]`.
    fn distance_at(&self, index: usize) -> f64 {
        if index == 0 {
            0.0
        } else {
            self.distances
                .get(index - 1)
                .map(|d| d.distance_meters)
                .unwrap_or(0.0)
        }
    }
}

impl<S: ActivityStore> ExportEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            creator: DEFAULT_CREATOR.to_string(),
            csv_precision: None,
        }
    }

    /// Engine configured from loaded settings.
    pub fn with_settings(store: S, settings: &ExportSettings) -> Self {
        Self {
            store,
            creator: settings.creator.clone(),
            csv_precision: settings.csv_float_precision,
        }
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Export one stored activity and return the path of the written file.
    ///
    /// Any failure aborts the export; no file appears under the final name.
    pub fn export_activity(
        &self,
        format: ExportFormat,
        output_dir: &Path,
        activity_id: &str,
    ) -> Result<PathBuf, ExportError> {
        let activity = self
            .store
            .retrieve_activity(activity_id)?
            .ok_or_else(|| ExportError::NotFound(activity_id.to_string()))?;

        if !activity.has_position_data && format != ExportFormat::Csv {
            return Err(ExportError::UnsupportedFormat(format!(
                "{} export of activity {} without position data",
                format, activity_id
            )));
        }

        info!(
            activity_id,
            format = %format,
            activity_type = %activity.activity_type,
            "Exporting activity"
        );

        let path = output_dir.join(generate_file_name(
            format,
            activity.start_time_ms,
            &activity.activity_type,
        ));

        let records = match format {
            ExportFormat::Csv => write_atomically(&path, |file| {
                let mut csv = CsvFileWriter::create(file, self.csv_precision);
                let rows = self.write_csv_tables(&mut csv, &activity)?;
                Ok((csv.close()?, rows))
            })?,
            ExportFormat::Fit => {
                let source = self.load_batch_source(&activity)?;
                write_atomically(&path, |file| {
                    let mut writer = FitWriter::create(file)?;
                    let records = self.write_track_document(&mut writer, &activity, &source)?;
                    Ok((writer.close()?, records))
                })?
            }
            ExportFormat::Tcx => {
                let source = self.load_batch_source(&activity)?;
                write_atomically(&path, |file| {
                    let mut writer = TcxWriter::create(BufWriter::new(file))?;
                    let records = self.write_track_document(&mut writer, &activity, &source)?;
                    Ok((into_file(writer.close()?)?, records))
                })?
            }
            ExportFormat::Gpx => {
                let source = self.load_batch_source(&activity)?;
                write_atomically(&path, |file| {
                    let mut writer = GpxWriter::create(BufWriter::new(file))?;
                    let records = self.write_track_document(&mut writer, &activity, &source)?;
                    Ok((into_file(writer.close()?)?, records))
                })?
            }
        };

        info!(
            activity_id,
            format = %format,
            path = %path.display(),
            records,
            "Export complete"
        );

        Ok(path)
    }

    /// Write a summary table of every stored activity of `activity_type`.
    pub fn export_activity_summary(
        &self,
        activity_type: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, ExportError> {
        let activities = self.store.retrieve_activity_summaries()?;
        summary::export_activity_summary(&activities, activity_type, output_dir)
    }

    fn load_batch_source(&self, activity: &ActivityRecord) -> Result<BatchSource, ExportError> {
        let id = activity.id.as_str();

        let coordinates = self.store.retrieve_activity_coordinates(id)?;
        let distances = self.store.retrieve_activity_distances(id)?;
        validate_position_streams(&coordinates, &distances)?;

        let boundaries = self.store.retrieve_laps(id)?;
        let windows = segment_laps(activity.start_time_ms, activity.end_time_ms, &boundaries)?;

        Ok(BatchSource {
            coordinates,
            distances,
            windows,
            heart_rate: self
                .store
                .retrieve_sensor_readings_of_type(id, SensorKind::HeartRate)?,
            cadence: self
                .store
                .retrieve_sensor_readings_of_type(id, SensorKind::Cadence)?,
            power: self
                .store
                .retrieve_sensor_readings_of_type(id, SensorKind::Power)?,
        })
    }

    /// Drive a track writer through every lap window. Returns the number of
    /// records written.
    fn write_track_document<T: TrackWriter>(
        &self,
        writer: &mut T,
        activity: &ActivityRecord,
        source: &BatchSource,
    ) -> Result<usize, ExportError> {
        let mut heart_rate = SensorCursor::new(&source.heart_rate);
        let mut cadence = SensorCursor::new(&source.cadence);
        let mut power = SensorCursor::new(&source.power);

        writer.start_document(&DocumentHeader {
            activity_type: activity.activity_type.clone(),
            name: activity.name.clone(),
            start_time_ms: activity.start_time_ms,
            creator: self.creator.clone(),
        })?;

        let coordinates = &source.coordinates;
        let mut index = 0;
        let mut written = 0;
        let mut skipped = 0;

        for window in &source.windows {
            let aggregates = LapAggregates::resolve(
                window,
                coordinates,
                &source.distances,
                |name| Ok(self.store.retrieve_activity_attribute(&activity.id, name)?),
            )?;
            if aggregates.calories.is_none() {
                warn!(
                    activity_id = %activity.id,
                    lap = window.number,
                    "No calorie figure for lap, writing placeholder"
                );
            }

            writer.start_lap(&LapHeader {
                window: *window,
                aggregates,
            })?;
            writer.start_track()?;

            while index < coordinates.len() && coordinates[index].time_ms < window.start_ms {
                skipped += 1;
                index += 1;
            }

            let lap_first = index;
            while index < coordinates.len() && window.contains(coordinates[index].time_ms) {
                let coordinate = coordinates[index];
                let t = coordinate.time_ms;
                writer.write_record(&TrackRecord {
                    coordinate,
                    distance_meters: Some(source.distance_at(index)),
                    heart_rate: heart_rate.aligned_value(t, attribute::HEART_RATE),
                    cadence: cadence.aligned_value(t, attribute::CADENCE),
                    power: power.aligned_value(t, attribute::POWER),
                })?;
                index += 1;
                written += 1;
            }

            writer.end_track()?;
            writer.end_lap()?;

            debug!(
                lap = window.number,
                start_ms = window.start_ms,
                end_ms = window.end_ms,
                records = index - lap_first,
                "Lap written"
            );
        }

        skipped += coordinates.len() - index;
        if skipped > 0 {
            warn!(
                activity_id = %activity.id,
                skipped,
                "Position samples outside the activity interval were not exported"
            );
        }

        writer.end_document()?;
        Ok(written)
    }

    /// Write the CSV tables in order: position and distance, accelerometer,
    /// heart rate, cadence. Returns the number of data rows written.
    fn write_csv_tables<W: Write>(
        &self,
        csv: &mut CsvFileWriter<W>,
        activity: &ActivityRecord,
    ) -> Result<usize, ExportError> {
        let id = activity.id.as_str();
        let mut rows = 0;

        if activity.has_position_data {
            let coordinates = self.store.retrieve_activity_coordinates(id)?;
            let distances = self.store.retrieve_activity_distances(id)?;
            validate_position_streams(&coordinates, &distances)?;

            let titles = [
                attribute::ELAPSED_TIME,
                attribute::LATITUDE,
                attribute::LONGITUDE,
                attribute::ALTITUDE,
                attribute::DISTANCE_TRAVELED,
            ];
            let mut table = csv.table(&titles);
            for (i, c) in coordinates.iter().enumerate() {
                let distance = match i {
                    0 => 0.0,
                    _ => distances[i - 1].distance_meters,
                };
                table.write_row(&[
                    c.time_ms as f64,
                    c.latitude,
                    c.longitude,
                    c.altitude_meters,
                    distance,
                ])?;
            }
            rows += table.rows();
        }

        let accelerometer = self
            .store
            .retrieve_sensor_readings_of_type(id, SensorKind::Accelerometer)?;
        let titles = [attribute::ELAPSED_TIME, attribute::X, attribute::Y, attribute::Z];
        let mut table = csv.table(&titles);
        for reading in &accelerometer {
            table.write_row_with_gaps(&[
                Some(reading.time_ms as f64),
                reading.value(attribute::X),
                reading.value(attribute::Y),
                reading.value(attribute::Z),
            ])?;
        }
        rows += table.rows();

        for (kind, key) in [
            (SensorKind::HeartRate, attribute::HEART_RATE),
            (SensorKind::Cadence, attribute::CADENCE),
        ] {
            let readings = self.store.retrieve_sensor_readings_of_type(id, kind)?;
            let titles = [attribute::ELAPSED_TIME, key];
            let mut table = csv.table(&titles);
            for reading in &readings {
                table.write_row_with_gaps(&[Some(reading.time_ms as f64), reading.value(key)])?;
            }
            rows += table.rows();
        }

        Ok(rows)
    }
}

/// Positions must strictly increase in time and carry one distance per
/// sample after the first.
fn validate_position_streams(
    coordinates: &[Coordinate],
    distances: &[TimeDistancePair],
) -> Result<(), ExportError> {
    let expected = coordinates.len().saturating_sub(1);
    if distances.len() != expected {
        return Err(ExportError::MalformedSource(format!(
            "{} distance entries for {} position samples",
            distances.len(),
            coordinates.len()
        )));
    }

    if let Some(pair) = coordinates
        .windows(2)
        .find(|pair| pair[1].time_ms <= pair[0].time_ms)
    {
        return Err(ExportError::MalformedSource(format!(
            "position timestamps not increasing at {}",
            pair[1].time_ms
        )));
    }

    Ok(())
}

/// Source of coordinates for a live export.
pub trait CoordinateProducer {
    /// The next coordinate of the activity, `None` at end of stream.
    fn next_coordinate(&mut self, activity_id: &str) -> Option<Coordinate>;
}

impl<F> CoordinateProducer for F
where
    F: FnMut(&str) -> Option<Coordinate>,
{
    fn next_coordinate(&mut self, activity_id: &str) -> Option<Coordinate> {
        self(activity_id)
    }
}

/// An activity that only exists as a coordinate stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveActivity {
    pub id: String,
    pub name: String,
    pub activity_type: String,
    /// Unix time in milliseconds
    pub start_time_ms: u64,
    /// Ascending timestamps at which a lap ends; empty for a single lap
    pub lap_end_hints: Vec<u64>,
}

/// Exporter for activities without a backing store.
#[derive(Debug, Clone)]
pub struct LiveExporter {
    creator: String,
}

impl Default for LiveExporter {
    fn default() -> Self {
        Self {
            creator: DEFAULT_CREATOR.to_string(),
        }
    }
}

impl LiveExporter {
    pub fn new(creator: impl Into<String>) -> Self {
        Self {
            creator: creator.into(),
        }
    }

    /// Export a live activity, pulling coordinates until the producer is exhausted.
    pub fn export<P>(
        &self,
        format: ExportFormat,
        output_dir: &Path,
        activity: &LiveActivity,
        producer: &mut P,
    ) -> Result<PathBuf, ExportError>
    where
        P: CoordinateProducer + ?Sized,
    {
        if !format.supports_live() {
            return Err(ExportError::UnsupportedFormat(format!(
                "{} is not available for live export",
                format
            )));
        }
        if let Some(pair) = activity
            .lap_end_hints
            .windows(2)
            .find(|pair| pair[1] <= pair[0])
        {
            return Err(ExportError::MalformedSource(format!(
                "lap end hints not ascending at {}",
                pair[1]
            )));
        }

        info!(activity_id = %activity.id, format = %format, "Exporting live activity");

        let path = output_dir.join(generate_file_name(
            format,
            activity.start_time_ms,
            &activity.activity_type,
        ));

        let records = match format {
            ExportFormat::Tcx => write_atomically(&path, |file| {
                let mut writer = TcxWriter::create(BufWriter::new(file))?;
                let records = self.write_live_document(&mut writer, activity, producer)?;
                Ok((into_file(writer.close()?)?, records))
            })?,
            ExportFormat::Gpx => write_atomically(&path, |file| {
                let mut writer = GpxWriter::create(BufWriter::new(file))?;
                let records = self.write_live_document(&mut writer, activity, producer)?;
                Ok((into_file(writer.close()?)?, records))
            })?,
            other => return Err(ExportError::UnsupportedFormat(other.to_string())),
        };

        info!(
            activity_id = %activity.id,
            path = %path.display(),
            records,
            "Live export complete"
        );

        Ok(path)
    }

    /// Buffer one lap of coordinates at a time, then write it with its
    /// aggregates ahead of the trackpoints.
    fn write_live_document<T, P>(
        &self,
        writer: &mut T,
        activity: &LiveActivity,
        producer: &mut P,
    ) -> Result<usize, ExportError>
    where
        T: TrackWriter,
        P: CoordinateProducer + ?Sized,
    {
        writer.start_document(&DocumentHeader {
            activity_type: activity.activity_type.clone(),
            name: activity.name.clone(),
            start_time_ms: activity.start_time_ms,
            creator: self.creator.clone(),
        })?;

        let mut hints = activity.lap_end_hints.iter().copied().peekable();
        let mut pending = producer.next_coordinate(&activity.id);
        let mut previous: Option<Coordinate> = None;
        let mut cumulative = 0.0;
        let mut lap_number: u16 = 0;
        let mut written = 0;

        while let Some(first) = pending.take() {
            // Hints already crossed before this lap's first fix would yield empty laps.
            while hints.next_if(|&end| end <= first.time_ms).is_some() {}
            let lap_end = hints.next();

            let mut buffer: Vec<Coordinate> = Vec::new();
            let mut current = Some(first);
            while let Some(c) = current {
                if let Some(last) = buffer.last().or(previous.as_ref()) {
                    if c.time_ms <= last.time_ms {
                        return Err(ExportError::MalformedSource(format!(
                            "live coordinate at {} not after {}",
                            c.time_ms, last.time_ms
                        )));
                    }
                }
                if lap_end.is_some_and(|end| c.time_ms >= end) {
                    pending = Some(c);
                    break;
                }
                buffer.push(c);
                current = producer.next_coordinate(&activity.id);
            }

            lap_number = lap_number.checked_add(1).ok_or_else(|| {
                ExportError::MalformedSource("too many laps in live export".to_string())
            })?;

            // The first lap opens with the activity.
            let start_ms = if lap_number == 1 {
                activity.start_time_ms.min(first.time_ms)
            } else {
                first.time_ms
            };
            let last_ms = buffer.last().map(|c| c.time_ms).unwrap_or(start_ms);
            let window = LapWindow {
                number: lap_number,
                start_ms,
                end_ms: lap_end.unwrap_or(last_ms).max(last_ms),
                is_last: pending.is_none(),
            };

            writer.start_lap(&LapHeader {
                window,
                aggregates: LapAggregates::from_coordinates(&buffer),
            })?;
            writer.start_track()?;
            for c in &buffer {
                if let Some(p) = previous {
                    cumulative += haversine_distance(&p, c);
                }
                writer.write_record(&TrackRecord {
                    distance_meters: Some(cumulative),
                    ..TrackRecord::position_only(*c)
                })?;
                previous = Some(*c);
            }
            writer.end_track()?;
            writer.end_lap()?;

            debug!(lap = lap_number, records = buffer.len(), "Live lap written");
            written += buffer.len();
        }

        if lap_number == 0 {
            warn!(activity_id = %activity.id, "Live producer yielded no coordinates");
            // A document carries at least one lap, even an empty one.
            let window = LapWindow {
                number: 1,
                start_ms: activity.start_time_ms,
                end_ms: activity.start_time_ms,
                is_last: true,
            };
            writer.start_lap(&LapHeader {
                window,
                aggregates: LapAggregates::from_coordinates(&[]),
            })?;
            writer.start_track()?;
            writer.end_track()?;
            writer.end_lap()?;
        }

        writer.end_document()?;
        Ok(written)
    }
}

/// Recover the file from a buffered sink, flushing what is left.
fn into_file(sink: BufWriter<File>) -> Result<File, ExportError> {
    sink.into_inner()
        .map_err(|e| ExportError::IoError(e.into_error()))
}

/// Run `write` against a temporary file next to `path` and rename it into
/// place on success. The temporary file is removed on any failure.
pub(crate) fn write_atomically<T, F>(path: &Path, write: F) -> Result<T, ExportError>
where
    F: FnOnce(File) -> Result<(File, T), ExportError>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .map_err(ExportError::from)
        .and_then(write)
        .and_then(|(file, value)| {
            file.sync_all()?;
            drop(file);
            std::fs::rename(&temp_path, path)?;
            Ok(value)
        });

    if result.is_err() && temp_path.exists() {
        warn!(path = %temp_path.display(), "Removing partial export");
        if let Err(e) = std::fs::remove_file(&temp_path) {
            warn!(path = %temp_path.display(), error = %e, "Failed to remove partial export");
        }
    }

    result
}
