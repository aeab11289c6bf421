//! Unit tests for the format writers, read back with independent parsers.

mod fit_export_test;
mod gpx_round_trip_test;

use activity_export::export::laps::{LapAggregates, LapWindow};
use activity_export::export::types::Coordinate;
use activity_export::export::writer::{DocumentHeader, LapHeader, TrackRecord, TrackWriter};

pub const START_MS: u64 = 1_714_548_600_000; // 2024-05-01T07:30:00Z

pub fn header(activity_type: &str) -> DocumentHeader {
    DocumentHeader {
        activity_type: activity_type.to_string(),
        name: "Morning Loop".to_string(),
        start_time_ms: START_MS,
        creator: "unit-tests".to_string(),
    }
}

/// A record `offset_s` seconds into the activity.
pub fn record(offset_s: u64, latitude: f64, longitude: f64, heart_rate: Option<f64>) -> TrackRecord {
    TrackRecord {
        coordinate: Coordinate::new(latitude, longitude, 312.5, START_MS + offset_s * 1000),
        distance_meters: Some(offset_s as f64 * 4.0),
        heart_rate,
        cadence: None,
        power: None,
    }
}

/// Drive `writer` through one lap per slice of records and close it.
pub fn write_laps<T: TrackWriter>(
    mut writer: T,
    activity_type: &str,
    laps: &[Vec<TrackRecord>],
) -> T::Sink {
    writer.start_document(&header(activity_type)).unwrap();
    for (i, records) in laps.iter().enumerate() {
        let start_ms = records.first().map(|r| r.coordinate.time_ms).unwrap_or(START_MS);
        let end_ms = records.last().map(|r| r.coordinate.time_ms).unwrap_or(START_MS);
        writer
            .start_lap(&LapHeader {
                window: LapWindow {
                    number: i as u16 + 1,
                    start_ms,
                    end_ms,
                    is_last: i + 1 == laps.len(),
                },
                aggregates: LapAggregates {
                    total_time_seconds: (end_ms - start_ms) as f64 / 1000.0,
                    distance_meters: 100.0 * (i + 1) as f64,
                    calories: Some(12),
                },
            })
            .unwrap();
        writer.start_track().unwrap();
        for r in records {
            writer.write_record(r).unwrap();
        }
        writer.end_track().unwrap();
        writer.end_lap().unwrap();
    }
    writer.end_document().unwrap();
    writer.close().unwrap()
}
