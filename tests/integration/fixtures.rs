//! Shared activity fixtures.

use activity_export::export::types::{
    attribute, ActivityRecord, Coordinate, LapBoundary, SensorKind, SensorReading,
    TimeDistancePair,
};
use activity_export::MemoryStore;

pub const START_MS: u64 = 1_700_000_000_000;
pub const ACTIVITY_ID: &str = "ride-1";

/// Meters covered between consecutive fixes.
pub const STEP_METERS: f64 = 15.0;

pub fn activity(point_count: u64, has_position_data: bool) -> ActivityRecord {
    ActivityRecord {
        id: ACTIVITY_ID.to_string(),
        name: "Lunch Ride".to_string(),
        activity_type: "Cycling".to_string(),
        start_time_ms: START_MS,
        end_time_ms: START_MS + point_count.saturating_sub(1) * 1000,
        has_position_data,
    }
}

/// One fix per second starting at the activity start.
pub fn coordinates(count: u64) -> Vec<Coordinate> {
    (0..count)
        .map(|i| {
            Coordinate::new(
                45.123_456_7 + i as f64 * 0.000_1,
                7.654_321 + i as f64 * 0.000_1,
                200.0 + i as f64 * 0.5,
                START_MS + i * 1000,
            )
        })
        .collect()
}

pub fn distances(count: u64) -> Vec<TimeDistancePair> {
    (1..count)
        .map(|i| TimeDistancePair::new(START_MS + i * 1000, i as f64 * STEP_METERS))
        .collect()
}

pub fn heart_rate_readings(offsets_ms: &[u64]) -> Vec<SensorReading> {
    offsets_ms
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            SensorReading::new(START_MS + offset).with_value(attribute::HEART_RATE, 130.0 + i as f64)
        })
        .collect()
}

/// Ten fixes over 9 s, a lap boundary at 5 s, heart rate every 2 s.
pub fn moving_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_activity(activity(10, true));
    store.set_coordinates(ACTIVITY_ID, coordinates(10)).unwrap();
    store.set_distances(ACTIVITY_ID, distances(10)).unwrap();
    store
        .set_laps(ACTIVITY_ID, vec![LapBoundary::new(START_MS + 5000)])
        .unwrap();
    store
        .set_readings(
            ACTIVITY_ID,
            SensorKind::HeartRate,
            heart_rate_readings(&[500, 2500, 4500, 6500, 8500]),
        )
        .unwrap();
    store
}

/// Files currently in `dir`, by name.
pub fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
