//! Integration tests for store-backed exports.

use activity_export::export::types::{attribute, AttributeValue, SensorKind, SensorReading};
use activity_export::{ExportEngine, ExportError, ExportFormat, MemoryStore};

use super::fixtures::{
    activity, coordinates, dir_entries, distances, heart_rate_readings, moving_store, ACTIVITY_ID,
    START_MS,
};

#[test]
fn test_tcx_export_writes_laps_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ExportEngine::new(moving_store());

    let path = engine
        .export_activity(ExportFormat::Tcx, dir.path(), ACTIVITY_ID)
        .unwrap();

    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.ends_with("-Cycling.tcx"), "unexpected name {}", name);
    assert_eq!(dir_entries(dir.path()), vec![name]);

    let xml = std::fs::read_to_string(&path).unwrap();
    assert_eq!(xml.matches("<Lap StartTime=").count(), 2);
    assert_eq!(xml.matches("<Trackpoint>").count(), 10);
    assert!(xml.contains("<TotalTimeSeconds>5.0</TotalTimeSeconds>"));
    assert!(xml.contains("<TotalTimeSeconds>4.0</TotalTimeSeconds>"));
    assert!(xml.contains("<Activity Sport=\"Biking\">"));

    // Trackpoints inside the heart rate stream pick up the nearest reading;
    // the first and last fix fall outside it and carry none.
    assert_eq!(xml.matches("<HeartRateBpm>").count(), 8);
    assert_eq!(xml.matches("<Value>130</Value>").count(), 1);
    assert_eq!(xml.matches("<Value>134</Value>").count(), 1);

    // Lap aggregates precede the lap's track.
    let second_lap = xml.find("<TotalTimeSeconds>4.0</TotalTimeSeconds>").unwrap();
    let tracks: Vec<usize> = xml.match_indices("<Track>").map(|(i, _)| i).collect();
    assert_eq!(tracks.len(), 2);
    assert!(tracks[0] < second_lap && second_lap < tracks[1]);
}

#[test]
fn test_missing_heart_rate_is_never_stale() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = moving_store();
    store
        .set_readings(ACTIVITY_ID, SensorKind::HeartRate, heart_rate_readings(&[20_000]))
        .unwrap();
    let engine = ExportEngine::new(store);

    let path = engine
        .export_activity(ExportFormat::Tcx, dir.path(), ACTIVITY_ID)
        .unwrap();
    let xml = std::fs::read_to_string(path).unwrap();
    assert_eq!(xml.matches("<Trackpoint>").count(), 10);
    assert!(!xml.contains("HeartRateBpm"));

    let path = engine
        .export_activity(ExportFormat::Gpx, dir.path(), ACTIVITY_ID)
        .unwrap();
    let xml = std::fs::read_to_string(path).unwrap();
    assert_eq!(xml.matches("<trkpt ").count(), 10);
    assert!(!xml.contains("gpxtpx:hr"));
}

#[test]
fn test_single_lap_aggregate_matches_activity() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = moving_store();
    store.set_laps(ACTIVITY_ID, vec![]).unwrap();
    let engine = ExportEngine::new(store);

    let path = engine
        .export_activity(ExportFormat::Tcx, dir.path(), ACTIVITY_ID)
        .unwrap();
    let xml = std::fs::read_to_string(path).unwrap();

    assert_eq!(xml.matches("<Lap StartTime=").count(), 1);
    assert!(xml.contains("<TotalTimeSeconds>9.0</TotalTimeSeconds>"));
    // Final cumulative distance of the activity.
    let lap_start = xml.find("<Lap StartTime=").unwrap();
    let track = xml.find("<Track>").unwrap();
    assert!(xml[lap_start..track].contains("<DistanceMeters>135.00</DistanceMeters>"));
}

#[test]
fn test_stored_lap_attributes_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = moving_store();
    store
        .set_attribute(ACTIVITY_ID, "LapCalories1", AttributeValue::Integer(31))
        .unwrap();
    store
        .set_attribute(ACTIVITY_ID, "LapDistance2", AttributeValue::Double(80.25))
        .unwrap();
    let engine = ExportEngine::new(store);

    let path = engine
        .export_activity(ExportFormat::Tcx, dir.path(), ACTIVITY_ID)
        .unwrap();
    let xml = std::fs::read_to_string(path).unwrap();

    assert!(xml.contains("<Calories>31</Calories>"));
    // Lap 2 has no stored calories and gets the placeholder.
    assert!(xml.contains("<Calories>0</Calories>"));
    assert!(xml.contains("<DistanceMeters>80.25</DistanceMeters>"));
}

#[test]
fn test_csv_without_positions_emits_only_heart_rate_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore::new();
    store.insert_activity(activity(10, false));
    store
        .set_readings(ACTIVITY_ID, SensorKind::HeartRate, heart_rate_readings(&[0, 1000, 2000]))
        .unwrap();
    let engine = ExportEngine::new(store);

    let path = engine
        .export_activity(ExportFormat::Csv, dir.path(), ACTIVITY_ID)
        .unwrap();
    let csv = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Elapsed Time,Heart Rate");
    assert_eq!(lines[1], format!("{},130", START_MS));
    assert_eq!(lines[3], format!("{},132", START_MS + 2000));
}

#[test]
fn test_csv_tables_follow_fixed_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = moving_store();
    store
        .set_readings(
            ACTIVITY_ID,
            SensorKind::Cadence,
            vec![SensorReading::new(START_MS).with_value(attribute::CADENCE, 88.0)],
        )
        .unwrap();
    store
        .set_readings(
            ACTIVITY_ID,
            SensorKind::Accelerometer,
            vec![SensorReading::new(START_MS)
                .with_value(attribute::X, 0.5)
                .with_value(attribute::Z, 9.75)],
        )
        .unwrap();
    let engine = ExportEngine::new(store);

    let path = engine
        .export_activity(ExportFormat::Csv, dir.path(), ACTIVITY_ID)
        .unwrap();
    let csv = std::fs::read_to_string(path).unwrap();
    let titles: Vec<&str> = csv
        .lines()
        .filter(|l| l.starts_with("Elapsed Time"))
        .collect();

    assert_eq!(
        titles,
        vec![
            "Elapsed Time,Latitude,Longitude,Altitude,Distance Traveled",
            "Elapsed Time,x,y,z",
            "Elapsed Time,Heart Rate",
            "Elapsed Time,Cadence",
        ]
    );
    assert!(csv.contains(&format!("{},0.5,-,9.75", START_MS)));
    // First position row carries zero distance.
    let first_row = csv.lines().nth(1).unwrap();
    assert!(first_row.ends_with(",0"), "row was {}", first_row);
}

#[test]
fn test_unknown_activity_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ExportEngine::new(MemoryStore::new());

    let result = engine.export_activity(ExportFormat::Gpx, dir.path(), "missing");
    assert!(matches!(result, Err(ExportError::NotFound(_))));
}

#[test]
fn test_track_formats_require_position_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore::new();
    store.insert_activity(activity(10, false));
    let engine = ExportEngine::new(store);

    for format in [ExportFormat::Tcx, ExportFormat::Gpx, ExportFormat::Fit] {
        let result = engine.export_activity(format, dir.path(), ACTIVITY_ID);
        assert!(matches!(result, Err(ExportError::UnsupportedFormat(_))));
    }
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_mismatched_distances_abort_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore::new();
    store.insert_activity(activity(10, true));
    store.set_coordinates(ACTIVITY_ID, coordinates(10)).unwrap();
    store.set_distances(ACTIVITY_ID, distances(5)).unwrap();
    let engine = ExportEngine::new(store);

    for format in [ExportFormat::Tcx, ExportFormat::Fit, ExportFormat::Csv] {
        let result = engine.export_activity(format, dir.path(), ACTIVITY_ID);
        assert!(matches!(result, Err(ExportError::MalformedSource(_))));
    }
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_fit_export_is_self_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ExportEngine::new(moving_store());

    let path = engine
        .export_activity(ExportFormat::Fit, dir.path(), ACTIVITY_ID)
        .unwrap();
    assert!(path.to_string_lossy().ends_with(".fit"));

    let data = std::fs::read(path).unwrap();
    let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    assert_eq!(data.len(), 14 + size + 2);
    assert_eq!(
        activity_export::export::writer::fit::calculate_crc(&data),
        0
    );
}
