//! Integration tests for exports driven by a coordinate producer.

use activity_export::export::types::Coordinate;
use activity_export::{ExportError, ExportFormat, LiveActivity, LiveExporter};

use super::fixtures::{coordinates, dir_entries, ACTIVITY_ID, START_MS};

fn live_activity(lap_end_hints: Vec<u64>) -> LiveActivity {
    LiveActivity {
        id: ACTIVITY_ID.to_string(),
        name: "Evening Run".to_string(),
        activity_type: "Running".to_string(),
        start_time_ms: START_MS,
        lap_end_hints,
    }
}

#[test]
fn test_live_tcx_cuts_laps_at_hints() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![START_MS + 3000, START_MS + 7000]);
    let mut points = coordinates(10).into_iter();
    let mut producer = |_: &str| points.next();

    let path = LiveExporter::default()
        .export(ExportFormat::Tcx, dir.path(), &activity, &mut producer)
        .unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("<Activity Sport=\"Running\">"));
    assert_eq!(xml.matches("<Lap StartTime=").count(), 3);
    assert_eq!(xml.matches("<Trackpoint>").count(), 10);
    // Three fixes one second apart in the first lap.
    assert!(xml.contains("<TotalTimeSeconds>2.0</TotalTimeSeconds>"));
    // The crossing fix opens the next lap.
    assert!(xml.contains("<TotalTimeSeconds>3.0</TotalTimeSeconds>"));
    assert_eq!(dir_entries(dir.path()).len(), 1);
}

#[test]
fn test_live_gpx_without_hints_is_one_segment() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![]);
    let mut points = coordinates(6).into_iter();
    let mut producer = |_: &str| points.next();

    let path = LiveExporter::new("test-suite")
        .export(ExportFormat::Gpx, dir.path(), &activity, &mut producer)
        .unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("creator=\"test-suite\""));
    assert_eq!(xml.matches("<trkseg>").count(), 1);
    assert_eq!(xml.matches("<trkpt ").count(), 6);
}

#[test]
fn test_stale_hints_do_not_create_empty_laps() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![START_MS - 5000, START_MS - 1000, START_MS + 2000]);
    let mut points = coordinates(4).into_iter();
    let mut producer = |_: &str| points.next();

    let path = LiveExporter::default()
        .export(ExportFormat::Tcx, dir.path(), &activity, &mut producer)
        .unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert_eq!(xml.matches("<Lap StartTime=").count(), 2);
    assert_eq!(xml.matches("<Trackpoint>").count(), 4);
}

#[test]
fn test_live_fit_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![]);
    let mut producer = |_: &str| -> Option<Coordinate> { None };

    for format in [ExportFormat::Fit, ExportFormat::Csv] {
        let result = LiveExporter::default().export(format, dir.path(), &activity, &mut producer);
        assert!(matches!(result, Err(ExportError::UnsupportedFormat(_))));
    }
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_empty_producer_writes_one_empty_lap() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![START_MS + 1000]);
    let mut producer = |_: &str| -> Option<Coordinate> { None };

    let path = LiveExporter::default()
        .export(ExportFormat::Tcx, dir.path(), &activity, &mut producer)
        .unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert!(xml.contains("TrainingCenterDatabase"));
    assert_eq!(xml.matches("<Lap StartTime=").count(), 1);
    assert!(xml.contains("<Lap StartTime=\"2023-11-14T22:13:20.000Z\">"));
    assert!(xml.contains("<TotalTimeSeconds>0.0</TotalTimeSeconds>"));
    assert!(!xml.contains("<Track>"));
    assert!(!xml.contains("<Trackpoint>"));
}

#[test]
fn test_first_lap_starts_with_the_activity() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![START_MS + 7000]);
    let mut points = coordinates(10).into_iter().skip(4);
    let mut producer = |_: &str| points.next();

    let path = LiveExporter::default()
        .export(ExportFormat::Tcx, dir.path(), &activity, &mut producer)
        .unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    assert_eq!(xml.matches("<Lap StartTime=").count(), 2);
    assert!(xml.contains("<Id>2023-11-14T22:13:20.000Z</Id>"));
    // The first fix arrives four seconds in; the lap still opens at the start.
    assert!(xml.contains("<Lap StartTime=\"2023-11-14T22:13:20.000Z\">"));
    // Later laps open at their first fix.
    assert!(xml.contains("<Lap StartTime=\"2023-11-14T22:13:27.000Z\">"));
    assert_eq!(xml.matches("<Trackpoint>").count(), 6);
}

#[test]
fn test_out_of_order_stream_aborts_export() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![]);
    let mut points = coordinates(5);
    points.swap(2, 3);
    let mut points = points.into_iter();
    let mut producer = |_: &str| points.next();

    let result = LiveExporter::default().export(ExportFormat::Gpx, dir.path(), &activity, &mut producer);
    assert!(matches!(result, Err(ExportError::MalformedSource(_))));
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_descending_hints_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let activity = live_activity(vec![START_MS + 5000, START_MS + 2000]);
    let mut points = coordinates(3).into_iter();
    let mut producer = |_: &str| points.next();

    let result = LiveExporter::default().export(ExportFormat::Tcx, dir.path(), &activity, &mut producer);
    assert!(matches!(result, Err(ExportError::MalformedSource(_))));
}
