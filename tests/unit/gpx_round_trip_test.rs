use activity_export::export::writer::GpxWriter;
use chrono::DateTime;
use serde::Deserialize;

use super::{record, write_laps, START_MS};

#[derive(Debug, Deserialize)]
struct Gpx {
    #[serde(rename = "@creator")]
    creator: String,
    metadata: Metadata,
    trk: Trk,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    time: String,
}

#[derive(Debug, Deserialize)]
struct Trk {
    name: String,
    #[serde(rename = "type")]
    activity_type: Option<String>,
    #[serde(rename = "trkseg", default)]
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(rename = "trkpt", default)]
    points: Vec<TrackPoint>,
}

#[derive(Debug, Deserialize)]
struct TrackPoint {
    #[serde(rename = "@lat")]
    lat: f64,
    #[serde(rename = "@lon")]
    lon: f64,
    ele: f64,
    time: String,
}

fn millis(rfc3339: &str) -> u64 {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .timestamp_millis() as u64
}

fn parse(bytes: Vec<u8>) -> Gpx {
    let xml = String::from_utf8(bytes).unwrap();
    quick_xml::de::from_str(&xml).unwrap()
}

#[test]
fn test_gpx_reads_back_points_per_segment() {
    let laps = vec![
        vec![
            record(0, 51.5007292, -0.1246254, Some(98.0)),
            record(2, 51.5007310, -0.1246101, None),
            record(4, 51.5007411, -0.1245987, Some(101.0)),
        ],
        vec![record(6, 51.5007502, -0.1245850, None)],
    ];

    let gpx = parse(write_laps(GpxWriter::create(Vec::new()).unwrap(), "Hiking", &laps));

    assert_eq!(gpx.creator, "unit-tests");
    assert_eq!(millis(&gpx.metadata.time), START_MS);
    assert_eq!(gpx.trk.name, "Morning Loop");
    assert_eq!(gpx.trk.activity_type.as_deref(), Some("Hiking"));
    assert_eq!(gpx.trk.segments.len(), 2);
    assert_eq!(gpx.trk.segments[0].points.len(), 3);
    assert_eq!(gpx.trk.segments[1].points.len(), 1);

    let written = laps.iter().flatten();
    let read = gpx.trk.segments.iter().flat_map(|s| s.points.iter());
    for (w, r) in written.zip(read) {
        assert!((r.lat - w.coordinate.latitude).abs() < 1e-6);
        assert!((r.lon - w.coordinate.longitude).abs() < 1e-6);
        assert!((r.ele - w.coordinate.altitude_meters).abs() < 1e-9);
        assert_eq!(millis(&r.time), w.coordinate.time_ms);
    }
}

#[test]
fn test_gpx_extensions_only_for_present_values() {
    let laps = vec![vec![
        record(0, 10.0, 20.0, Some(150.0)),
        record(1, 10.0001, 20.0001, None),
    ]];

    let bytes = write_laps(GpxWriter::create(Vec::new()).unwrap(), "Running", &laps);
    let xml = String::from_utf8(bytes).unwrap();

    assert_eq!(xml.matches("<extensions>").count(), 1);
    assert!(xml.contains("<gpxtpx:hr>150</gpxtpx:hr>"));
    assert!(!xml.contains("gpxtpx:cad"));
}
