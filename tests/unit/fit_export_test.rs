use std::collections::HashMap;
use std::io::Cursor;

use activity_export::export::writer::fit::{
    calculate_crc, degrees_to_semicircles, FIT_EPOCH_OFFSET, FIT_INVALID_UINT8,
};
use activity_export::export::types::{
    attribute, ActivityRecord, Coordinate, SensorKind, SensorReading, TimeDistancePair,
};
use activity_export::export::writer::FitWriter;
use activity_export::{ExportEngine, ExportFormat, MemoryStore};

use super::{record, write_laps, START_MS};

const RECORD: u16 = 20;
const LAP: u16 = 19;
const SESSION: u16 = 18;
const FILE_ID: u16 = 0;

/// A decoded data message: global number plus raw bytes per field number.
#[derive(Debug)]
struct Message {
    global: u16,
    fields: HashMap<u8, Vec<u8>>,
}

impl Message {
    fn u8(&self, field: u8) -> u8 {
        self.fields[&field][0]
    }

    fn u16(&self, field: u8) -> u16 {
        let b = &self.fields[&field];
        u16::from_le_bytes([b[0], b[1]])
    }

    fn u32(&self, field: u8) -> u32 {
        let b = &self.fields[&field];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn i32(&self, field: u8) -> i32 {
        self.u32(field) as i32
    }
}

/// Decode the data messages of a little-endian FIT file without developer fields.
fn decode(data: &[u8]) -> Vec<Message> {
    let header_size = data[0] as usize;
    let data_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let end = header_size + data_size;

    let mut definitions: HashMap<u8, (u16, Vec<(u8, u8)>)> = HashMap::new();
    let mut messages = Vec::new();
    let mut pos = header_size;

    while pos < end {
        let record_header = data[pos];
        pos += 1;
        let local = record_header & 0x0F;

        if record_header & 0x40 != 0 {
            assert_eq!(data[pos + 1], 0, "expected little-endian architecture");
            let global = u16::from_le_bytes([data[pos + 2], data[pos + 3]]);
            let count = data[pos + 4] as usize;
            pos += 5;
            let fields = (0..count)
                .map(|i| (data[pos + i * 3], data[pos + i * 3 + 1]))
                .collect();
            pos += count * 3;
            definitions.insert(local, (global, fields));
        } else {
            let (global, layout) = definitions
                .get(&local)
                .unwrap_or_else(|| panic!("data message for undefined local {}", local));
            let mut fields = HashMap::new();
            for &(number, size) in layout {
                fields.insert(number, data[pos..pos + size as usize].to_vec());
                pos += size as usize;
            }
            messages.push(Message {
                global: *global,
                fields,
            });
        }
    }

    assert_eq!(pos, end, "messages overrun the declared data size");
    messages
}

fn fit_time(time_ms: u64) -> u32 {
    (time_ms / 1000) as u32 - FIT_EPOCH_OFFSET as u32
}

fn export() -> Vec<u8> {
    let laps = vec![
        vec![
            record(0, 45.0712345, 7.6856789, Some(121.0)),
            record(5, 45.0713001, 7.6857002, None),
        ],
        vec![record(10, -33.8688197, 151.2092955, Some(140.0))],
    ];
    write_laps(FitWriter::create(Cursor::new(Vec::new())).unwrap(), "Running", &laps).into_inner()
}

#[test]
fn test_fit_header_and_crc() {
    let data = export();

    assert_eq!(data[0], 14);
    assert_eq!(&data[8..12], b".FIT");
    let data_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    assert_eq!(data.len(), 14 + data_size + 2);

    let header_crc = u16::from_le_bytes([data[12], data[13]]);
    assert_eq!(header_crc, calculate_crc(&data[..12]));
    // A file followed by its own CRC checks to zero.
    assert_eq!(calculate_crc(&data), 0);
}

#[test]
fn test_fit_records_carry_encoded_values() {
    let messages = decode(&export());

    assert_eq!(messages[0].global, FILE_ID);
    assert_eq!(messages[0].u32(4), fit_time(START_MS));

    let records: Vec<&Message> = messages.iter().filter(|m| m.global == RECORD).collect();
    assert_eq!(records.len(), 3);

    let first = records[0];
    assert_eq!(first.u32(253), fit_time(START_MS));
    assert_eq!(first.i32(0), degrees_to_semicircles(45.0712345));
    assert_eq!(first.i32(1), degrees_to_semicircles(7.6856789));
    // (312.5 + 500) * 5
    assert_eq!(first.u16(2), 4063);
    assert_eq!(first.u8(3), 121);

    // Missing heart rate is the invalid sentinel, never the previous value.
    assert_eq!(records[1].u8(3), FIT_INVALID_UINT8);
    assert_eq!(records[1].u32(5), 2000);

    assert!(records[2].i32(0) < 0);
    assert_eq!(records[2].i32(1), degrees_to_semicircles(151.2092955));
    assert_eq!(records[2].u32(253), fit_time(START_MS + 10_000));
}

#[test]
fn test_fit_laps_follow_their_records() {
    let messages = decode(&export());
    let globals: Vec<u16> = messages
        .iter()
        .map(|m| m.global)
        .filter(|g| [RECORD, LAP, SESSION].contains(g))
        .collect();

    assert_eq!(globals, vec![RECORD, RECORD, LAP, RECORD, LAP, SESSION]);

    let laps: Vec<&Message> = messages.iter().filter(|m| m.global == LAP).collect();
    assert_eq!(laps[0].u16(254), 0);
    assert_eq!(laps[0].u32(2), fit_time(START_MS));
    assert_eq!(laps[0].u32(7), 5000);
    assert_eq!(laps[0].u32(9), 10_000);
    assert_eq!(laps[0].u16(11), 12);
    assert_eq!(laps[0].u8(25), 1);
    assert_eq!(laps[1].u16(254), 1);

    let session = messages.iter().find(|m| m.global == SESSION).unwrap();
    assert_eq!(session.u16(26), 2);
    assert_eq!(session.u16(11), 24);
    assert_eq!(session.u32(9), 30_000);
    assert_eq!(session.u8(5), 1);
}

/// Ten fixes over 9 s with a single heart rate reading far past the last one.
fn sparse_heart_rate_store() -> MemoryStore {
    let id = "ride-sparse";
    let mut store = MemoryStore::new();
    store.insert_activity(ActivityRecord {
        id: id.to_string(),
        name: "Morning Loop".to_string(),
        activity_type: "Cycling".to_string(),
        start_time_ms: START_MS,
        end_time_ms: START_MS + 9000,
        has_position_data: true,
    });
    let coordinates = (0..10)
        .map(|i| Coordinate::new(45.0 + i as f64 * 0.0001, 7.0, 312.5, START_MS + i * 1000))
        .collect();
    store.set_coordinates(id, coordinates).unwrap();
    let distances = (1..10)
        .map(|i| TimeDistancePair::new(START_MS + i * 1000, i as f64 * 15.0))
        .collect();
    store.set_distances(id, distances).unwrap();
    store
        .set_readings(
            id,
            SensorKind::HeartRate,
            vec![SensorReading::new(START_MS + 20_000).with_value(attribute::HEART_RATE, 150.0)],
        )
        .unwrap();
    store
}

#[test]
fn test_fit_export_marks_unmatched_heart_rate_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ExportEngine::new(sparse_heart_rate_store());

    let path = engine
        .export_activity(ExportFormat::Fit, dir.path(), "ride-sparse")
        .unwrap();
    let data = std::fs::read(&path).unwrap();
    assert_eq!(calculate_crc(&data), 0);

    let messages = decode(&data);
    let records: Vec<&Message> = messages.iter().filter(|m| m.global == RECORD).collect();
    assert_eq!(records.len(), 10);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.u8(3), FIT_INVALID_UINT8, "record {} has a heart rate", i);
        assert_eq!(record.u32(253), fit_time(START_MS + i as u64 * 1000));
        assert_eq!(record.u32(5), i as u32 * 1500);
    }
}
