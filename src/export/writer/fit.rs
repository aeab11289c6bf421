//! FIT binary writer.
//!
//! Implements the FIT (Flexible and Interoperable Data Transfer) activity
//! file layout: a 14-byte header, definition messages, data messages and a
//! trailing CRC-16. The header declares the payload size, which is only
//! known once every record has been streamed, so closing the writer seeks
//! back to patch the header and then re-reads the file to compute the CRC.
//! Sinks that cannot seek can write into a `Cursor<Vec<u8>>` and flush the
//! returned buffer in one go.

use std::io::{Read, Seek, SeekFrom, Write};

use super::{allowed, DocumentHeader, LapHeader, Protocol, TrackRecord, TrackWriter, WriterState};
use crate::export::types::ExportError;

/// FIT epoch offset: FIT timestamps are seconds since 1989-12-31 00:00:00 UTC
pub const FIT_EPOCH_OFFSET: i64 = 631065600;

/// FIT file header size (14 bytes including the header CRC)
const FIT_HEADER_SIZE: u8 = 14;

/// FIT protocol version
const FIT_PROTOCOL_VERSION: u8 = 0x20; // 2.0

/// FIT profile version (21.00)
const FIT_PROFILE_VERSION: u16 = 2100;

/// Invalid-value sentinels per base type
pub const FIT_INVALID_UINT8: u8 = 0xFF;
pub const FIT_INVALID_UINT16: u16 = 0xFFFF;
pub const FIT_INVALID_UINT32: u32 = 0xFFFF_FFFF;
pub const FIT_INVALID_SINT32: i32 = 0x7FFF_FFFF;

/// FIT global message numbers
mod message_type {
    pub const FILE_ID: u16 = 0;
    pub const SESSION: u16 = 18;
    pub const LAP: u16 = 19;
    pub const RECORD: u16 = 20;
    pub const EVENT: u16 = 21;
    pub const ACTIVITY: u16 = 34;
}

/// Local message numbers, one per message layout
mod local {
    pub const FILE_ID: u8 = 0;
    pub const RECORD: u8 = 1;
    pub const EVENT: u8 = 2;
    pub const LAP: u8 = 3;
    pub const SESSION: u8 = 4;
    pub const ACTIVITY: u8 = 5;
}

/// FIT base types
mod base_type {
    pub const ENUM: u8 = 0x00;
    pub const UINT8: u8 = 0x02;
    pub const SINT32: u8 = 0x85;
    pub const UINT16: u8 = 0x84;
    pub const UINT32: u8 = 0x86;
    pub const UINT32Z: u8 = 0x8C;
}

/// Shared field numbers
mod field {
    pub const TIMESTAMP: u8 = 253;
    pub const MESSAGE_INDEX: u8 = 254;
}

/// Record message layout: (field number, size, base type).
const RECORD_FIELDS: [(u8, u8, u8); 8] = [
    (field::TIMESTAMP, 4, base_type::UINT32),
    (0, 4, base_type::SINT32),  // position_lat (semicircles)
    (1, 4, base_type::SINT32),  // position_long (semicircles)
    (2, 2, base_type::UINT16),  // altitude (5 * (m + 500))
    (3, 1, base_type::UINT8),   // heart_rate (bpm)
    (4, 1, base_type::UINT8),   // cadence (rpm)
    (5, 4, base_type::UINT32),  // distance (100 * m)
    (7, 2, base_type::UINT16),  // power (watts)
];

const EVENT_FIELDS: [(u8, u8, u8); 3] = [
    (field::TIMESTAMP, 4, base_type::UINT32),
    (0, 1, base_type::ENUM), // event (timer = 0)
    (1, 1, base_type::ENUM), // event_type (start = 0, stop_all = 4)
];

const LAP_FIELDS: [(u8, u8, u8); 10] = [
    (field::TIMESTAMP, 4, base_type::UINT32),
    (field::MESSAGE_INDEX, 2, base_type::UINT16),
    (0, 1, base_type::ENUM),    // event (lap = 9)
    (1, 1, base_type::ENUM),    // event_type (stop = 1)
    (2, 4, base_type::UINT32),  // start_time
    (7, 4, base_type::UINT32),  // total_elapsed_time (1000 * s)
    (8, 4, base_type::UINT32),  // total_timer_time (1000 * s)
    (9, 4, base_type::UINT32),  // total_distance (100 * m)
    (11, 2, base_type::UINT16), // total_calories
    (25, 1, base_type::ENUM),   // sport
];

const SESSION_FIELDS: [(u8, u8, u8); 13] = [
    (field::TIMESTAMP, 4, base_type::UINT32),
    (field::MESSAGE_INDEX, 2, base_type::UINT16),
    (0, 1, base_type::ENUM),    // event (session = 8)
    (1, 1, base_type::ENUM),    // event_type (stop = 1)
    (2, 4, base_type::UINT32),  // start_time
    (5, 1, base_type::ENUM),    // sport
    (6, 1, base_type::ENUM),    // sub_sport
    (7, 4, base_type::UINT32),  // total_elapsed_time
    (8, 4, base_type::UINT32),  // total_timer_time
    (9, 4, base_type::UINT32),  // total_distance
    (11, 2, base_type::UINT16), // total_calories
    (25, 2, base_type::UINT16), // first_lap_index
    (26, 2, base_type::UINT16), // num_laps
];

const ACTIVITY_FIELDS: [(u8, u8, u8); 7] = [
    (field::TIMESTAMP, 4, base_type::UINT32),
    (0, 4, base_type::UINT32), // total_timer_time
    (1, 2, base_type::UINT16), // num_sessions
    (2, 1, base_type::ENUM),   // type (manual = 0)
    (3, 1, base_type::ENUM),   // event (activity = 26)
    (4, 1, base_type::ENUM),   // event_type (stop = 1)
    (5, 4, base_type::UINT32), // local_timestamp
];

const FILE_ID_FIELDS: [(u8, u8, u8); 5] = [
    (0, 1, base_type::ENUM),    // type (activity = 4)
    (1, 2, base_type::UINT16),  // manufacturer
    (2, 2, base_type::UINT16),  // product
    (3, 4, base_type::UINT32Z), // serial_number
    (4, 4, base_type::UINT32),  // time_created
];

/// Manufacturer id reserved for development tools.
const MANUFACTURER_DEVELOPMENT: u16 = 255;

/// Convert a unix timestamp (seconds) to a FIT timestamp.
///
/// Times before the FIT epoch clamp to zero.
pub fn unix_to_fit_timestamp(unix_seconds: i64) -> u32 {
    (unix_seconds - FIT_EPOCH_OFFSET).clamp(0, u32::MAX as i64) as u32
}

/// Convert degrees to semicircles: `round(degrees * 2^31 / 180)`.
///
/// +180 degrees wraps to the same value as -180.
pub fn degrees_to_semicircles(degrees: f64) -> i32 {
    let semicircles = (degrees * (2_147_483_648.0 / 180.0)).round() as i64;
    semicircles as i32
}

/// Altitude scaled for the FIT record field: `(meters + 500) * 5`.
pub fn encode_altitude(meters: f64) -> f64 {
    (meters + 500.0) * 5.0
}

/// Altitude as stored in the 16-bit record field.
pub fn altitude_field(meters: f64) -> u16 {
    encode_altitude(meters)
        .round()
        .clamp(0.0, (FIT_INVALID_UINT16 - 1) as f64) as u16
}

/// Map an activity type onto the FIT `sport` enum.
pub fn sport_type_to_enum(activity_type: &str) -> u8 {
    let lower = activity_type.to_lowercase();
    if lower.contains("run") {
        1
    } else if lower.contains("cycl") || lower.contains("bik") || lower.contains("ride") {
        2
    } else if lower.contains("swim") {
        5
    } else if lower.contains("walk") {
        11
    } else if lower.contains("hik") {
        17
    } else {
        0
    }
}

/// Map an activity type onto the FIT `sub_sport` enum.
pub fn sub_sport_type_to_enum(activity_type: &str) -> u8 {
    let lower = activity_type.to_lowercase();
    if lower.contains("mountain") {
        8
    } else if lower.contains("trail") {
        3
    } else if lower.contains("indoor") || lower.contains("virtual") {
        6
    } else {
        0
    }
}

/// Calculate the FIT CRC-16 over `data`, continuing from `crc`.
pub fn update_crc(mut crc: u16, data: &[u8]) -> u16 {
    const CRC_TABLE: [u16; 16] = [
        0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
        0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
    ];

    for byte in data {
        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[(*byte & 0xF) as usize];

        let tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[((*byte >> 4) & 0xF) as usize];
    }

    crc
}

/// Calculate the FIT CRC-16 of a byte slice.
pub fn calculate_crc(data: &[u8]) -> u16 {
    update_crc(0, data)
}

fn header_bytes(data_size: u32) -> [u8; FIT_HEADER_SIZE as usize] {
    let mut header = [0u8; FIT_HEADER_SIZE as usize];
    header[0] = FIT_HEADER_SIZE;
    header[1] = FIT_PROTOCOL_VERSION;
    header[2..4].copy_from_slice(&FIT_PROFILE_VERSION.to_le_bytes());
    header[4..8].copy_from_slice(&data_size.to_le_bytes());
    header[8..12].copy_from_slice(b".FIT");
    let crc = calculate_crc(&header[0..12]);
    header[12..14].copy_from_slice(&crc.to_le_bytes());
    header
}

fn ms_to_fit(time_ms: u64) -> u32 {
    unix_to_fit_timestamp((time_ms / 1000) as i64)
}

fn scaled_u32(value: f64, scale: f64) -> u32 {
    (value * scale).round().clamp(0.0, (FIT_INVALID_UINT32 - 1) as f64) as u32
}

fn sensor_u8(value: Option<f64>) -> u8 {
    value
        .map(|v| v.round().clamp(0.0, (FIT_INVALID_UINT8 - 1) as f64) as u8)
        .unwrap_or(FIT_INVALID_UINT8)
}

fn sensor_u16(value: Option<f64>) -> u16 {
    value
        .map(|v| v.round().clamp(0.0, (FIT_INVALID_UINT16 - 1) as f64) as u16)
        .unwrap_or(FIT_INVALID_UINT16)
}

/// Running totals for the session message.
#[derive(Debug, Default)]
struct SessionTotals {
    start_ms: u64,
    end_ms: u64,
    distance_meters: f64,
    calories: Option<u32>,
    laps: u16,
}

/// Streaming FIT writer over a seekable sink.
///
/// Each message is assembled in memory and handed to the sink in a single
/// write, so an unbuffered `File` sees one call per message.
pub struct FitWriter<W: Read + Write + Seek> {
    sink: W,
    protocol: Protocol,
    /// Bytes written after the header
    data_size: u32,
    /// Message under construction
    message: Vec<u8>,
    /// Local messages whose definition has been written
    defined: [bool; 16],
    sport: u8,
    sub_sport: u8,
    current_lap: Option<LapHeader>,
    totals: SessionTotals,
}

impl<W: Read + Write + Seek> FitWriter<W> {
    /// Wrap an open, empty sink and reserve space for the header.
    pub fn create(mut sink: W) -> Result<Self, ExportError> {
        let mut protocol = Protocol::default();
        protocol.open_file()?;
        sink.write_all(&header_bytes(0))?;
        Ok(Self {
            sink,
            protocol,
            data_size: 0,
            message: Vec::with_capacity(64),
            defined: [false; 16],
            sport: 0,
            sub_sport: 0,
            current_lap: None,
            totals: SessionTotals::default(),
        })
    }

    /// Payload bytes written so far.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Write the pending message to the sink.
    fn flush_message(&mut self) -> Result<(), ExportError> {
        let len = u32::try_from(self.message.len())
            .ok()
            .and_then(|len| self.data_size.checked_add(len))
            .ok_or_else(|| ExportError::MalformedSource("FIT payload exceeds 4 GiB".to_string()))?;
        let result = self.sink.write_all(&self.message);
        self.message.clear();
        result?;
        self.data_size = len;
        Ok(())
    }

    fn put_u8(&mut self, value: u8) {
        self.message.push(value);
    }

    fn put_u16(&mut self, value: u16) {
        self.message.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.message.extend_from_slice(&value.to_le_bytes());
    }

    fn put_i32(&mut self, value: i32) {
        self.message.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a definition message the first time a local message is used.
    fn ensure_definition(
        &mut self,
        local_mesg_num: u8,
        global_mesg_num: u16,
        fields: &[(u8, u8, u8)],
    ) -> Result<(), ExportError> {
        let slot = (local_mesg_num & 0x0F) as usize;
        if self.defined[slot] {
            return Ok(());
        }

        // Record header: definition message (bit 6 set), local message num in bits 0-3
        self.put_u8(0x40 | (local_mesg_num & 0x0F));
        self.put_u8(0); // reserved
        self.put_u8(0); // architecture: little endian
        self.put_u16(global_mesg_num);
        self.put_u8(fields.len() as u8);
        for (field_num, size, base_type) in fields {
            self.message.extend_from_slice(&[*field_num, *size, *base_type]);
        }
        self.flush_message()?;

        self.defined[slot] = true;
        Ok(())
    }

    /// Record header for a data message.
    fn begin_data(&mut self, local_mesg_num: u8) {
        self.put_u8(local_mesg_num & 0x0F);
    }

    fn write_event(&mut self, time_ms: u64, event_type: u8) -> Result<(), ExportError> {
        self.ensure_definition(local::EVENT, message_type::EVENT, &EVENT_FIELDS)?;
        self.begin_data(local::EVENT);
        self.put_u32(ms_to_fit(time_ms));
        self.put_u8(0); // event = timer
        self.put_u8(event_type);
        self.flush_message()
    }

    fn write_document_start(&mut self, header: &DocumentHeader) -> Result<(), ExportError> {
        self.sport = sport_type_to_enum(&header.activity_type);
        self.sub_sport = sub_sport_type_to_enum(&header.activity_type);
        self.totals.start_ms = header.start_time_ms;
        self.totals.end_ms = header.start_time_ms;

        self.ensure_definition(local::FILE_ID, message_type::FILE_ID, &FILE_ID_FIELDS)?;
        self.begin_data(local::FILE_ID);
        self.put_u8(4); // type = activity
        self.put_u16(MANUFACTURER_DEVELOPMENT);
        self.put_u16(1); // product
        self.put_u32(1); // serial_number
        self.put_u32(ms_to_fit(header.start_time_ms));
        self.flush_message()?;

        self.write_event(header.start_time_ms, 0) // timer start
    }

    fn write_record_message(&mut self, record: &TrackRecord) -> Result<(), ExportError> {
        self.ensure_definition(local::RECORD, message_type::RECORD, &RECORD_FIELDS)?;

        let c = &record.coordinate;
        self.begin_data(local::RECORD);
        self.put_u32(ms_to_fit(c.time_ms));
        self.put_i32(degrees_to_semicircles(c.latitude));
        self.put_i32(degrees_to_semicircles(c.longitude));
        self.put_u16(altitude_field(c.altitude_meters));
        self.put_u8(sensor_u8(record.heart_rate));
        self.put_u8(sensor_u8(record.cadence));
        self.put_u32(
            record
                .distance_meters
                .map(|d| scaled_u32(d, 100.0))
                .unwrap_or(FIT_INVALID_UINT32),
        );
        self.put_u16(sensor_u16(record.power));
        self.flush_message()
    }

    /// Lap messages follow the records they summarize.
    fn write_lap_message(&mut self, lap: &LapHeader) -> Result<(), ExportError> {
        self.ensure_definition(local::LAP, message_type::LAP, &LAP_FIELDS)?;

        let agg = &lap.aggregates;
        let elapsed = scaled_u32(agg.total_time_seconds, 1000.0);
        let sport = self.sport;

        self.begin_data(local::LAP);
        self.put_u32(ms_to_fit(lap.window.end_ms));
        self.put_u16(lap.window.number.saturating_sub(1)); // message_index
        self.put_u8(9); // event = lap
        self.put_u8(1); // event_type = stop
        self.put_u32(ms_to_fit(lap.window.start_ms));
        self.put_u32(elapsed);
        self.put_u32(elapsed);
        self.put_u32(scaled_u32(agg.distance_meters, 100.0));
        self.put_u16(agg.calories.unwrap_or(FIT_INVALID_UINT16));
        self.put_u8(sport);
        self.flush_message()?;

        self.totals.end_ms = self.totals.end_ms.max(lap.window.end_ms);
        self.totals.distance_meters += agg.distance_meters;
        if let Some(calories) = agg.calories {
            *self.totals.calories.get_or_insert(0) += calories as u32;
        }
        self.totals.laps += 1;
        Ok(())
    }

    fn write_document_end(&mut self) -> Result<(), ExportError> {
        let end_ms = self.totals.end_ms;
        let elapsed = scaled_u32(
            end_ms.saturating_sub(self.totals.start_ms) as f64 / 1000.0,
            1000.0,
        );
        let calories = self
            .totals
            .calories
            .map(|c| c.min((FIT_INVALID_UINT16 - 1) as u32) as u16)
            .unwrap_or(FIT_INVALID_UINT16);
        let (sport, sub_sport, laps) = (self.sport, self.sub_sport, self.totals.laps);

        self.write_event(end_ms, 4)?; // timer stop_all

        self.ensure_definition(local::SESSION, message_type::SESSION, &SESSION_FIELDS)?;
        self.begin_data(local::SESSION);
        self.put_u32(ms_to_fit(end_ms));
        self.put_u16(0); // message_index
        self.put_u8(8); // event = session
        self.put_u8(1); // event_type = stop
        self.put_u32(ms_to_fit(self.totals.start_ms));
        self.put_u8(sport);
        self.put_u8(sub_sport);
        self.put_u32(elapsed);
        self.put_u32(elapsed);
        self.put_u32(scaled_u32(self.totals.distance_meters, 100.0));
        self.put_u16(calories);
        self.put_u16(0); // first_lap_index
        self.put_u16(laps);
        self.flush_message()?;

        self.ensure_definition(local::ACTIVITY, message_type::ACTIVITY, &ACTIVITY_FIELDS)?;
        self.begin_data(local::ACTIVITY);
        self.put_u32(ms_to_fit(end_ms));
        self.put_u32(elapsed);
        self.put_u16(1); // num_sessions
        self.put_u8(0); // type = manual
        self.put_u8(26); // event = activity
        self.put_u8(1); // event_type = stop
        self.put_u32(ms_to_fit(end_ms));
        self.flush_message()
    }

    /// Patch the header with the payload size, then append the file CRC.
    fn finalize(&mut self) -> Result<(), ExportError> {
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.write_all(&header_bytes(self.data_size))?;
        self.sink.flush()?;

        self.sink.seek(SeekFrom::Start(0))?;
        let expected = FIT_HEADER_SIZE as u64 + self.data_size as u64;
        let mut crc = 0u16;
        let mut buffer = [0u8; 8192];
        let mut remaining = expected;
        while remaining > 0 {
            let want = remaining.min(buffer.len() as u64) as usize;
            let read = self.sink.read(&mut buffer[..want])?;
            if read == 0 {
                return Err(ExportError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "FIT payload shorter than declared size",
                )));
            }
            crc = update_crc(crc, &buffer[..read]);
            remaining -= read as u64;
        }

        self.sink.seek(SeekFrom::Start(expected))?;
        self.sink.write_all(&crc.to_le_bytes())?;
        self.sink.flush()?;
        Ok(())
    }
}

impl<W: Read + Write + Seek> TrackWriter for FitWriter<W> {
    type Sink = W;

    fn state(&self) -> WriterState {
        self.protocol.state()
    }

    fn start_document(&mut self, header: &DocumentHeader) -> Result<(), ExportError> {
        self.protocol
            .expect("start_document", allowed::START_DOCUMENT)?;
        let result = self.write_document_start(header);
        self.protocol
            .complete(result, WriterState::DocumentStarted)
    }

    fn start_lap(&mut self, lap: &LapHeader) -> Result<(), ExportError> {
        self.protocol.expect("start_lap", allowed::START_LAP)?;
        self.current_lap = Some(*lap);
        self.protocol.complete(Ok(()), WriterState::LapOpen)
    }

    fn start_track(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("start_track", allowed::START_TRACK)?;
        self.protocol.complete(Ok(()), WriterState::TrackOpen)
    }

    fn write_record(&mut self, record: &TrackRecord) -> Result<(), ExportError> {
        self.protocol.expect("write_record", allowed::RECORD)?;
        let result = self.write_record_message(record);
        self.protocol.complete(result, WriterState::TrackOpen)
    }

    fn end_track(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_track", allowed::END_TRACK)?;
        self.protocol.complete(Ok(()), WriterState::TrackClosed)
    }

    fn end_lap(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_lap", allowed::END_LAP)?;
        let result = match self.current_lap.take() {
            Some(lap) => self.write_lap_message(&lap),
            None => Err(ExportError::ProtocolViolation(
                "end_lap without lap header".to_string(),
            )),
        };
        self.protocol.complete(result, WriterState::LapClosed)
    }

    fn end_document(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_document", allowed::END_DOCUMENT)?;
        let result = self.write_document_end();
        self.protocol
            .complete(result, WriterState::DocumentEnded)
    }

    fn close(mut self) -> Result<W, ExportError> {
        self.protocol.expect("close", allowed::CLOSE)?;
        let result = self.finalize();
        self.protocol.complete(result, WriterState::FileClosed)?;
        Ok(self.sink)
    }
}
