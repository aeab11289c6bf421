//! TCX (Training Center XML) writer.
//!
//! Laps carry their aggregates ahead of the track, as the schema requires:
//! `Lap/TotalTimeSeconds`, `DistanceMeters` and `Calories` precede `Track`.
//! Power goes into the ActivityExtension `TPX` block.

use chrono::SecondsFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use super::{allowed, DocumentHeader, LapHeader, Protocol, TrackRecord, TrackWriter, WriterState};
use crate::export::naming::utc_from_millis;
use crate::export::types::ExportError;

/// TCX XML namespaces
const NS_TCX: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";
const NS_TPX: &str = "http://www.garmin.com/xmlschemas/ActivityExtension/v2";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2 http://www.garmin.com/xmlschemas/TrainingCenterDatabasev2.xsd";

/// Map a free-form activity type onto the three sports TCX knows.
pub fn tcx_sport(activity_type: &str) -> &'static str {
    let lower = activity_type.to_lowercase();
    if lower.contains("run") {
        "Running"
    } else if lower.contains("cycl") || lower.contains("bik") || lower.contains("ride") {
        "Biking"
    } else {
        "Other"
    }
}

/// Streaming TCX writer.
pub struct TcxWriter<W: Write> {
    xml: Writer<W>,
    protocol: Protocol,
    /// `<Track>` is opened lazily so that a lap without points stays schema-valid
    track_written: bool,
}

impl<W: Write> TcxWriter<W> {
    /// Wrap an open sink.
    pub fn create(sink: W) -> Result<Self, ExportError> {
        let mut protocol = Protocol::default();
        protocol.open_file()?;
        Ok(Self {
            xml: Writer::new_with_indent(sink, b' ', 2),
            protocol,
            track_written: false,
        })
    }

    fn write_document_start(&mut self, header: &DocumentHeader) -> Result<(), ExportError> {
        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("TrainingCenterDatabase");
        root.push_attribute(("xmlns", NS_TCX));
        root.push_attribute(("xmlns:ns3", NS_TPX));
        root.push_attribute(("xmlns:xsi", NS_XSI));
        root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
        self.xml.write_event(Event::Start(root))?;

        self.xml
            .write_event(Event::Start(BytesStart::new("Activities")))?;

        let mut activity = BytesStart::new("Activity");
        activity.push_attribute(("Sport", tcx_sport(&header.activity_type)));
        self.xml.write_event(Event::Start(activity))?;

        write_element(&mut self.xml, "Id", &tcx_time(header.start_time_ms))?;
        Ok(())
    }

    fn write_lap_start(&mut self, lap: &LapHeader) -> Result<(), ExportError> {
        let start = tcx_time(lap.window.start_ms);
        let mut element = BytesStart::new("Lap");
        element.push_attribute(("StartTime", start.as_str()));
        self.xml.write_event(Event::Start(element))?;

        let agg = &lap.aggregates;
        write_element(
            &mut self.xml,
            "TotalTimeSeconds",
            &format!("{:.1}", agg.total_time_seconds),
        )?;
        write_element(
            &mut self.xml,
            "DistanceMeters",
            &format!("{:.2}", agg.distance_meters),
        )?;
        write_element(
            &mut self.xml,
            "Calories",
            &agg.calories.unwrap_or(0).to_string(),
        )?;
        write_element(&mut self.xml, "Intensity", "Active")?;
        write_element(&mut self.xml, "TriggerMethod", "Manual")?;
        Ok(())
    }

    fn write_trackpoint(&mut self, record: &TrackRecord) -> Result<(), ExportError> {
        if !self.track_written {
            self.xml.write_event(Event::Start(BytesStart::new("Track")))?;
            self.track_written = true;
        }

        let c = &record.coordinate;
        self.xml
            .write_event(Event::Start(BytesStart::new("Trackpoint")))?;

        write_element(&mut self.xml, "Time", &tcx_time(c.time_ms))?;

        self.xml
            .write_event(Event::Start(BytesStart::new("Position")))?;
        write_element(&mut self.xml, "LatitudeDegrees", &c.latitude.to_string())?;
        write_element(&mut self.xml, "LongitudeDegrees", &c.longitude.to_string())?;
        self.xml.write_event(Event::End(BytesEnd::new("Position")))?;

        write_element(&mut self.xml, "AltitudeMeters", &c.altitude_meters.to_string())?;

        if let Some(distance) = record.distance_meters {
            write_element(&mut self.xml, "DistanceMeters", &format!("{:.2}", distance))?;
        }

        if let Some(hr) = record.heart_rate {
            self.xml
                .write_event(Event::Start(BytesStart::new("HeartRateBpm")))?;
            write_element(&mut self.xml, "Value", &to_u8(hr).to_string())?;
            self.xml
                .write_event(Event::End(BytesEnd::new("HeartRateBpm")))?;
        }

        if let Some(cadence) = record.cadence {
            write_element(&mut self.xml, "Cadence", &to_u8(cadence).to_string())?;
        }

        if let Some(power) = record.power {
            self.xml
                .write_event(Event::Start(BytesStart::new("Extensions")))?;
            self.xml
                .write_event(Event::Start(BytesStart::new("ns3:TPX")))?;
            write_element(&mut self.xml, "ns3:Watts", &(power.max(0.0).round() as u32).to_string())?;
            self.xml.write_event(Event::End(BytesEnd::new("ns3:TPX")))?;
            self.xml
                .write_event(Event::End(BytesEnd::new("Extensions")))?;
        }

        self.xml
            .write_event(Event::End(BytesEnd::new("Trackpoint")))?;
        Ok(())
    }

    fn write_track_end(&mut self) -> Result<(), ExportError> {
        if self.track_written {
            self.xml.write_event(Event::End(BytesEnd::new("Track")))?;
            self.track_written = false;
        }
        Ok(())
    }

    fn write_end(&mut self, name: &str) -> Result<(), ExportError> {
        self.xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_document_end(&mut self) -> Result<(), ExportError> {
        self.write_end("Activity")?;
        self.write_end("Activities")?;
        self.write_end("TrainingCenterDatabase")?;
        self.xml.get_mut().write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> TrackWriter for TcxWriter<W> {
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
        let result = self.write_lap_start(lap);
        self.protocol.complete(result, WriterState::LapOpen)
    }

    fn start_track(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("start_track", allowed::START_TRACK)?;
        self.track_written = false;
        self.protocol.complete(Ok(()), WriterState::TrackOpen)
    }

    fn write_record(&mut self, record: &TrackRecord) -> Result<(), ExportError> {
        self.protocol.expect("write_record", allowed::RECORD)?;
        let result = self.write_trackpoint(record);
        self.protocol.complete(result, WriterState::TrackOpen)
    }

    fn end_track(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_track", allowed::END_TRACK)?;
        let result = self.write_track_end();
        self.protocol.complete(result, WriterState::TrackClosed)
    }

    fn end_lap(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_lap", allowed::END_LAP)?;
        let result = self.write_end("Lap");
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
        self.xml.get_mut().flush()?;
        Ok(self.xml.into_inner())
    }
}

/// TCX timestamps are UTC RFC 3339 with millisecond precision.
fn tcx_time(time_ms: u64) -> String {
    utc_from_millis(time_ms).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, u8::MAX as f64) as u8
}

/// Write a simple element with text content.
fn write_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
