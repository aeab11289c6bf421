//! GPX 1.1 track writer.
//!
//! One `trk` per document and one `trkseg` per lap. Heart rate and cadence
//! use Garmin's TrackPointExtension, power the PowerExtension.

use chrono::SecondsFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use super::{allowed, DocumentHeader, LapHeader, Protocol, TrackRecord, TrackWriter, WriterState};
use crate::export::naming::utc_from_millis;
use crate::export::types::ExportError;

const NS_GPX: &str = "http://www.topografix.com/GPX/1/1";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const NS_TPE: &str = "http://www.garmin.com/xmlschemas/TrackPointExtension/v1";
const NS_PWR: &str = "http://www.garmin.com/xmlschemas/PowerExtension/v1";
const SCHEMA_LOCATION: &str = "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

/// Track name written when the activity has none.
const UNTITLED: &str = "Untitled";

/// Streaming GPX writer.
pub struct GpxWriter<W: Write> {
    xml: Writer<W>,
    protocol: Protocol,
}

impl<W: Write> GpxWriter<W> {
    /// Wrap an open sink.
    pub fn create(sink: W) -> Result<Self, ExportError> {
        let mut protocol = Protocol::default();
        protocol.open_file()?;
        Ok(Self {
            xml: Writer::new_with_indent(sink, b' ', 2),
            protocol,
        })
    }

    fn write_document_start(&mut self, header: &DocumentHeader) -> Result<(), ExportError> {
        self.xml
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("gpx");
        root.push_attribute(("version", "1.1"));
        root.push_attribute(("creator", header.creator.as_str()));
        root.push_attribute(("xmlns", NS_GPX));
        root.push_attribute(("xmlns:xsi", NS_XSI));
        root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
        root.push_attribute(("xmlns:gpxtpx", NS_TPE));
        root.push_attribute(("xmlns:gpxpx", NS_PWR));
        self.xml.write_event(Event::Start(root))?;

        self.xml
            .write_event(Event::Start(BytesStart::new("metadata")))?;
        write_element(&mut self.xml, "time", &gpx_time(header.start_time_ms))?;
        self.xml.write_event(Event::End(BytesEnd::new("metadata")))?;

        self.xml.write_event(Event::Start(BytesStart::new("trk")))?;
        let name = if header.name.is_empty() {
            UNTITLED
        } else {
            header.name.as_str()
        };
        write_element(&mut self.xml, "name", name)?;
        if !header.activity_type.is_empty() {
            write_element(&mut self.xml, "type", &header.activity_type)?;
        }
        Ok(())
    }

    fn write_trackpoint(&mut self, record: &TrackRecord) -> Result<(), ExportError> {
        let c = &record.coordinate;
        let lat = c.latitude.to_string();
        let lon = c.longitude.to_string();
        let mut trkpt = BytesStart::new("trkpt");
        trkpt.push_attribute(("lat", lat.as_str()));
        trkpt.push_attribute(("lon", lon.as_str()));
        self.xml.write_event(Event::Start(trkpt))?;

        write_element(&mut self.xml, "ele", &c.altitude_meters.to_string())?;
        write_element(&mut self.xml, "time", &gpx_time(c.time_ms))?;

        if record.has_sensor_data() {
            self.xml
                .write_event(Event::Start(BytesStart::new("extensions")))?;

            if record.heart_rate.is_some() || record.cadence.is_some() {
                self.xml.write_event(Event::Start(BytesStart::new(
                    "gpxtpx:TrackPointExtension",
                )))?;
                if let Some(hr) = record.heart_rate {
                    write_element(&mut self.xml, "gpxtpx:hr", &to_u8(hr).to_string())?;
                }
                if let Some(cadence) = record.cadence {
                    write_element(&mut self.xml, "gpxtpx:cad", &to_u8(cadence).to_string())?;
                }
                self.xml.write_event(Event::End(BytesEnd::new(
                    "gpxtpx:TrackPointExtension",
                )))?;
            }

            if let Some(power) = record.power {
                write_element(
                    &mut self.xml,
                    "gpxpx:PowerInWatts",
                    &(power.max(0.0).round() as u32).to_string(),
                )?;
            }

            self.xml
                .write_event(Event::End(BytesEnd::new("extensions")))?;
        }

        self.xml.write_event(Event::End(BytesEnd::new("trkpt")))?;
        Ok(())
    }

    fn write_start(&mut self, name: &str) -> Result<(), ExportError> {
        self.xml.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    fn write_end(&mut self, name: &str) -> Result<(), ExportError> {
        self.xml.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_document_end(&mut self) -> Result<(), ExportError> {
        self.write_end("trk")?;
        self.write_end("gpx")?;
        self.xml.get_mut().write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> TrackWriter for GpxWriter<W> {
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

    /// GPX has no lap element; laps only delimit track segments.
    fn start_lap(&mut self, _lap: &LapHeader) -> Result<(), ExportError> {
        self.protocol.expect("start_lap", allowed::START_LAP)?;
        self.protocol.complete(Ok(()), WriterState::LapOpen)
    }

    fn start_track(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("start_track", allowed::START_TRACK)?;
        let result = self.write_start("trkseg");
        self.protocol.complete(result, WriterState::TrackOpen)
    }

    fn write_record(&mut self, record: &TrackRecord) -> Result<(), ExportError> {
        self.protocol.expect("write_record", allowed::RECORD)?;
        let result = self.write_trackpoint(record);
        self.protocol.complete(result, WriterState::TrackOpen)
    }

    fn end_track(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_track", allowed::END_TRACK)?;
        let result = self.write_end("trkseg");
        self.protocol.complete(result, WriterState::TrackClosed)
    }

    fn end_lap(&mut self) -> Result<(), ExportError> {
        self.protocol.expect("end_lap", allowed::END_LAP)?;
        self.protocol.complete(Ok(()), WriterState::LapClosed)
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

fn gpx_time(time_ms: u64) -> String {
    utc_from_millis(time_ms).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, u8::MAX as f64) as u8
}

fn write_element<W: Write>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<(), ExportError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
