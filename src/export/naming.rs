//! Output file name derivation.

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::export::types::ExportFormat;

/// Local-time stamp format used as the file name prefix.
const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Replace whitespace in an activity type so it is safe in a file name.
pub fn sanitize_activity_type(activity_type: &str) -> String {
    activity_type
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// File name for an activity export, e.g. `2024-05-01T07-30-00-Mountain_Biking.gpx`.
///
/// `start_time_ms` is rendered in the machine's local time zone.
pub fn generate_file_name(format: ExportFormat, start_time_ms: u64, activity_type: &str) -> String {
    let start = utc_from_millis(start_time_ms).with_timezone(&Local);
    generate_file_name_at(format, &start, activity_type)
}

/// [`generate_file_name`] with an explicit time zone.
pub fn generate_file_name_at<Tz>(format: ExportFormat, start: &DateTime<Tz>, activity_type: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}-{}.{}",
        start.format(STAMP_FORMAT),
        sanitize_activity_type(activity_type),
        format.extension()
    )
}

/// File name from a caller-chosen base name, e.g. `Workout_42.tcx`.
pub fn generate_named_file_name(format: ExportFormat, name: &str) -> String {
    format!("{}.{}", name, format.extension())
}

/// File name for an activity summary table written at `now`.
pub fn generate_summary_file_name<Tz>(now: &DateTime<Tz>, activity_type: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}-{}-Summary.csv",
        now.format(STAMP_FORMAT),
        sanitize_activity_type(activity_type)
    )
}

/// Convert unix milliseconds to a UTC timestamp, clamping out-of-range values to the epoch.
pub fn utc_from_millis(time_ms: u64) -> DateTime<Utc> {
    i64::try_from(time_ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}
