//! Activity summary export: one CSV row per activity of a given type.

use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::export::engine::write_atomically;
use crate::export::naming::generate_summary_file_name;
use crate::export::types::{ActivitySummary, AttributeValue, ExportError};
use crate::export::writer::csv::PLACEHOLDER;

/// Render an attribute for the summary table. Unset values become the placeholder.
pub fn format_attribute(value: Option<&AttributeValue>) -> String {
    match value {
        Some(AttributeValue::Time(t)) => t.to_string(),
        Some(AttributeValue::Double(d)) => format!("{:.8}", d),
        Some(AttributeValue::Integer(i)) => i.to_string(),
        Some(AttributeValue::NotSet) | None => PLACEHOLDER.to_string(),
    }
}

/// Write `<stamp>-<type>-Summary.csv` into `output_dir`.
///
/// Column titles are the sorted attribute names of the first activity of
/// `activity_type`; later activities missing one of those attributes get a
/// placeholder in that column.
pub fn export_activity_summary(
    activities: &[ActivitySummary],
    activity_type: &str,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    let path = output_dir.join(generate_summary_file_name(&Local::now(), activity_type));

    let rows = write_atomically(&path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let rows = write_summary_rows(&mut writer, activities, activity_type)?;
        let file = writer
            .into_inner()
            .map_err(|e| ExportError::IoError(e.into_error()))?;
        Ok((file, rows))
    })?;

    info!(
        activity_type,
        path = %path.display(),
        rows,
        "Activity summary exported"
    );

    Ok(path)
}

/// Write the title row and one row per matching activity.
pub fn write_summary_rows<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    activities: &[ActivitySummary],
    activity_type: &str,
) -> Result<usize, ExportError> {
    let mut titles: Option<Vec<&str>> = None;
    let mut rows = 0;

    for summary in activities.iter().filter(|s| s.activity_type == activity_type) {
        // BTreeMap keys are already sorted.
        let columns = titles
            .get_or_insert_with(|| summary.attributes.keys().map(String::as_str).collect());
        if rows == 0 {
            writer.write_record(columns.iter())?;
        }

        let mut placeholders = 0;
        let values: Vec<String> = columns
            .iter()
            .map(|name| {
                let value = summary.attribute(name);
                if !matches!(value, Some(v) if v.as_f64().is_some()) {
                    placeholders += 1;
                }
                format_attribute(value)
            })
            .collect();
        if placeholders > 0 {
            warn!(
                activity_id = %summary.id,
                placeholders,
                "Summary attributes missing, writing placeholders"
            );
        }

        writer.write_record(&values)?;
        rows += 1;
    }

    Ok(rows)
}
