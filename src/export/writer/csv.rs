//! Flat CSV writer.
//!
//! A CSV export is a sequence of tables in one file: position and distance,
//! accelerometer, heart rate, cadence. Each table owns its title row, which
//! is written only when the first data row arrives, so a stream without
//! samples leaves no trace in the output.

use std::io::Write;

use crate::export::types::ExportError;

/// Written in place of a value a reading does not carry.
pub const PLACEHOLDER: &str = "-";

/// CSV file holding one or more tables of differing width.
pub struct CsvFileWriter<W: Write> {
    writer: csv::Writer<W>,
    /// Decimal places for values; `None` prints the shortest exact form
    precision: Option<usize>,
    tables_written: usize,
}

impl<W: Write> CsvFileWriter<W> {
    pub fn create(sink: W, precision: Option<usize>) -> Self {
        let writer = csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_writer(sink);
        Self {
            writer,
            precision,
            tables_written: 0,
        }
    }

    /// Open a table scope with the given column titles.
    pub fn table<'a>(&'a mut self, titles: &'a [&'a str]) -> CsvTable<'a, W> {
        CsvTable {
            file: self,
            titles,
            rows: 0,
        }
    }

    /// Number of tables that received at least one row.
    pub fn tables_written(&self) -> usize {
        self.tables_written
    }

    fn format_value(&self, value: f64) -> String {
        match self.precision {
            Some(p) => format!("{:.*}", p, value),
            None => value.to_string(),
        }
    }

    /// Flush and hand back the sink.
    pub fn close(self) -> Result<W, ExportError> {
        self.writer
            .into_inner()
            .map_err(|e| ExportError::IoError(e.into_error()))
    }
}

/// One table inside a [`CsvFileWriter`].
pub struct CsvTable<'a, W: Write> {
    file: &'a mut CsvFileWriter<W>,
    titles: &'a [&'a str],
    rows: usize,
}

impl<W: Write> CsvTable<'_, W> {
    /// Write one data row, preceded by the title row if this is the first.
    pub fn write_row(&mut self, values: &[f64]) -> Result<(), ExportError> {
        let values: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
        self.write_row_with_gaps(&values)
    }

    /// Like [`CsvTable::write_row`], rendering `None` as [`PLACEHOLDER`].
    pub fn write_row_with_gaps(&mut self, values: &[Option<f64>]) -> Result<(), ExportError> {
        if values.len() != self.titles.len() {
            return Err(ExportError::ProtocolViolation(format!(
                "row has {} values for {} columns",
                values.len(),
                self.titles.len()
            )));
        }

        if self.rows == 0 {
            self.file.writer.write_record(self.titles)?;
            self.file.tables_written += 1;
        }

        let record: Vec<String> = values
            .iter()
            .map(|v| match v {
                Some(v) => self.file.format_value(*v),
                None => PLACEHOLDER.to_string(),
            })
            .collect();
        self.file.writer.write_record(&record)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}
