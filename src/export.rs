//! Row export to CSV and JSON.
//!
//! Both formats carry every column of [`HistoryRow`] and read back into
//! the same rows.

use crate::error::{Result, StoreError};
use crate::query::HistoryRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Supported export formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(StoreError::InvalidFormat(format!(
                "Unknown export format: {other}"
            ))),
        }
    }
}

/// Write rows in the given format. Returns the number of rows written.
pub fn write_rows<W: Write>(
    rows: impl IntoIterator<Item = HistoryRow>,
    format: ExportFormat,
    writer: W,
) -> Result<usize> {
    match format {
        ExportFormat::Csv => write_csv(rows, writer),
        ExportFormat::Json => write_json(rows, writer),
    }
}

/// Read rows previously written with [`write_rows`].
pub fn read_rows<R: Read>(format: ExportFormat, reader: R) -> Result<Vec<HistoryRow>> {
    match format {
        ExportFormat::Csv => read_csv(reader),
        ExportFormat::Json => read_json(reader),
    }
}

pub fn write_csv<W: Write>(rows: impl IntoIterator<Item = HistoryRow>, writer: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut count = 0;
    for row in rows {
        writer.serialize(&row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<HistoryRow>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

pub fn write_json<W: Write>(rows: impl IntoIterator<Item = HistoryRow>, writer: W) -> Result<usize> {
    let rows: Vec<HistoryRow> = rows.into_iter().collect();
    serde_json::to_writer_pretty(writer, &rows)?;
    Ok(rows.len())
}

pub fn read_json<R: Read>(reader: R) -> Result<Vec<HistoryRow>> {
    serde_json::from_reader(reader).map_err(|e| StoreError::Deserialization(e.to_string()))
}
