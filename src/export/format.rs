//! Export format definitions and chunked serialization

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};
use crate::protocol::ExportRow;

/// Header row of the delimited export
pub const CSV_HEADER: [&str; 4] = ["businessId", "title", "sourceRef", "images"];

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated text with a header row
    Csv,
    /// A JSON array of row objects
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.extension()
    }

    /// `{stem}_export_{YYYYmmdd_HHMMSS}.{ext}` for a dataset named `dataset_name`
    pub fn export_filename(&self, dataset_name: &str, at: DateTime<Utc>) -> String {
        let stem = Path::new(dataset_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("dataset");
        format!(
            "{}_export_{}.{}",
            stem,
            at.format("%Y%m%d_%H%M%S"),
            self.extension()
        )
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(format!("Invalid export format: {}. Valid formats: csv, json", s)),
        }
    }
}

// =============================================================================
// Serializer
// =============================================================================

enum Sink {
    Csv(csv::Writer<Vec<u8>>),
    Json(Vec<u8>),
}

/// Appends rows chunk by chunk into one payload
///
/// The JSON envelope is `[\n` + objects joined by `,\n` + `\n]`, or `[]`
/// when no row was written. CSV fields are quoted only when needed, and
/// the image list is encoded as JSON text inside its field.
pub struct ChunkSerializer {
    sink: Sink,
    rows: usize,
}

impl ChunkSerializer {
    pub fn new(format: ExportFormat) -> Result<Self> {
        let sink = match format {
            ExportFormat::Csv => {
                let mut writer = csv::WriterBuilder::new()
                    .terminator(csv::Terminator::Any(b'\n'))
                    .quote_style(csv::QuoteStyle::Necessary)
                    .from_writer(Vec::new());
                writer.write_record(CSV_HEADER).map_err(serialization)?;
                Sink::Csv(writer)
            }
            ExportFormat::Json => Sink::Json(Vec::new()),
        };
        Ok(Self { sink, rows: 0 })
    }

    pub fn write_chunk(&mut self, chunk: &[ExportRow]) -> Result<()> {
        match &mut self.sink {
            Sink::Csv(writer) => {
                for row in chunk {
                    let images = serde_json::to_string(&row.images).map_err(serialization)?;
                    writer
                        .write_record([
                            row.business_id.to_string().as_str(),
                            row.title.as_str(),
                            row.source_ref.to_string().as_str(),
                            images.as_str(),
                        ])
                        .map_err(serialization)?;
                }
            }
            Sink::Json(out) => {
                for (i, row) in chunk.iter().enumerate() {
                    out.extend_from_slice(if self.rows + i == 0 { b"[\n" } else { b",\n" });
                    serde_json::to_writer(&mut *out, row).map_err(serialization)?;
                }
            }
        }
        self.rows += chunk.len();
        Ok(())
    }

    /// Rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        match self.sink {
            Sink::Csv(writer) => writer
                .into_inner()
                .map_err(|e| GridError::Serialization(e.to_string())),
            Sink::Json(mut out) => {
                out.extend_from_slice(if self.rows == 0 { b"[]" } else { b"\n]" });
                Ok(out)
            }
        }
    }
}

/// Serialize `rows` in one go
pub fn serialize_rows(format: ExportFormat, rows: &[ExportRow]) -> Result<Vec<u8>> {
    let mut serializer = ChunkSerializer::new(format)?;
    serializer.write_chunk(rows)?;
    serializer.finish()
}

fn serialization(e: impl fmt::Display) -> GridError {
    GridError::Serialization(e.to_string())
}
