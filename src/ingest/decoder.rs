//! Streaming source decoders
//!
//! Delimited text goes through the `csv` crate record by record; JSON
//! arrays are walked element by element with a serde sequence visitor.
//! Neither path ever holds more than one row of the source in memory.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde_json::Value;

use super::normalize::{Column, RawRow};
use crate::error::{GridError, Result};

/// Bytes sniffed from the head of a file to pick the format
const SNIFF_BYTES: usize = 4096;

/// How a source file is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text with a header row
    Delimited { delimiter: u8 },
    /// A JSON array of objects
    Json,
}

impl SourceFormat {
    /// Pick a format from the extension, falling back to the first bytes
    ///
    /// `.csv` is comma separated, `.tsv` tab separated and `.json` JSON.
    /// Other files starting with `[` are JSON; for the rest the delimiter
    /// is sniffed from the header.
    pub fn detect(path: &Path, head: &[u8]) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => return SourceFormat::Delimited { delimiter: b',' },
            Some("tsv") => return SourceFormat::Delimited { delimiter: b'\t' },
            Some("json") => return SourceFormat::Json,
            _ => {}
        }

        let text = String::from_utf8_lossy(head);
        let text = text.trim_start_matches('\u{feff}');
        if text.trim_start().starts_with('[') {
            return SourceFormat::Json;
        }
        SourceFormat::Delimited {
            delimiter: sniff_delimiter(text),
        }
    }
}

/// Most frequent of comma, tab and semicolon in the first lines whose
/// split of the header yields a business id column; comma otherwise
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let sample: Vec<&str> = text.lines().take(5).collect();

    let mut candidates: Vec<(u8, usize)> = [b',', b'\t', b';']
        .into_iter()
        .map(|d| {
            let count = sample.iter().map(|line| line.bytes().filter(|b| *b == d).count()).sum();
            (d, count)
        })
        .collect();
    // Stable sort keeps comma first on ties
    candidates.sort_by(|a, b| b.1.cmp(&a.1));

    candidates
        .into_iter()
        .find(|(d, count)| {
            *count > 0
                && header
                    .split(char::from(*d))
                    .any(|field| Column::from_header(field) == Some(Column::BusinessId))
        })
        .map_or(b',', |(d, _)| d)
}

/// Decode `path`, handing each row to `on_row` in file order
///
/// An error from `on_row` stops decoding and is returned unchanged.
pub fn decode_file(path: &Path, on_row: impl FnMut(RawRow) -> Result<()>) -> Result<()> {
    let file = File::open(path)
        .map_err(|e| GridError::Decode(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let head = reader.fill_buf()?;
    let format = SourceFormat::detect(path, &head[..head.len().min(SNIFF_BYTES)]);

    match format {
        SourceFormat::Delimited { delimiter } => decode_delimited(reader, delimiter, on_row),
        SourceFormat::Json => decode_json(reader, on_row),
    }
}

/// Decode delimited text with a header row
pub fn decode_delimited<R: Read>(
    reader: R,
    delimiter: u8,
    mut on_row: impl FnMut(RawRow) -> Result<()>,
) -> Result<()> {
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    // First occurrence of a column wins when aliases collide
    let mut columns: Vec<Option<Column>> = Vec::new();
    for header in csv.headers()?.iter() {
        let column = Column::from_header(header.trim_start_matches('\u{feff}'))
            .filter(|c| !columns.contains(&Some(*c)));
        columns.push(column);
    }
    if !columns.contains(&Some(Column::BusinessId)) {
        return Err(GridError::Decode(
            "source has no business id column".to_string(),
        ));
    }

    let mut record = csv::StringRecord::new();
    while csv.read_record(&mut record)? {
        let mut row = RawRow::default();
        for (field, column) in record.iter().zip(&columns) {
            if let Some(column) = column {
                row.set(*column, Value::String(field.to_string()));
            }
        }
        on_row(row)?;
    }
    Ok(())
}

/// Decode a JSON array of row objects
pub fn decode_json<R: Read>(reader: R, mut on_row: impl FnMut(RawRow) -> Result<()>) -> Result<()> {
    let mut failure = None;
    let mut rows = 0u64;
    let mut with_business_id = 0u64;

    let mut de = serde_json::Deserializer::from_reader(reader);
    let walked = (&mut de).deserialize_seq(RowVisitor {
        on_row: &mut on_row,
        failure: &mut failure,
        rows: &mut rows,
        with_business_id: &mut with_business_id,
    });

    if let Some(err) = failure {
        return Err(err);
    }
    walked?;
    de.end()?;

    if rows > 0 && with_business_id == 0 {
        return Err(GridError::Decode(
            "source has no business id column".to_string(),
        ));
    }
    Ok(())
}

struct RowVisitor<'a, F> {
    on_row: &'a mut F,
    /// Error raised by the callback, kept out of serde's error type
    failure: &'a mut Option<GridError>,
    rows: &'a mut u64,
    with_business_id: &'a mut u64,
}

impl<'de, F> Visitor<'de> for RowVisitor<'_, F>
where
    F: FnMut(RawRow) -> Result<()>,
{
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array of row objects")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(element) = seq.next_element::<Value>()? {
            let row = row_from_value(element);
            *self.rows += 1;
            if row.business_id.is_some() {
                *self.with_business_id += 1;
            }
            if let Err(err) = (self.on_row)(row) {
                *self.failure = Some(err);
                return Err(de::Error::custom("row handler stopped decoding"));
            }
        }
        Ok(())
    }
}

fn row_from_value(value: Value) -> RawRow {
    let mut row = RawRow::default();
    if let Value::Object(fields) = value {
        let mut seen: Vec<Column> = Vec::new();
        for (name, field) in fields {
            if let Some(column) = Column::from_header(&name) {
                if !seen.contains(&column) {
                    seen.push(column);
                    row.set(column, field);
                }
            }
        }
    }
    row
}
