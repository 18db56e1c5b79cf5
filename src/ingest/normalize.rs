//! Row normalization
//!
//! Turns one decoded source row into a [`NewRecord`] or rejects it.
//!
//! | Column      | Rule                                                        |
//! |-------------|-------------------------------------------------------------|
//! | business id | integer (trimmed text or integral number), else row dropped |
//! | title       | text as-is, empty when absent                               |
//! | source ref  | integer, 0 when absent or unparsable                        |
//! | images      | JSON list, bracketed list-like text, or one bare URL        |

use serde_json::Value;

use crate::catalog::NewRecord;
use crate::error::{GridError, Result};

/// One source row before normalization, keyed by known column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub business_id: Option<Value>,
    pub title: Option<Value>,
    pub source_ref: Option<Value>,
    pub images: Option<Value>,
}

/// The four columns a source may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    BusinessId,
    Title,
    SourceRef,
    Images,
}

impl Column {
    /// Match a header name, ignoring case and punctuation
    ///
    /// `businessId`, `business_id` and `Business ID` all map to the same column.
    pub fn from_header(header: &str) -> Option<Self> {
        let folded: String = header
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "businessid" | "id" => Some(Column::BusinessId),
            "title" | "name" => Some(Column::Title),
            "sourceref" | "source" | "ref" => Some(Column::SourceRef),
            "images" | "image" | "imageurls" => Some(Column::Images),
            _ => None,
        }
    }
}

impl RawRow {
    /// Store `value` under `column`
    pub fn set(&mut self, column: Column, value: Value) {
        let slot = match column {
            Column::BusinessId => &mut self.business_id,
            Column::Title => &mut self.title,
            Column::SourceRef => &mut self.source_ref,
            Column::Images => &mut self.images,
        };
        *slot = Some(value);
    }
}

/// Normalize a raw row for `dataset_id`
///
/// Only the business id can reject a row, with [`GridError::Validation`].
pub fn normalize(row: RawRow, dataset_id: u64) -> Result<NewRecord> {
    let business_id = row
        .business_id
        .as_ref()
        .and_then(parse_integer)
        .ok_or_else(|| {
            GridError::Validation(format!("unparsable business id: {}", describe(&row.business_id)))
        })?;

    Ok(NewRecord {
        dataset_id,
        business_id,
        title: row.title.map(into_text).unwrap_or_default(),
        source_ref: row.source_ref.as_ref().and_then(parse_integer).unwrap_or(0),
        images: row.images.map(parse_images).unwrap_or_default(),
    })
}

/// Strict integer parse: surrounding whitespace allowed, nothing else
pub fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Image list from any of the accepted encodings
pub fn parse_images(value: Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .map(into_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => parse_image_text(&s),
        other => vec![other.to_string()],
    }
}

fn parse_image_text(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if !trimmed.starts_with('[') {
        return vec![trimmed.to_string()];
    }
    if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
        return list.into_iter().filter(|s| !s.is_empty()).collect();
    }

    // Loose list like [a.jpg, 'b.jpg']
    trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn describe(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<missing>".to_string(),
    }
}
