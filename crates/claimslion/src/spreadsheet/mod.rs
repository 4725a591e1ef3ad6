//! Spreadsheet-to-record conversion.
//!
//! Both formats produce the same shape: the first non-empty row names the
//! columns and every following row becomes a JSON object keyed by those
//! names, in column order. Empty cells are left out of the object.

mod csv;
mod xlsx;

use serde_json::{Map, Number, Value};

use crate::error::SpreadsheetError;

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl Sheet {
    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    /// The first `max` rows, as submitted to the model.
    pub fn head(&self, max: usize) -> &[Record] {
        &self.rows[..self.rows.len().min(max)]
    }

    /// Builds a sheet from a header row and raw data rows.
    ///
    /// `rows` hold one optional cell per column; cells beyond the header
    /// width get generated names.
    pub(crate) fn from_grid(
        raw_headers: Vec<String>,
        rows: Vec<Vec<Option<Value>>>,
    ) -> Result<Self, SpreadsheetError> {
        let width = rows
            .iter()
            .map(|r| r.len())
            .max()
            .unwrap_or(0)
            .max(raw_headers.len());
        let headers = unique_headers(&raw_headers, width);

        let rows: Vec<Record> = rows
            .into_iter()
            .filter_map(|cells| {
                let record: Record = cells
                    .into_iter()
                    .zip(headers.iter())
                    .filter_map(|(cell, header)| cell.map(|v| (header.clone(), v)))
                    .collect();
                (!record.is_empty()).then_some(record)
            })
            .collect();

        if rows.is_empty() {
            return Err(SpreadsheetError::Empty);
        }

        Ok(Self { headers, rows })
    }
}

/// Parses an uploaded spreadsheet by extension.
///
/// `max_expanded_bytes` caps each decompressed part of an xlsx archive.
pub fn parse_rows(
    extension: &str,
    bytes: &[u8],
    max_expanded_bytes: u64,
) -> Result<Sheet, SpreadsheetError> {
    match extension.to_ascii_lowercase().as_str() {
        "csv" => csv::parse(bytes),
        "xlsx" => xlsx::parse(bytes, max_expanded_bytes),
        other => Err(SpreadsheetError::UnsupportedFormat(other.to_string())),
    }
}

/// Extension of a stored file reference such as `<id>.csv`.
pub fn extension_of(file_ref: &str) -> &str {
    file_ref.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

/// Column names made unique: blanks become `column_N` (1-based) and
/// repeats get a `_2`, `_3`... suffix.
fn unique_headers(raw: &[String], width: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    (0..width)
        .map(|i| {
            let base = raw
                .get(i)
                .map(|h| h.trim())
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("column_{}", i + 1));
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

/// Converts raw cell text into a JSON value. Blank text is `None`; numeric
/// text becomes a number, integral values as integers.
pub(crate) fn text_cell(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(numeric_value(trimmed).unwrap_or_else(|| Value::String(trimmed.to_string())))
}

/// Parses plain decimal notation. Leading zeros (IDs, ZIP codes) stay text.
pub(crate) fn numeric_value(text: &str) -> Option<Value> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let looks_numeric = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && !digits.starts_with('.')
        && !digits.ends_with('.');
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if !looks_numeric || leading_zero {
        return None;
    }
    number_value(text.parse::<f64>().ok()?)
}

pub(crate) fn number_value(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Some(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Value::Number)
}
