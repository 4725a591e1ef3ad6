use crate::error::SpreadsheetError;

use super::{text_cell, Sheet};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub(super) fn parse(bytes: &[u8]) -> Result<Sheet, SpreadsheetError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|_| SpreadsheetError::Encoding)?;

    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(::csv::Trim::None)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| SpreadsheetError::Csv(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SpreadsheetError::Csv(e.to_string()))?;
        rows.push(record.iter().map(text_cell).collect());
    }

    Sheet::from_grid(headers, rows)
}
