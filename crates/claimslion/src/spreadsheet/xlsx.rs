//! Minimal XLSX reader: values of the first worksheet only.
//!
//! Formulas are read through their cached values; styles, dates and merged
//! cells are not interpreted (dates arrive as serial numbers).

use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use crate::error::SpreadsheetError;

use super::{number_value, Sheet};

const DEFAULT_SHEET_PATH: &str = "xl/worksheets/sheet1.xml";

/// Zero-based index of column XFD, the last one a worksheet can address.
const MAX_COLUMN: usize = 16_383;

/// Parses the first worksheet. `max_expanded_bytes` bounds the decompressed
/// size of every archive part read.
pub(super) fn parse(bytes: &[u8], max_expanded_bytes: u64) -> Result<Sheet, SpreadsheetError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SpreadsheetError::Xlsx(format!("Failed to open XLSX: {}", e)))?;

    let sheet_path = first_sheet_path(&mut archive, max_expanded_bytes)?;
    let shared_strings =
        match read_entry(&mut archive, "xl/sharedStrings.xml", max_expanded_bytes)? {
            Some(xml) => parse_shared_strings(&xml)?,
            None => Vec::new(),
        };
    let sheet_xml = read_entry(&mut archive, &sheet_path, max_expanded_bytes)?.ok_or_else(|| {
        SpreadsheetError::Xlsx(format!("Worksheet '{}' missing from archive", sheet_path))
    })?;

    let mut grid = parse_sheet(&sheet_xml, &shared_strings)?.into_iter();
    let headers = match grid.next() {
        Some(cells) => cells
            .into_iter()
            .map(|c| c.map(|v| value_text(&v)).unwrap_or_default())
            .collect(),
        None => return Err(SpreadsheetError::Empty),
    };

    Sheet::from_grid(headers, grid.collect())
}

fn read_entry<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<Option<String>, SpreadsheetError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(SpreadsheetError::Xlsx(format!(
                "Failed to open {}: {}",
                name, e
            )))
        }
    };
    let mut content = String::new();
    entry
        .by_ref()
        .take(limit.saturating_add(1))
        .read_to_string(&mut content)
        .map_err(|e| SpreadsheetError::Xlsx(format!("Failed to read {}: {}", name, e)))?;
    if content.len() as u64 > limit {
        return Err(SpreadsheetError::Xlsx(format!(
            "{} expands beyond {} bytes",
            name, limit
        )));
    }
    Ok(Some(content))
}

/// Resolves the first `<sheet>` of the workbook through its relationship.
fn first_sheet_path<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
    limit: u64,
) -> Result<String, SpreadsheetError> {
    let Some(workbook) = read_entry(archive, "xl/workbook.xml", limit)? else {
        return Ok(DEFAULT_SHEET_PATH.to_string());
    };
    let Some(rel_id) = first_sheet_rel_id(&workbook)? else {
        return Ok(DEFAULT_SHEET_PATH.to_string());
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels", limit)? else {
        return Ok(DEFAULT_SHEET_PATH.to_string());
    };
    Ok(relationship_target(&rels, &rel_id)?
        .map(|target| resolve_target(&target))
        .unwrap_or_else(|| DEFAULT_SHEET_PATH.to_string()))
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn first_sheet_rel_id(workbook_xml: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(workbook_xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                return Ok(attribute(e, b"id"));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(xml_error("workbook.xml", e)),
            _ => {}
        }
    }
}

fn relationship_target(rels_xml: &str, id: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(rels_xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if attribute(e, b"Id").as_deref() == Some(id) {
                    return Ok(attribute(e, b"Target"));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(xml_error("workbook.xml.rels", e)),
            _ => {}
        }
    }
}

/// Each `<si>` yields one string: the concatenation of its `<t>` runs,
/// ignoring phonetic (`<rPh>`) annotations.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" => in_text = in_item && !in_phonetic,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_text => {
                current.push_str(&unescape(&String::from_utf8_lossy(e)));
            }
            Ok(Event::CData(ref e)) if in_text => {
                current.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::GeneralRef(ref e)) if in_text => {
                current.push_str(&resolve_entity(&String::from_utf8_lossy(e)));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("sharedStrings.xml", e)),
            _ => {}
        }
    }

    Ok(strings)
}

#[derive(Default)]
struct CellState {
    column: usize,
    kind: String,
    raw: String,
}

/// Reads all rows of a worksheet into a dense grid indexed by column.
fn parse_sheet(
    xml: &str,
    shared_strings: &[String],
) -> Result<Vec<Vec<Option<Value>>>, SpreadsheetError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut grid: Vec<Vec<Option<Value>>> = Vec::new();
    let mut row: Vec<Option<Value>> = Vec::new();
    let mut in_row = false;
    let mut cell: Option<CellState> = None;
    let mut capture = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    row.clear();
                }
                b"c" if in_row => cell = Some(start_cell(e, row.len())?),
                b"v" | b"t" if cell.is_some() => capture = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => grid.push(Vec::new()),
                // Self-closing cell: styled but empty.
                b"c" if in_row => {
                    let state = start_cell(e, row.len())?;
                    place(&mut row, state.column, None);
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = false;
                    grid.push(std::mem::take(&mut row));
                }
                b"c" => {
                    if let Some(state) = cell.take() {
                        let value = cell_value(&state, shared_strings);
                        place(&mut row, state.column, value);
                    }
                }
                b"v" | b"t" => capture = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) if capture => {
                if let Some(state) = cell.as_mut() {
                    state.raw.push_str(&unescape(&String::from_utf8_lossy(e)));
                }
            }
            Ok(Event::GeneralRef(ref e)) if capture => {
                if let Some(state) = cell.as_mut() {
                    state
                        .raw
                        .push_str(&resolve_entity(&String::from_utf8_lossy(e)));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("worksheet", e)),
            _ => {}
        }
    }

    // Leading blank rows never name columns.
    while grid
        .first()
        .is_some_and(|r| r.iter().all(|c| c.is_none()))
    {
        grid.remove(0);
    }

    Ok(grid)
}

fn start_cell(e: &BytesStart<'_>, next_column: usize) -> Result<CellState, SpreadsheetError> {
    let column = match attribute(e, b"r") {
        Some(reference) => column_index(&reference)?.unwrap_or(next_column),
        None => next_column,
    };
    if column > MAX_COLUMN {
        return Err(SpreadsheetError::Xlsx(format!(
            "Row has more than {} columns",
            MAX_COLUMN + 1
        )));
    }
    Ok(CellState {
        column,
        kind: attribute(e, b"t").unwrap_or_default(),
        raw: String::new(),
    })
}

fn place(row: &mut Vec<Option<Value>>, column: usize, value: Option<Value>) {
    if row.len() <= column {
        row.resize(column + 1, None);
    }
    row[column] = value;
}

fn cell_value(state: &CellState, shared_strings: &[String]) -> Option<Value> {
    let raw = state.raw.as_str();
    let text = match state.kind.as_str() {
        "s" => shared_strings
            .get(raw.trim().parse::<usize>().ok()?)
            .cloned()?,
        "b" => return Some(Value::Bool(raw.trim() == "1")),
        "inlineStr" | "str" | "e" => raw.to_string(),
        _ => {
            let trimmed = raw.trim();
            return match trimmed.parse::<f64>() {
                Ok(n) => number_value(n),
                Err(_) if trimmed.is_empty() => None,
                Err(_) => Some(Value::String(trimmed.to_string())),
            };
        }
    };
    let text = text.trim();
    (!text.is_empty()).then(|| Value::String(text.to_string()))
}

/// Zero-based column of an A1-style reference: `A1` → 0, `AB12` → 27.
///
/// `None` when the reference has no column letters; an error past XFD.
fn column_index(reference: &str) -> Result<Option<usize>, SpreadsheetError> {
    let letters = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| usize::from(b.to_ascii_uppercase() - b'A') + 1);
    let mut index: Option<usize> = None;
    for digit in letters {
        index = index
            .unwrap_or(0)
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .filter(|&i| i <= MAX_COLUMN + 1)
            .map(Some)
            .ok_or_else(|| {
                SpreadsheetError::Xlsx(format!(
                    "Cell reference '{}' is beyond column XFD",
                    reference
                ))
            })?;
    }
    Ok(index.map(|i| i - 1))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| unescape(&String::from_utf8_lossy(&a.value)))
}

fn resolve_entity(name: &str) -> String {
    match name {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        _ => {
            let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => name.strip_prefix('#').and_then(|d| d.parse().ok()),
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| format!("&{};", name))
        }
    }
}

/// Expands entity references left in raw attribute or text content.
fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(';') {
            Some(end) => {
                out.push_str(&resolve_entity(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn xml_error(part: &str, e: quick_xml::Error) -> SpreadsheetError {
    SpreadsheetError::Xlsx(format!("XML parsing error in {}: {}", part, e))
}
