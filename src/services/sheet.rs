//! Spreadsheet parsing into loosely-typed rows
//!
//! CSV goes through the `csv` crate with the delimiter sniffed from the
//! header line; Excel workbooks go through `calamine` (first worksheet only).
//! The first row is always the header. Fully blank rows are dropped, but
//! every data row keeps its 1-based position under the header.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use thiserror::Error;

use crate::types::{RawRow, UploadFile};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Could not read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Could not read workbook: {0}")]
    Workbook(String),
    #[error("The file has no header row")]
    MissingHeader,
}

/// A non-blank data row and where it sits in the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based; the first row under the header is 1
    pub row_index: u32,
    pub values: RawRow,
}

/// Parse an accepted upload into rows keyed by normalised header
pub fn parse_upload(file: &UploadFile) -> Result<Vec<SheetRow>, SheetError> {
    if file.is_csv() {
        parse_csv(&file.bytes)
    } else {
        parse_workbook(&file.bytes)
    }
}

/// `Company Name ` -> `company_name`
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn sniff_delimiter(content: &[u8]) -> u8 {
    let first_line = content.split(|b| *b == b'\n').next().unwrap_or_default();
    let count = |d: u8| first_line.iter().filter(|b| **b == d).count();

    let mut best = b',';
    for candidate in [b';', b'\t'] {
        if count(candidate) > count(best) {
            best = candidate;
        }
    }
    best
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<SheetRow>, SheetError> {
    let content = bytes.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .has_headers(true)
        .flexible(true)
        .from_reader(content);

    let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SheetError::MissingHeader);
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        if let Some(row) = build_row(idx, &headers, record.iter().map(str::to_string)) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn parse_workbook(bytes: &[u8]) -> Result<Vec<SheetRow>, SheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SheetError::Workbook(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SheetError::Workbook("workbook has no worksheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| SheetError::Workbook(e.to_string()))?;

    let mut iter = range.rows();
    let headers: Vec<String> = match iter.next() {
        Some(header_row) => header_row.iter().map(|c| normalize_header(&cell_to_string(c))).collect(),
        None => return Err(SheetError::MissingHeader),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SheetError::MissingHeader);
    }

    Ok(iter
        .enumerate()
        .filter_map(|(idx, r)| build_row(idx, &headers, r.iter().map(cell_to_string)))
        .collect())
}

/// Zip headers with values; `None` if every value is blank
fn build_row(idx: usize, headers: &[String], values: impl Iterator<Item = String>) -> Option<SheetRow> {
    let mut row = RawRow::new();
    let mut any_value = false;
    for (header, value) in headers.iter().zip(values) {
        if header.is_empty() {
            continue;
        }
        let value = value.trim().to_string();
        any_value |= !value.is_empty();
        row.insert(header.clone(), value);
    }
    any_value.then(|| SheetRow { row_index: idx as u32 + 1, values: row })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.to_string(),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", *v as i64),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        Data::DateTime(v) => match v.as_datetime() {
            Some(dt) => dt.date().format("%Y-%m-%d").to_string(),
            None => v.to_string(),
        },
        Data::DateTimeIso(v) => v.chars().take(10).collect(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}
