//! Raw tabular input: a header row plus string cells.
//!
//! Loading never interprets cell contents; typed parsing happens in
//! `records` once the required columns are known to exist.

use crate::error::{EngineError, EngineResult};
use crate::time::DISPLAY_FORMAT;
use calamine::{open_workbook_auto, Data, DataType, Reader};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table, trimming header names and normalizing every row to
    /// the header width. Rows with no non-blank cell are skipped.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let headers: Vec<String> = headers
            .into_iter()
            .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let width = headers.len();
        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn from_str_rows(name: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            name,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers.iter().position(|header| header == name)
    }

    /// Resolves every named column or fails with all of the missing names.
    pub fn require_columns(&self, required: &[&str]) -> EngineResult<Vec<usize>> {
        let mut found = Vec::with_capacity(required.len());
        let mut missing = Vec::new();
        for name in required {
            match self.column_index(name) {
                Some(idx) => found.push(idx),
                None => missing.push(name.trim().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::Schema {
                table: self.name.clone(),
                missing_columns: missing,
            });
        }
        Ok(found)
    }
}

/// Spreadsheet row number for a zero-based data row (header is row 1).
pub fn sheet_row(data_row: usize) -> usize {
    data_row + 2
}

/// Loads a table from disk, picking the reader from the file extension.
pub fn load_table(path: &Path) -> EngineResult<Table> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "csv" => load_delimited(path, b',')?,
        "tsv" | "txt" => load_delimited(path, b'\t')?,
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => load_workbook(path)?,
        other => {
            return Err(EngineError::Format(format!(
                "{} (extension {:?})",
                path.display(),
                other
            )))
        }
    };

    tracing::info!(
        path = %path.display(),
        columns = table.headers().len(),
        rows = table.len(),
        "loaded table"
    );
    Ok(table)
}

fn table_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("(unnamed)")
        .to_string()
}

fn load_delimited(path: &Path, delimiter: u8) -> EngineResult<Table> {
    let file = File::open(path).map_err(|err| EngineError::io(path, err))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table::new(table_name(path), headers, rows))
}

fn load_workbook(path: &Path) -> EngineResult<Table> {
    let mut workbook =
        open_workbook_auto(path).map_err(|err| EngineError::Spreadsheet(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EngineError::Spreadsheet(format!("{} has no worksheets", path.display())))?
        .map_err(|err| EngineError::Spreadsheet(err.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .unwrap_or_default();
    let body = rows
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Ok(Table::new(table_name(path), headers, body))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => value.clone(),
        Data::Float(value) => format_float_cell(*value),
        Data::Int(value) => value.to_string(),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|ts| ts.format(DISPLAY_FORMAT).to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

// Whole-number floats come back from spreadsheets as `5.0`; show them as `5`.
fn format_float_cell(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
