//! Result tables and their export formats.
//!
//! The per-cell `highlights` flags are produced by the engine together with
//! the cell values; exporters only decide how to render them.

use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

const MATCH_FILL: &str = "#C6EFCE";
const MAX_XLSX_COLUMNS: usize = 16_384;
const MAX_XLSX_ROWS: usize = 1_048_575;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// `highlights[r][c]` is true when cell `(r, c)` reports a match.
    pub highlights: Vec<Vec<bool>>,
}

impl ResultTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            highlights: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: Vec<String>, highlights: Vec<bool>) {
        debug_assert_eq!(cells.len(), self.columns.len());
        debug_assert_eq!(highlights.len(), cells.len());
        self.rows.push(cells);
        self.highlights.push(highlights);
    }

    pub fn push_plain_row(&mut self, cells: Vec<String>) {
        let highlights = vec![false; cells.len()];
        self.push_row(cells, highlights);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(col)).map(String::as_str)
    }

    pub fn is_highlighted(&self, row: usize, column: &str) -> bool {
        self.column_index(column)
            .and_then(|col| self.highlights.get(row).and_then(|flags| flags.get(col)))
            .copied()
            .unwrap_or(false)
    }

    pub fn highlighted_cells(&self) -> usize {
        self.highlights
            .iter()
            .map(|flags| flags.iter().filter(|flag| **flag).count())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    /// Picks the format from the file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("xlsx") => Self::Xlsx,
            Some("json") => Self::Json,
            _ => Self::Csv,
        }
    }
}

/// Writes `table` to `path` in the format implied by its extension.
pub fn export(table: &ResultTable, path: &Path) -> EngineResult<ExportFormat> {
    let format = ExportFormat::from_path(path);
    match format {
        ExportFormat::Csv => {
            let file = File::create(path).map_err(|err| EngineError::io(path, err))?;
            write_csv(table, BufWriter::new(file))?;
        }
        ExportFormat::Json => {
            let file = File::create(path).map_err(|err| EngineError::io(path, err))?;
            let mut writer = BufWriter::new(file);
            write_json(table, &mut writer)?;
            writer.flush().map_err(|err| EngineError::io(path, err))?;
        }
        ExportFormat::Xlsx => write_xlsx(table, path)?,
    }
    tracing::info!(
        path = %path.display(),
        format = ?format,
        rows = table.len(),
        "exported result"
    );
    Ok(format)
}

pub fn write_csv<W: Write>(table: &ResultTable, writer: W) -> EngineResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .flush()
        .map_err(|err| EngineError::Csv(csv::Error::from(err)))?;
    Ok(())
}

pub fn write_json<W: Write>(table: &ResultTable, writer: W) -> EngineResult<()> {
    serde_json::to_writer_pretty(writer, table)?;
    Ok(())
}

pub fn write_xlsx(table: &ResultTable, path: &Path) -> EngineResult<()> {
    if table.columns.len() > MAX_XLSX_COLUMNS || table.len() > MAX_XLSX_ROWS {
        return Err(EngineError::Format(format!(
            "{} columns x {} rows does not fit in one worksheet",
            table.columns.len(),
            table.len()
        )));
    }

    let mut workbook = Workbook::new();
    let header_fmt = Format::new().set_bold();
    let wrap_fmt = Format::new().set_text_wrap();
    let match_fmt = Format::new().set_background_color(MATCH_FILL);
    let match_wrap_fmt = Format::new()
        .set_background_color(MATCH_FILL)
        .set_text_wrap();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Result")?;

    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name.as_str(), &header_fmt)?;
    }

    for (r, cells) in table.rows.iter().enumerate() {
        let row = (r + 1) as u32;
        for (col, value) in cells.iter().enumerate() {
            let highlighted = table
                .highlights
                .get(r)
                .and_then(|flags| flags.get(col))
                .copied()
                .unwrap_or(false);
            let format = match (highlighted, value.contains('\n')) {
                (true, true) => Some(&match_wrap_fmt),
                (true, false) => Some(&match_fmt),
                (false, true) => Some(&wrap_fmt),
                (false, false) => None,
            };
            let col = col as u16;
            match (numeric_cell(value), format) {
                (Some(number), Some(format)) => {
                    sheet.write_number_with_format(row, col, number, format)?
                }
                (Some(number), None) => sheet.write_number(row, col, number)?,
                (None, Some(format)) => {
                    sheet.write_string_with_format(row, col, value.as_str(), format)?
                }
                (None, None) => sheet.write_string(row, col, value.as_str())?,
            };
        }
    }

    sheet.autofit();
    workbook.save(path)?;
    Ok(())
}

/// A cell written back as a number only when it is already in the form
/// `format_number` produces, so keys such as `007` stay text.
fn numeric_cell(value: &str) -> Option<f64> {
    let number: f64 = value.parse().ok()?;
    (number.is_finite() && format_number(number) == value).then_some(number)
}

/// Renders a sum for display: integers without decimals, otherwise at most
/// six fractional digits with trailing zeros removed.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.0}");
    }
    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        let mut table = ResultTable::new(vec!["Site".to_string(), "Door Open".to_string()]);
        table.push_row(vec!["A1".to_string(), "✓".to_string()], vec![false, true]);
        table.push_plain_row(vec!["B2".to_string(), String::new()]);
        table
    }

    #[test]
    fn cell_lookup_and_highlight_flags() {
        let table = sample();
        assert_eq!(table.cell(0, "Door Open"), Some("✓"));
        assert_eq!(table.cell(1, "Site"), Some("B2"));
        assert_eq!(table.cell(5, "Site"), None);
        assert!(table.is_highlighted(0, "Door Open"));
        assert!(!table.is_highlighted(1, "Door Open"));
        assert_eq!(table.highlighted_cells(), 1);
    }

    #[test]
    fn export_format_follows_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("out.XLSX")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::from_path(Path::new("out.json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Csv);
    }

    #[test]
    fn csv_output_quotes_embedded_newlines() {
        let mut table = ResultTable::new(vec!["Site".to_string(), "Detail".to_string()]);
        table.push_plain_row(vec!["A1".to_string(), "a\nb".to_string()]);
        let mut buf = Vec::new();
        write_csv(&table, &mut buf).expect("csv");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "Site,Detail\nA1,\"a\nb\"\n");
    }

    #[test]
    fn json_output_carries_highlights() {
        let mut buf = Vec::new();
        write_json(&sample(), &mut buf).expect("json");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("parse");
        assert_eq!(value["columns"][1], "Door Open");
        assert_eq!(value["highlights"][0][1], true);
        assert_eq!(value["highlights"][1][1], false);
    }

    #[test]
    fn export_writes_csv_and_xlsx_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let table = sample();

        let csv_path = dir.path().join("result.csv");
        assert_eq!(export(&table, &csv_path).expect("csv"), ExportFormat::Csv);
        let text = std::fs::read_to_string(&csv_path).expect("read");
        assert!(text.starts_with("Site,Door Open\n"));

        let xlsx_path = dir.path().join("result.xlsx");
        assert_eq!(export(&table, &xlsx_path).expect("xlsx"), ExportFormat::Xlsx);
        let bytes = std::fs::read(&xlsx_path).expect("read xlsx");
        assert!(bytes.starts_with(b"PK"), "xlsx is a zip container");
    }

    #[test]
    fn only_canonical_numbers_become_numeric_cells() {
        assert_eq!(numeric_cell("5"), Some(5.0));
        assert_eq!(numeric_cell("2.5"), Some(2.5));
        assert_eq!(numeric_cell("-3"), Some(-3.0));
        assert_eq!(numeric_cell("007"), None);
        assert_eq!(numeric_cell("1e3"), None);
        assert_eq!(numeric_cell(""), None);
        assert_eq!(numeric_cell("A1"), None);
        assert_eq!(numeric_cell("NaN"), None);
    }

    #[test]
    fn xlsx_export_keeps_sums_numeric() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut table = ResultTable::new(vec!["Remarks".to_string(), "Total".to_string()]);
        table.push_plain_row(vec!["Power".to_string(), "11".to_string()]);
        table.push_row(
            vec!["007".to_string(), "2.5".to_string()],
            vec![false, true],
        );
        let path = dir.path().join("grouped.xlsx");
        write_xlsx(&table, &path).expect("xlsx");

        let mut workbook: calamine::Xlsx<_> = calamine::open_workbook(&path).expect("open");
        let range = calamine::Reader::worksheet_range(&mut workbook, "Result").expect("sheet");
        assert_eq!(range.get_value((1, 1)), Some(&calamine::Data::Float(11.0)));
        assert_eq!(range.get_value((2, 1)), Some(&calamine::Data::Float(2.5)));
        assert_eq!(
            range.get_value((2, 0)),
            Some(&calamine::Data::String("007".to_string()))
        );
    }

    #[test]
    fn numbers_render_compactly() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(-0.0000001), "0");
    }
}
