use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{TurnoverError, TurnoverResult};

const EMPTY_HEADER_PREFIX: &str = "__EMPTY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFileKind {
    Xlsx,
    Xls,
    Csv,
}

/// One non-empty cell as read from the sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(value) => format_number(*value),
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// A data row as ordered `(header, value)` pairs. Empty cells are not present, so
/// key enumeration order is the column order of the non-empty cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRow {
    cells: Vec<(String, CellValue)>,
}

impl SheetRow {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[(String, CellValue)] {
        &self.cells
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(header, _)| header == key)
            .map(|(_, value)| value)
    }

    /// First exact key hit, in the order the candidates are given.
    pub fn first_exact(&self, keys: &[&str]) -> Option<&CellValue> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// First key in row order whose name contains any of `needles`.
    pub fn find_by_substring(&self, needles: &[&str]) -> Option<(&str, &CellValue)> {
        self.cells
            .iter()
            .find(|(header, _)| needles.iter().any(|needle| header.contains(needle)))
            .map(|(header, value)| (header.as_str(), value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSheet {
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<SheetRow>,
}

impl ParsedSheet {
    /// Builds the row view from a raw cell grid whose first row is the header row.
    /// Rows without any non-empty cell are dropped.
    pub fn from_grid(sheet_name: impl Into<String>, grid: Vec<Vec<Option<CellValue>>>) -> Self {
        let mut grid = grid.into_iter();
        let header_cells = grid.next().unwrap_or_default();
        let headers = unique_headers(&header_cells);

        let rows = grid
            .filter_map(|raw_row| {
                let cells = raw_row
                    .into_iter()
                    .zip(headers.iter())
                    .filter_map(|(cell, header)| cell.map(|value| (header.clone(), value)))
                    .collect::<Vec<_>>();
                if cells.is_empty() {
                    None
                } else {
                    Some(SheetRow::new(cells))
                }
            })
            .collect();

        Self {
            sheet_name: sheet_name.into(),
            headers,
            rows,
        }
    }
}

fn unique_headers(cells: &[Option<CellValue>]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut empty_count = 0_usize;
    let mut headers = Vec::with_capacity(cells.len());
    for cell in cells {
        let base = match cell.as_ref().map(CellValue::as_text) {
            Some(text) if !text.is_empty() => text,
            _ => {
                let name = if empty_count == 0 {
                    EMPTY_HEADER_PREFIX.to_string()
                } else {
                    format!("{EMPTY_HEADER_PREFIX}_{empty_count}")
                };
                empty_count += 1;
                name
            }
        };
        let name = match seen.get_mut(&base) {
            Some(count) => {
                *count += 1;
                format!("{base}_{count}")
            }
            None => {
                seen.insert(base.clone(), 0);
                base
            }
        };
        headers.push(name);
    }
    headers
}

fn text_cell(text: &str) -> Option<CellValue> {
    let text = text.trim_start_matches('\u{feff}');
    if text.is_empty() {
        None
    } else {
        Some(CellValue::Text(text.to_string()))
    }
}

fn calamine_cell(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::Float(value) => Some(CellValue::Number(*value)),
        Data::Int(value) => Some(CellValue::Number(*value as f64)),
        Data::String(text) => text_cell(text),
        other => text_cell(&other.to_string()),
    }
}

pub fn detect_file_kind(path: &Path) -> TurnoverResult<ImportFileKind> {
    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match suffix.as_str() {
        "xlsx" => Ok(ImportFileKind::Xlsx),
        "xls" => Ok(ImportFileKind::Xls),
        "csv" => Ok(ImportFileKind::Csv),
        _ => Err(TurnoverError::UnsupportedFileType(suffix)),
    }
}

fn read_csv_sheet(path: &Path) -> TurnoverResult<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut grid = Vec::new();
    for rec in reader.records() {
        let rec = rec?;
        grid.push(rec.iter().map(text_cell).collect::<Vec<_>>());
    }

    let sheet_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(ParsedSheet::from_grid(sheet_name, grid))
}

fn read_workbook_sheet(path: &Path) -> TurnoverResult<ParsedSheet> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| TurnoverError::WorkbookOpen(e.to_string()))?;
    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(TurnoverError::NoWorksheet)?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| TurnoverError::SheetRead(e.to_string()))?;

    let grid = range
        .rows()
        .map(|row| row.iter().map(calamine_cell).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    Ok(ParsedSheet::from_grid(first_sheet, grid))
}

/// Reads the first worksheet of an accepted upload. CSV files have no sheet name,
/// so the file stem stands in for it.
pub fn read_first_sheet(path: &Path) -> TurnoverResult<ParsedSheet> {
    if !path.exists() {
        return Err(TurnoverError::FileNotFound(
            path.to_string_lossy().to_string(),
        ));
    }
    if !path.is_file() {
        return Err(TurnoverError::NotAFile(path.to_string_lossy().to_string()));
    }

    match detect_file_kind(path)? {
        ImportFileKind::Csv => read_csv_sheet(path),
        ImportFileKind::Xlsx | ImportFileKind::Xls => read_workbook_sheet(path),
    }
}
