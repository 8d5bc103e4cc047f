//! Workbook reading.
//!
//! A workbook is a list of named sheets. Each sheet is a header row plus
//! data rows keyed by header. CSV files become a one-sheet workbook;
//! XLSX, XLSM, XLSB, XLS and ODS files are read with calamine.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

use super::{parse_csv_bytes, CSV_SHEET_NAME};
use crate::config::MAX_FILE_SIZE;
use crate::error::{SheetError, SheetResult};
use crate::models::{CellValue, Row};

/// Extensions read as delimited text.
const CSV_EXTENSIONS: &[&str] = &["csv", "tsv", "txt"];

/// Extensions read through calamine.
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

// =============================================================================
// Sheet
// =============================================================================

/// One sheet: header names and the data rows below them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Sheet {
    /// Build a sheet from raw rows. The first raw row is the header row.
    ///
    /// Header cells are stringified and trimmed; columns with a blank header
    /// are dropped. Cells past the header width are ignored and missing cells
    /// read as empty. Rows with only blank cells keep their position as
    /// all-empty rows, except trailing ones, which are trimmed.
    pub fn from_grid(name: impl Into<String>, mut grid: Vec<Vec<CellValue>>) -> Self {
        while grid.len() > 1 && grid.last().is_some_and(|raw| is_blank_row(raw)) {
            grid.pop();
        }
        let mut raw_rows = grid.into_iter();

        let columns: Vec<(usize, String)> = raw_rows
            .next()
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, cell)| (i, cell.to_display_string().trim().to_string()))
            .filter(|(_, header)| !header.is_empty())
            .collect();

        let rows = raw_rows
            .map(|raw| {
                let blank = is_blank_row(&raw);
                columns
                    .iter()
                    .map(|(i, header)| {
                        let cell = match raw.get(*i) {
                            Some(cell) if !blank => cell.clone(),
                            _ => CellValue::Empty,
                        };
                        (header.clone(), cell)
                    })
                    .collect::<Row>()
            })
            .collect();

        Self {
            name: name.into(),
            headers: columns.into_iter().map(|(_, header)| header).collect(),
            rows,
        }
    }

    /// First `n` data rows.
    pub fn preview(&self, n: usize) -> &[Row] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when the sheet has no header row.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

fn is_blank_row(raw: &[CellValue]) -> bool {
    raw.iter().all(CellValue::is_blank)
}

// =============================================================================
// Workbook
// =============================================================================

/// A parsed workbook file.
#[derive(Debug, Clone, Serialize)]
pub struct Workbook {
    /// Original file name
    pub filename: String,
    /// Detected text encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only)
    pub delimiter: Option<char>,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Look up a sheet by exact name.
    pub fn sheet(&self, name: &str) -> SheetResult<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SheetError::SheetNotFound(name.to_string()))
    }

    /// The named sheet, or the first one when no name is given.
    pub fn sheet_or_first(&self, name: Option<&str>) -> SheetResult<&Sheet> {
        match name {
            Some(name) => self.sheet(name),
            None => self.sheets.first().ok_or(SheetError::NoSheets),
        }
    }
}

/// Read a workbook from disk.
pub fn read_workbook(path: &Path) -> SheetResult<Workbook> {
    let size = std::fs::metadata(path)?.len() as usize;
    check_size(size)?;

    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workbook")
        .to_string();
    read_workbook_bytes(bytes, &filename)
}

/// Read a workbook from memory. The format is chosen from the file name.
pub fn read_workbook_bytes(bytes: Vec<u8>, filename: &str) -> SheetResult<Workbook> {
    check_size(bytes.len())?;

    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    if CSV_EXTENSIONS.contains(&ext.as_str()) {
        let grid = parse_csv_bytes(&bytes)?;
        return Ok(Workbook {
            filename: filename.to_string(),
            encoding: Some(grid.encoding),
            delimiter: Some(grid.delimiter),
            sheets: vec![Sheet::from_grid(CSV_SHEET_NAME, grid.rows)],
        });
    }

    if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return Ok(Workbook {
            filename: filename.to_string(),
            encoding: None,
            delimiter: None,
            sheets: read_spreadsheet(bytes)?,
        });
    }

    Err(SheetError::UnsupportedFormat(ext))
}

fn check_size(size: usize) -> SheetResult<()> {
    if size > MAX_FILE_SIZE {
        return Err(SheetError::FileTooLarge {
            size,
            limit: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

fn read_spreadsheet(bytes: Vec<u8>) -> SheetResult<Vec<Sheet>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let names: Vec<String> = workbook.sheet_names().to_vec();
    if names.is_empty() {
        return Err(SheetError::NoSheets);
    }

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let grid = range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect();
        sheets.push(Sheet::from_grid(name, grid));
    }
    Ok(sheets)
}

/// Map a calamine cell onto a [`CellValue`].
///
/// Dates stay numeric (Excel serial), matching what a spreadsheet shows
/// before formatting.
fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_from_grid_headers_and_rows() {
        let grid = vec![
            vec![text(" Name "), CellValue::Empty, CellValue::Number(2024.0)],
            vec![text("Alice"), text("ignored"), CellValue::Number(1.0)],
            vec![text("Bob")],
        ];
        let sheet = Sheet::from_grid("Data", grid);

        assert_eq!(sheet.headers, vec!["Name", "2024"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["Name"], text("Alice"));
        assert_eq!(sheet.rows[0]["2024"], CellValue::Number(1.0));
        assert_eq!(sheet.rows[1]["2024"], CellValue::Empty);
        assert!(!sheet.rows[0].contains_key(""));
    }

    #[test]
    fn test_from_grid_keeps_interior_blank_rows() {
        let grid = vec![
            vec![text("a"), text("b")],
            vec![text("1"), text("2")],
            vec![CellValue::Empty, text("  ")],
            vec![],
            vec![text("3"), CellValue::Empty],
            vec![CellValue::Empty],
            vec![],
        ];
        let sheet = Sheet::from_grid("Data", grid);

        assert_eq!(sheet.row_count(), 4);
        assert_eq!(sheet.rows[1]["a"], CellValue::Empty);
        assert_eq!(sheet.rows[1]["b"], CellValue::Empty);
        assert_eq!(sheet.rows[2]["a"], CellValue::Empty);
        assert_eq!(sheet.rows[3]["a"], text("3"));
    }

    #[test]
    fn test_blank_rows_keep_window_positions() {
        use crate::mapping::{MappingRule, MappingSet, ValueType};
        use crate::transform::{convert, RowWindow};
        use serde_json::json;

        let grid = vec![
            vec![text("n")],
            vec![text("r1")],
            vec![CellValue::Empty],
            vec![text("r3")],
            vec![text("r4")],
        ];
        let sheet = Sheet::from_grid("Data", grid);
        let mut mappings = MappingSet::new();
        mappings
            .add(MappingRule::column("n", "n", ValueType::Auto))
            .unwrap();

        let window = RowWindow::new(3, None).unwrap();
        let records = convert(&sheet.rows, window, &mappings).unwrap();
        let names: Vec<_> = records.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(names, vec![json!("r3"), json!("r4")]);

        let window = RowWindow::new(2, Some(3)).unwrap();
        let records = convert(&sheet.rows, window, &mappings).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["n"], json!(null));
    }

    #[test]
    fn test_from_empty_grid() {
        let sheet = Sheet::from_grid("Empty", vec![]);
        assert!(sheet.is_empty());
        assert_eq!(sheet.row_count(), 0);
    }

    #[test]
    fn test_preview() {
        let grid = std::iter::once(vec![text("n")])
            .chain((1..=5).map(|i| vec![CellValue::Number(i as f64)]))
            .collect();
        let sheet = Sheet::from_grid("Data", grid);

        assert_eq!(sheet.preview(3).len(), 3);
        assert_eq!(sheet.preview(50).len(), 5);
        assert_eq!(sheet.preview(0).len(), 0);
    }

    #[test]
    fn test_read_csv_workbook_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Product;Price;In Stock").unwrap();
        writeln!(file, "Widget;9.99;yes").unwrap();
        writeln!(file, ";;").unwrap();
        writeln!(file, "Gadget;12;no").unwrap();

        let workbook = read_workbook(file.path()).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Sheet1"]);
        assert_eq!(workbook.delimiter, Some(';'));

        let sheet = workbook.sheet("Sheet1").unwrap();
        assert_eq!(sheet.headers, vec!["Product", "Price", "In Stock"]);
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.rows[1]["Price"], CellValue::Empty);
        assert_eq!(sheet.rows[2]["Price"], text("12"));
    }

    #[test]
    fn test_sheet_lookup() {
        let workbook = read_workbook_bytes(b"a,b\n1,2".to_vec(), "data.csv").unwrap();
        assert!(matches!(
            workbook.sheet("Missing"),
            Err(SheetError::SheetNotFound(ref n)) if n == "Missing"
        ));
        assert_eq!(workbook.sheet_or_first(None).unwrap().name, "Sheet1");
    }

    #[test]
    fn test_unsupported_format() {
        let result = read_workbook_bytes(b"%PDF".to_vec(), "report.pdf");
        assert!(matches!(result, Err(SheetError::UnsupportedFormat(ref e)) if e == "pdf"));
    }

    #[test]
    fn test_corrupt_spreadsheet() {
        let result = read_workbook_bytes(b"not a zip archive".to_vec(), "broken.xlsx");
        assert!(matches!(result, Err(SheetError::Workbook(_))));
    }

    #[test]
    fn test_cell_value_mapping() {
        assert_eq!(cell_value(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(cell_value(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(cell_value(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(cell_value(&Data::Empty), CellValue::Empty);
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-01-31".into())),
            text("2024-01-31")
        );
    }
}
