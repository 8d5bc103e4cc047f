//! High-level pipeline API: read a sheet, convert it, store the result.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetmap::mapping::example_mapping_set;
//! use sheetmap::store::ConversionStore;
//! use sheetmap::transform::{convert_file, ConvertOptions};
//! use std::path::Path;
//!
//! let store = ConversionStore::with_dir(".sheetmap/conversions");
//! let output = convert_file(
//!     Path::new("products.xlsx"),
//!     None,
//!     &example_mapping_set()?,
//!     &ConvertOptions::default(),
//!     Some(&store),
//! )?;
//! println!("Converted {} records", output.result.record_count());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::engine::{convert, RowWindow};
use crate::api::logs::{log_indent, log_info, log_success, log_warning, LogLevel};
use crate::error::{PipelineResult, SheetError};
use crate::mapping::MappingSet;
use crate::models::ConversionResult;
use crate::parser::{format_delimiter, read_workbook, Sheet};
use crate::store::ConversionStore;

/// Options for one conversion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Rows to convert
    #[serde(flatten)]
    pub window: RowWindow,

    /// Don't save the result to the conversion store
    #[serde(default)]
    pub no_save: bool,
}

/// Outcome of a conversion run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutput {
    /// Store key, when the result was saved
    pub key: Option<String>,

    /// The converted snapshot
    pub result: ConversionResult,

    /// Rows the window selected
    pub selected_rows: usize,

    /// Source columns referenced by mappings but absent from the sheet
    pub missing_columns: Vec<String>,

    /// Save failure; the conversion itself succeeded
    pub storage_error: Option<String>,
}

/// Convert one sheet and optionally save the result.
///
/// Missing source columns and an empty mapping set are warnings, not errors.
/// A failed save is reported on the output and does not discard the records.
pub fn convert_sheet(
    sheet: &Sheet,
    filename: &str,
    mappings: &MappingSet,
    options: &ConvertOptions,
    store: Option<&ConversionStore>,
) -> PipelineResult<ConversionOutput> {
    if sheet.is_empty() {
        return Err(SheetError::EmptySheet(sheet.name.clone()).into());
    }
    options.window.validate()?;

    let selected_rows = options.window.selected_count(sheet.row_count());
    log_info(format!(
        "⚙️  Converting sheet \"{}\" ({} of {} rows selected)",
        sheet.name,
        selected_rows,
        sheet.row_count()
    ));

    if mappings.is_empty() {
        log_warning("No mappings defined, records will be empty");
    }

    let missing_columns = mappings.missing_columns(&sheet.headers);
    if !missing_columns.is_empty() {
        log_warning(format!(
            "{} mapped column(s) not found in sheet, values will be empty:",
            missing_columns.len()
        ));
        for col in &missing_columns {
            log_indent(LogLevel::Warning, col.as_str(), 1);
        }
    }

    let records = convert(&sheet.rows, options.window, mappings)?;
    log_success(format!("Generated {} records", records.len()));

    let result = ConversionResult::new(filename, sheet.name.as_str(), records);

    let (key, storage_error) = match store {
        Some(store) if !options.no_save => match store.save(&result) {
            Ok(key) => {
                log_success(format!("Saved as: {}", key));
                (Some(key), None)
            }
            Err(e) => {
                log_warning(format!("Conversion not saved: {}", e));
                (None, Some(e.to_string()))
            }
        },
        _ => (None, None),
    };

    Ok(ConversionOutput {
        key,
        result,
        selected_rows,
        missing_columns,
        storage_error,
    })
}

/// Read a workbook from disk and convert one of its sheets.
///
/// Without a sheet name the first sheet is used.
pub fn convert_file(
    path: &Path,
    sheet_name: Option<&str>,
    mappings: &MappingSet,
    options: &ConvertOptions,
    store: Option<&ConversionStore>,
) -> PipelineResult<ConversionOutput> {
    log_info(format!("📖 Reading {}...", path.display()));
    let workbook = read_workbook(path)?;
    if let (Some(encoding), Some(delimiter)) = (&workbook.encoding, workbook.delimiter) {
        log_success(format!(
            "Detected encoding: {}, separator: '{}'",
            encoding,
            format_delimiter(delimiter)
        ));
    }

    let sheet = workbook.sheet_or_first(sheet_name)?;
    log_info(format!("📋 Sheet \"{}\" has {} columns:", sheet.name, sheet.headers.len()));
    for (i, col) in sheet.headers.iter().enumerate() {
        log_indent(LogLevel::Info, format!("[{:2}] {}", i + 1, col), 1);
    }

    convert_sheet(sheet, &workbook.filename, mappings, options, store)
}
