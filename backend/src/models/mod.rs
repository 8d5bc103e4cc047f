//! Domain models shared by the reader, the engine and the store.
//!
//! - [`CellValue`] - raw spreadsheet cell (empty, boolean, number or text)
//! - [`Row`] - one data row, column name to cell
//! - [`Record`] - one output object, keys in mapping order
//! - [`ConversionResult`] - immutable snapshot of one conversion run

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Largest integer a double represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Spreadsheet extensions stripped when naming an export file.
const SHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods", "csv", "tsv"];

static DECIMAL_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("decimal literal regex")
});

// =============================================================================
// Cell Values
// =============================================================================

/// A raw cell value as produced by the sheet reader.
///
/// JSON form is `null`, a boolean, a number or a string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// True for `Empty` and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// String form of the value; `Empty` becomes `""`.
    pub fn to_display_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
        }
    }

    /// JSON form of the value, numbers normalized by [`number_to_json`].
    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Empty => Value::Null,
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Number(n) => number_to_json(*n),
            CellValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// One data row: column header to cell value. Absent keys read as empty.
pub type Row = HashMap<String, CellValue>;

/// One output record. Keys keep the order of their first write.
pub type Record = serde_json::Map<String, Value>;

// =============================================================================
// Numbers
// =============================================================================

/// Convert a double to JSON.
///
/// Integral values within the exactly representable range become JSON
/// integers (`42`, not `42.0`). Non-finite values have no JSON form and
/// become `null`.
pub fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Format a double the way ECMAScript `String(n)` does.
///
/// Plain decimal notation between 1e-6 and 1e21, exponent notation outside
/// (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    format!("{}", n)
}

/// Parse text the way ECMAScript `Number(text)` does, minus infinities.
///
/// Surrounding whitespace is ignored and blank text is `0`. Accepts decimal
/// literals with sign, fraction and exponent, and `0x`/`0o`/`0b` integers.
/// Returns `None` when the text is not numeric or the value is not finite.
pub fn parse_number(text: &str) -> Option<f64> {
    let s = text.trim();
    if s.is_empty() {
        return Some(0.0);
    }

    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        return u128::from_str_radix(digits, radix).ok().map(|v| v as f64);
    }

    if !DECIMAL_LITERAL.is_match(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

// =============================================================================
// Conversion Result
// =============================================================================

/// Snapshot of one conversion. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Creation time, Unix milliseconds.
    pub timestamp: i64,
    /// Source file name.
    pub filename: String,
    /// Source sheet name.
    pub sheet: String,
    /// Output records.
    pub data: Vec<Record>,
}

impl ConversionResult {
    /// Wrap records produced now.
    pub fn new(filename: impl Into<String>, sheet: impl Into<String>, data: Vec<Record>) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            filename: filename.into(),
            sheet: sheet.into(),
            data,
        }
    }

    pub fn record_count(&self) -> usize {
        self.data.len()
    }

    /// Export form of the records: pretty JSON, 2-space indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.data)
    }

    /// File name for a download: spreadsheet extension swapped for `.json`.
    pub fn export_file_name(&self) -> String {
        let path = Path::new(&self.filename);
        let stem = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if SHEET_EXTENSIONS.contains(&ext.to_lowercase().as_str()) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&self.filename),
            _ => &self.filename,
        };
        let stem = if stem.is_empty() { "conversion" } else { stem };
        format!("{}.json", stem)
    }
}
