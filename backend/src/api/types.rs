//! REST API request and response types.
//!
//! JSON field names are camelCase throughout.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{
    ConvertError, MappingError, PipelineError, ServerError, SheetError, StoreError,
};
use crate::models::{ConversionResult, Record, Row};
use crate::parser::{Sheet, Workbook};
use crate::store::StoredConversion;
use crate::transform::{ConversionOutput, ConvertOptions};

/// Response sent after a workbook upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookResponse {
    pub filename: String,
    /// Detected encoding (CSV only)
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only)
    pub delimiter: Option<String>,
    pub sheets: Vec<SheetSummary>,
}

/// Sheet header information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// First rows of a sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPreview {
    pub name: String,
    pub headers: Vec<String>,
    pub row_count: usize,
    pub rows: Vec<Row>,
}

/// Body of `POST /api/convert`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    /// Sheet to convert; the first sheet when absent
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(flatten)]
    pub options: ConvertOptions,
}

/// Body of `POST /api/mappings/{id}/move`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    /// Rule whose position the moved rule takes
    pub anchor_id: String,
}

/// Response sent after a conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    /// "ready", or "warning" when columns are missing or the save failed
    pub status: String,
    pub key: Option<String>,
    pub filename: String,
    pub sheet: String,
    pub timestamp: i64,
    pub record_count: usize,
    pub selected_rows: usize,
    pub missing_columns: Vec<String>,
    pub storage_error: Option<String>,
    /// Suggested download name
    pub export_file_name: String,
    pub data: Vec<Record>,
}

/// One entry of the conversion history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub key: String,
    pub filename: String,
    pub sheet: String,
    pub timestamp: i64,
    pub record_count: usize,
}

impl From<&Sheet> for SheetSummary {
    fn from(sheet: &Sheet) -> Self {
        SheetSummary {
            name: sheet.name.clone(),
            headers: sheet.headers.clone(),
            row_count: sheet.row_count(),
        }
    }
}

impl SheetPreview {
    pub fn new(sheet: &Sheet, rows: usize) -> Self {
        SheetPreview {
            name: sheet.name.clone(),
            headers: sheet.headers.clone(),
            row_count: sheet.row_count(),
            rows: sheet.preview(rows).to_vec(),
        }
    }
}

impl From<&Workbook> for WorkbookResponse {
    fn from(workbook: &Workbook) -> Self {
        WorkbookResponse {
            filename: workbook.filename.clone(),
            encoding: workbook.encoding.clone(),
            delimiter: workbook.delimiter.map(|d| d.to_string()),
            sheets: workbook.sheets.iter().map(SheetSummary::from).collect(),
        }
    }
}

impl From<ConversionOutput> for ConvertResponse {
    fn from(output: ConversionOutput) -> Self {
        let warning = !output.missing_columns.is_empty() || output.storage_error.is_some();
        let export_file_name = output.result.export_file_name();
        let ConversionResult {
            timestamp,
            filename,
            sheet,
            data,
        } = output.result;

        ConvertResponse {
            status: if warning { "warning" } else { "ready" }.to_string(),
            key: output.key,
            filename,
            sheet,
            timestamp,
            record_count: data.len(),
            selected_rows: output.selected_rows,
            missing_columns: output.missing_columns,
            storage_error: output.storage_error,
            export_file_name,
            data,
        }
    }
}

impl From<&StoredConversion> for ConversionSummary {
    fn from(stored: &StoredConversion) -> Self {
        ConversionSummary {
            key: stored.key.clone(),
            filename: stored.result.filename.clone(),
            sheet: stored.result.sheet.clone(),
            timestamp: stored.result.timestamp,
            record_count: stored.result.record_count(),
        }
    }
}

/// HTTP status for an error
pub fn status_for(error: &ServerError) -> StatusCode {
    match error {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Pipeline(err) => match err {
            PipelineError::Sheet(SheetError::SheetNotFound(_)) => StatusCode::NOT_FOUND,
            PipelineError::Sheet(SheetError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PipelineError::Sheet(SheetError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Sheet(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Mapping(MappingError::UnknownId(_)) => StatusCode::NOT_FOUND,
            PipelineError::Mapping(_) => StatusCode::BAD_REQUEST,
            PipelineError::Convert(ConvertError::InvalidWindow(_))
            | PipelineError::Convert(ConvertError::InvalidRows(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            PipelineError::Store(StoreError::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Store(StoreError::QuotaExceeded { .. }) => {
                StatusCode::INSUFFICIENT_STORAGE
            }
            PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
