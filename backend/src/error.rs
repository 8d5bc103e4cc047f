//! Error types for the sheetmap conversion pipeline.
//!
//! One enum per layer:
//!
//! - [`SheetError`] - reading CSV and spreadsheet files
//! - [`MappingError`] - authoring errors rejected by the mapping set
//! - [`ConvertError`] - invocation errors that abort a whole conversion
//! - [`StoreError`] - conversion store and template registry errors
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Sheet Reading Errors
// =============================================================================

/// Errors while reading a workbook or one of its sheets.
#[derive(Debug, Error)]
pub enum SheetError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content: {0}")]
    Encoding(String),

    /// Invalid CSV content.
    #[error("Invalid CSV format: {0}")]
    Csv(String),

    /// The spreadsheet library could not read the workbook.
    #[error("Failed to parse spreadsheet: {0}")]
    Workbook(String),

    /// File extension is not a supported spreadsheet format.
    #[error("Unsupported file format: '{0}'")]
    UnsupportedFormat(String),

    /// The workbook has no sheet with this name.
    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    /// The workbook contains no sheets at all.
    #[error("Workbook contains no sheets")]
    NoSheets,

    /// The sheet has no header row.
    #[error("Sheet '{0}' is empty")]
    EmptySheet(String),

    /// Upload exceeds the size limit.
    #[error("File is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },
}

impl From<csv::Error> for SheetError {
    fn from(err: csv::Error) -> Self {
        SheetError::Csv(err.to_string())
    }
}

impl From<calamine::Error> for SheetError {
    fn from(err: calamine::Error) -> Self {
        SheetError::Workbook(err.to_string())
    }
}

// =============================================================================
// Mapping Authoring Errors
// =============================================================================

/// Authoring errors. The mapping set is never mutated when one is returned.
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    /// Target key is empty or whitespace.
    #[error("Target key must not be blank")]
    BlankTargetKey,

    /// Column rule without a source column.
    #[error("Column mapping has no source column selected")]
    MissingSourceColumn,

    /// Patch carries no rule id.
    #[error("Mapping has no id")]
    MissingId,

    /// No rule with this id.
    #[error("Unknown mapping id: {0}")]
    UnknownId(String),

    /// Two rules share the same id.
    #[error("Duplicate mapping id: {0}")]
    DuplicateId(String),

    /// A rule of an imported list was rejected.
    #[error("Mapping #{index} rejected: {reason}")]
    Rejected { index: usize, reason: String },

    /// Mapping JSON could not be read.
    #[error("Invalid mapping JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for MappingError {
    fn from(err: serde_json::Error) -> Self {
        MappingError::Json(err.to_string())
    }
}

// =============================================================================
// Conversion Errors
// =============================================================================

/// Invocation errors: the whole conversion call fails.
///
/// Cell-level problems never produce one of these, they are resolved to
/// deterministic defaults by the coercion rules.
#[derive(Debug, Error, PartialEq)]
pub enum ConvertError {
    /// Row window bounds are out of range.
    #[error("Invalid row window: {0}")]
    InvalidWindow(String),

    /// Input rows are not an array of flat objects.
    #[error("Invalid rows: {0}")]
    InvalidRows(String),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the conversion store and the template registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entry not found.
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// Saving would exceed the configured quota.
    #[error("Storage quota exceeded ({needed} bytes needed, quota {quota} bytes). Please clear some data.")]
    QuotaExceeded { needed: u64, quota: u64 },

    /// Key is not a safe file name.
    #[error("Invalid key: '{0}'")]
    InvalidKey(String),

    /// Stored template is unusable.
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// IO error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// Storage failures after a successful conversion are not errors here, they
/// are reported on the result instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Sheet reading error.
    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Mapping authoring error.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Conversion invocation error.
    #[error("Conversion failed: {0}")]
    Convert(#[from] ConvertError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<MappingError> for ServerError {
    fn from(err: MappingError) -> Self {
        ServerError::Pipeline(err.into())
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => ServerError::NotFound(key),
            other => ServerError::Pipeline(other.into()),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for sheet reading.
pub type SheetResult<T> = Result<T, SheetError>;

/// Result type for mapping authoring.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for conversions.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
