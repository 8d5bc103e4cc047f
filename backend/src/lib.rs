//! # Sheetmap - Spreadsheet rows to typed JSON records
//!
//! Sheetmap reads CSV and spreadsheet workbooks, applies an ordered set of
//! column mappings to a window of rows and stores each conversion as a JSON
//! snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV / XLSX │────▶│   Parser    │────▶│  Transform  │────▶│    Store    │
//! │  (any enc.) │     │  (sheets)   │     │ (mappings)  │     │ (snapshots) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetmap::{convert_file, example_mapping_set, ConvertOptions};
//! use std::path::Path;
//!
//! let output = convert_file(
//!     Path::new("products.xlsx"),
//!     None,
//!     &example_mapping_set()?,
//!     &ConvertOptions::default(),
//!     None,
//! )?;
//! println!("{}", output.result.to_json()?);
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Settings from the environment
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cell values, rows, records and conversion results
//! - [`parser`] - CSV and workbook reading
//! - [`mapping`] - Mapping rules and the mapping set
//! - [`transform`] - Coercion, row window and pipeline
//! - [`store`] - Conversion history and mapping templates
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Reading
pub mod parser;

// Mappings
pub mod mapping;

// Transformation
pub mod transform;

// Persistence
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{Settings, DEFAULT_PREVIEW_ROWS, MAX_FILE_SIZE};

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConvertError, MappingError, PipelineError, PipelineResult, ServerError, SheetError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{CellValue, ConversionResult, Record, Row};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_csv, read_workbook,
    read_workbook_bytes, Sheet, Workbook,
};

// =============================================================================
// Re-exports - Mappings
// =============================================================================

pub use mapping::{example_mapping_set, MappingRule, MappingSet, ValueType};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    coerce, convert, convert_file, convert_json, convert_sheet, ConversionOutput,
    ConvertOptions, RowWindow,
};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{
    ConversionStore, MappingTemplateRegistry, StorageStatus, StoredConversion, StoredTemplate,
};

// =============================================================================
// Re-exports - Logging
// =============================================================================

pub use api::logs::{log_error, log_info, log_success, log_warning, LOG_BROADCASTER};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
