//! Transformation module.
//!
//! This module handles sheet rows to JSON records:
//! - Coerce: per-type cell coercion
//! - Engine: row window, mapping application, auto-increment counters
//! - Pipeline: read, convert and store in one call

pub mod coerce;
pub mod engine;
pub mod pipeline;

pub use coerce::coerce;
pub use engine::{convert, convert_json, rows_from_json, RowWindow};
pub use pipeline::{convert_file, convert_sheet, ConversionOutput, ConvertOptions};
