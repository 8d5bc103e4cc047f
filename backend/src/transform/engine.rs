//! Conversion engine
//!
//! Applies a row window and a mapping set to sheet rows and produces output
//! records. Pure apart from the per-call auto-increment counters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::coerce::coerce;
use crate::error::ConvertError;
use crate::mapping::{MappingRule, MappingSet};
use crate::models::{CellValue, Record, Row};

/// Rows to include in a conversion.
///
/// `start_row` is 1-based and inclusive. `end_row` is 1-based and
/// exclusive: the row at position `end_row` is not converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWindow {
    #[serde(default = "default_start_row")]
    pub start_row: usize,
    #[serde(default)]
    pub end_row: Option<usize>,
}

fn default_start_row() -> usize {
    1
}

impl Default for RowWindow {
    fn default() -> Self {
        Self {
            start_row: default_start_row(),
            end_row: None,
        }
    }
}

impl RowWindow {
    /// Build a checked window.
    pub fn new(start_row: usize, end_row: Option<usize>) -> Result<Self, ConvertError> {
        let window = Self { start_row, end_row };
        window.validate()?;
        Ok(window)
    }

    /// Check `start_row >= 1` and `end_row >= start_row`.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.start_row < 1 {
            return Err(ConvertError::InvalidWindow(
                "startRow must be at least 1".to_string(),
            ));
        }
        if let Some(end) = self.end_row {
            if end < self.start_row {
                return Err(ConvertError::InvalidWindow(format!(
                    "endRow ({}) must not be before startRow ({})",
                    end, self.start_row
                )));
            }
        }
        Ok(())
    }

    /// Whether the row at 0-based `index` is converted.
    pub fn contains(&self, index: usize) -> bool {
        let position = index + 1;
        position >= self.start_row && self.end_row.map_or(true, |end| position < end)
    }

    /// Number of rows selected out of `total`.
    pub fn selected_count(&self, total: usize) -> usize {
        let start = self.start_row.saturating_sub(1).min(total);
        let end = self
            .end_row
            .map_or(total, |end| end.saturating_sub(1).min(total));
        end.saturating_sub(start)
    }
}

/// Convert rows with a mapping set.
///
/// Rows outside the window are dropped. Every included row yields one record
/// with the rules applied in set order; a later rule writing an existing key
/// overwrites the value in place. Auto-increment counters start at 1 on every
/// call.
pub fn convert(
    rows: &[Row],
    window: RowWindow,
    mappings: &MappingSet,
) -> Result<Vec<Record>, ConvertError> {
    window.validate()?;

    let mut counters: HashMap<&str, u64> = mappings
        .iter()
        .filter_map(|rule| match rule {
            MappingRule::Constant(c) if c.auto_increment => Some((c.id.as_str(), 1)),
            _ => None,
        })
        .collect();

    let records = rows
        .iter()
        .enumerate()
        .filter(|(index, _)| window.contains(*index))
        .map(|(_, row)| convert_row(row, mappings, &mut counters))
        .collect();

    Ok(records)
}

/// Convert rows given as JSON (an array of flat objects).
pub fn convert_json(
    rows: &Value,
    window: RowWindow,
    mappings: &MappingSet,
) -> Result<Vec<Record>, ConvertError> {
    let rows = rows_from_json(rows)?;
    convert(&rows, window, mappings)
}

/// Read rows from JSON, rejecting anything but an array of objects of scalars.
pub fn rows_from_json(value: &Value) -> Result<Vec<Row>, ConvertError> {
    let items = value
        .as_array()
        .ok_or_else(|| ConvertError::InvalidRows("expected an array of rows".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let obj = item.as_object().ok_or_else(|| {
                ConvertError::InvalidRows(format!("row {} is not an object", index))
            })?;
            obj.iter()
                .map(|(column, cell)| {
                    let cell: CellValue = serde_json::from_value(cell.clone()).map_err(|_| {
                        ConvertError::InvalidRows(format!(
                            "row {}, column '{}': cell must be a scalar",
                            index, column
                        ))
                    })?;
                    Ok((column.clone(), cell))
                })
                .collect::<Result<Row, ConvertError>>()
        })
        .collect()
}

fn convert_row<'a>(
    row: &Row,
    mappings: &'a MappingSet,
    counters: &mut HashMap<&'a str, u64>,
) -> Record {
    let empty = CellValue::Empty;
    let mut record = Record::new();

    for rule in mappings.iter() {
        let value = match rule {
            MappingRule::Column(c) => {
                let raw = row.get(&c.source_column).unwrap_or(&empty);
                coerce(raw, c.declared_type)
            }
            MappingRule::Constant(c) if c.auto_increment => {
                let counter = counters.entry(c.id.as_str()).or_insert(1);
                let value = Value::from(*counter);
                *counter += 1;
                value
            }
            MappingRule::Constant(c) => c.value.to_json(),
        };
        record.insert(rule.target_key().to_string(), value);
    }

    record
}
