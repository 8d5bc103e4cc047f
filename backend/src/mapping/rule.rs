//! Mapping rule definitions.
//!
//! A rule writes one output key per row: either a coerced cell from a source
//! column, or a constant (optionally auto-incremented).

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::models::{parse_number, CellValue};

/// Declared type of an output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    /// Infer boolean/number from text, pass everything else through.
    #[default]
    Auto,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::Auto => "auto",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a source column to an output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRule {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "excelColumn")]
    pub source_column: String,
    #[serde(alias = "jsonKey")]
    pub target_key: String,
    #[serde(default, alias = "dataType")]
    pub declared_type: ValueType,
}

/// Writes a constant (or a per-conversion counter) to an output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantRule {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "jsonKey")]
    pub target_key: String,
    #[serde(default = "default_constant_type", alias = "dataType")]
    pub declared_type: ValueType,
    #[serde(default, alias = "manualValue")]
    pub value: CellValue,
    #[serde(default)]
    pub auto_increment: bool,
}

fn default_constant_type() -> ValueType {
    ValueType::String
}

/// One entry of a mapping set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingRule {
    #[serde(alias = "excel")]
    Column(ColumnRule),
    #[serde(alias = "manual")]
    Constant(ConstantRule),
}

impl MappingRule {
    /// Column rule draft (no id yet).
    pub fn column(source_column: &str, target_key: &str, declared_type: ValueType) -> Self {
        MappingRule::Column(ColumnRule {
            id: String::new(),
            source_column: source_column.to_string(),
            target_key: target_key.to_string(),
            declared_type,
        })
    }

    /// Constant rule draft (no id yet).
    pub fn constant(target_key: &str, declared_type: ValueType, value: impl Into<CellValue>) -> Self {
        MappingRule::Constant(ConstantRule {
            id: String::new(),
            target_key: target_key.to_string(),
            declared_type,
            value: value.into(),
            auto_increment: false,
        })
    }

    /// Constant rule draft whose literal is read from user-typed text.
    ///
    /// The literal is fixed here, at authoring time: `number` parses the text
    /// (unparseable is `0`), `boolean` is true only for `"true"`, anything
    /// else keeps the text.
    pub fn constant_from_text(target_key: &str, declared_type: ValueType, text: &str) -> Self {
        let value = match declared_type {
            ValueType::Number => CellValue::Number(parse_number(text).unwrap_or(0.0)),
            ValueType::Boolean => CellValue::Bool(text.to_lowercase() == "true"),
            ValueType::String | ValueType::Auto => CellValue::Text(text.to_string()),
        };
        Self::constant(target_key, declared_type, value)
    }

    /// Turn a constant draft into an auto-increment counter.
    pub fn with_auto_increment(mut self) -> Self {
        if let MappingRule::Constant(ref mut c) = self {
            c.auto_increment = true;
        }
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.set_id(id.to_string());
        self
    }

    pub fn id(&self) -> &str {
        match self {
            MappingRule::Column(c) => &c.id,
            MappingRule::Constant(c) => &c.id,
        }
    }

    pub(crate) fn set_id(&mut self, id: String) {
        match self {
            MappingRule::Column(c) => c.id = id,
            MappingRule::Constant(c) => c.id = id,
        }
    }

    pub fn target_key(&self) -> &str {
        match self {
            MappingRule::Column(c) => &c.target_key,
            MappingRule::Constant(c) => &c.target_key,
        }
    }

    pub fn declared_type(&self) -> ValueType {
        match self {
            MappingRule::Column(c) => c.declared_type,
            MappingRule::Constant(c) => c.declared_type,
        }
    }

    /// Source column for column rules.
    pub fn source_column(&self) -> Option<&str> {
        match self {
            MappingRule::Column(c) => Some(&c.source_column),
            MappingRule::Constant(_) => None,
        }
    }

    /// Check the authoring invariants (target key, source column).
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.target_key().trim().is_empty() {
            return Err(MappingError::BlankTargetKey);
        }
        if let MappingRule::Column(c) = self {
            if c.source_column.is_empty() {
                return Err(MappingError::MissingSourceColumn);
            }
        }
        Ok(())
    }

    /// Constants cannot be `auto`; they fall back to `string`.
    pub(crate) fn normalized(mut self) -> Self {
        if let MappingRule::Constant(ref mut c) = self {
            if c.declared_type == ValueType::Auto {
                c.declared_type = ValueType::String;
            }
        }
        self
    }
}
