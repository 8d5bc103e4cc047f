//! Mapping rules and the mapping set manager.
//!
//! ```rust,ignore
//! use sheetmap::mapping::{MappingRule, MappingSet, ValueType};
//!
//! let mut set = MappingSet::new();
//! set.add(MappingRule::column("Price", "price", ValueType::Number))?;
//! set.add(MappingRule::constant("id", ValueType::Number, 0.0).with_auto_increment())?;
//! ```

pub mod rule;
pub mod set;

pub use rule::{ColumnRule, ConstantRule, MappingRule, ValueType};
pub use set::MappingSet;

use crate::error::MappingError;

/// Example mapping set for documentation and `sheetmap example-mappings`.
pub fn example_mapping_set() -> Result<MappingSet, MappingError> {
    let mut set = MappingSet::new();
    let drafts = [
        MappingRule::constant("id", ValueType::Number, 1.0).with_auto_increment(),
        MappingRule::column("Product", "name", ValueType::String),
        MappingRule::column("Price", "price", ValueType::Number),
        MappingRule::column("In Stock", "available", ValueType::Boolean),
        MappingRule::column("Notes", "notes", ValueType::Auto),
        MappingRule::constant_from_text("currency", ValueType::String, "EUR"),
    ];
    for draft in drafts {
        set.add(draft)?;
    }
    Ok(set)
}
