//! Cell coercion per declared type.
//!
//! Coercion never fails: every raw value maps to a deterministic output.
//!
//! | Declared | Empty  | Bool          | Number          | Text                                  |
//! |----------|--------|---------------|-----------------|---------------------------------------|
//! | string   | `""`   | `"true"`      | `"3.5"`         | unchanged                             |
//! | number   | `0`    | `1` / `0`     | unchanged       | parsed, `0` when not numeric          |
//! | boolean  | false  | unchanged     | non-zero        | true for `true`/`yes`/`1`             |
//! | auto     | `null` | unchanged     | unchanged       | boolean, number, or unchanged text    |

use serde_json::Value;

use crate::mapping::ValueType;
use crate::models::{number_to_json, parse_number, CellValue};

/// Text values (lowercased) that coerce to `true`.
const TRUE_WORDS: &[&str] = &["true", "yes", "1"];

/// Coerce a raw cell to its declared type.
pub fn coerce(raw: &CellValue, declared: ValueType) -> Value {
    match declared {
        ValueType::String => Value::String(raw.to_display_string()),
        ValueType::Number => number_to_json(to_number(raw).unwrap_or(0.0)),
        ValueType::Boolean => Value::Bool(to_boolean(raw)),
        ValueType::Auto => infer(raw),
    }
}

fn to_number(raw: &CellValue) -> Option<f64> {
    match raw {
        CellValue::Empty => None,
        CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        CellValue::Number(n) => Some(*n).filter(|n| n.is_finite()),
        CellValue::Text(s) => parse_number(s),
    }
}

fn to_boolean(raw: &CellValue) -> bool {
    match raw {
        CellValue::Empty => false,
        CellValue::Bool(b) => *b,
        CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
        CellValue::Text(s) => {
            let lower = s.to_lowercase();
            TRUE_WORDS.contains(&lower.as_str())
        }
    }
}

/// `auto`: only text is inspected. Empty stays `null`.
fn infer(raw: &CellValue) -> Value {
    if let CellValue::Text(s) = raw {
        match s.to_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if !s.trim().is_empty() {
            if let Some(n) = parse_number(s) {
                return number_to_json(n);
            }
        }
    }
    raw.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_string() {
        assert_eq!(coerce(&text("abc"), ValueType::String), json!("abc"));
        assert_eq!(coerce(&CellValue::Number(42.0), ValueType::String), json!("42"));
        assert_eq!(coerce(&CellValue::Number(3.5), ValueType::String), json!("3.5"));
        assert_eq!(coerce(&CellValue::Bool(false), ValueType::String), json!("false"));
        assert_eq!(coerce(&CellValue::Empty, ValueType::String), json!(""));
    }

    #[test]
    fn test_number() {
        assert_eq!(coerce(&text("42"), ValueType::Number), json!(42));
        assert_eq!(coerce(&text("abc"), ValueType::Number), json!(0));
        assert_eq!(coerce(&text(" 2.5 "), ValueType::Number), json!(2.5));
        assert_eq!(coerce(&text(""), ValueType::Number), json!(0));
        assert_eq!(coerce(&CellValue::Empty, ValueType::Number), json!(0));
        assert_eq!(coerce(&CellValue::Bool(true), ValueType::Number), json!(1));
        assert_eq!(coerce(&CellValue::Number(-7.25), ValueType::Number), json!(-7.25));
        assert_eq!(coerce(&text("0x1F"), ValueType::Number), json!(31));
        assert_eq!(coerce(&text("0x+1"), ValueType::Number), json!(0));
    }

    #[test]
    fn test_boolean() {
        assert_eq!(coerce(&text("Yes"), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&text("TRUE"), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&text("1"), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&text("0"), ValueType::Boolean), json!(false));
        assert_eq!(coerce(&text("no"), ValueType::Boolean), json!(false));
        assert_eq!(coerce(&text(" yes"), ValueType::Boolean), json!(false));
        assert_eq!(coerce(&CellValue::Bool(true), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&CellValue::Number(2.0), ValueType::Boolean), json!(true));
        assert_eq!(coerce(&CellValue::Number(0.0), ValueType::Boolean), json!(false));
        assert_eq!(coerce(&CellValue::Empty, ValueType::Boolean), json!(false));
    }

    #[test]
    fn test_auto() {
        assert_eq!(coerce(&text("3.5"), ValueType::Auto), json!(3.5));
        assert_eq!(coerce(&text("hello"), ValueType::Auto), json!("hello"));
        assert_eq!(coerce(&text("False"), ValueType::Auto), json!(false));
        assert_eq!(coerce(&text("true"), ValueType::Auto), json!(true));
        assert_eq!(coerce(&text(" 12 "), ValueType::Auto), json!(12));
        assert_eq!(coerce(&text("yes"), ValueType::Auto), json!("yes"));
        assert_eq!(coerce(&text("0x+1"), ValueType::Auto), json!("0x+1"));
    }

    #[test]
    fn test_auto_does_not_normalize_empties() {
        assert_eq!(coerce(&CellValue::Empty, ValueType::Auto), Value::Null);
        assert_eq!(coerce(&text(""), ValueType::Auto), json!(""));
        assert_eq!(coerce(&text("   "), ValueType::Auto), json!("   "));
    }

    #[test]
    fn test_auto_passes_non_text_through() {
        assert_eq!(coerce(&CellValue::Number(8.0), ValueType::Auto), json!(8));
        assert_eq!(coerce(&CellValue::Bool(true), ValueType::Auto), json!(true));
    }
}
