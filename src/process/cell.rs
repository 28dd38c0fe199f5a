// src/process/cell.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One value out of a sensor table or a remote-status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Coerce a raw field: integer first, then float, otherwise the trimmed text.
    /// Empty input stays an empty `Text`. Non-finite floats (`inf`, `NaN`) are kept as text.
    pub fn coerce(raw: &str) -> Cell {
        let s = raw.trim();
        if s.is_empty() {
            return Cell::Text(String::new());
        }
        if let Ok(i) = s.parse::<i64>() {
            return Cell::Integer(i);
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Cell::Float(f),
            _ => Cell::Text(s.to_string()),
        }
    }

    /// Convert a JSON scalar. Arrays, objects and `null` have no cell form.
    pub fn from_json(value: &Value) -> Option<Cell> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Cell::Integer(i))
                } else {
                    n.as_f64().map(Cell::Float)
                }
            }
            Value::String(s) => Some(Cell::Text(s.clone())),
            Value::Bool(b) => Some(Cell::Text(b.to_string())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Text(s) if s.is_empty())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Integer(i) => write!(f, "{}", i),
            // keep a decimal point on whole floats so "30.0" doesn't print as "30"
            Cell::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{:.1}", v),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Integer(i)
    }
}

impl From<f64> for Cell {
    fn from(f: f64) -> Self {
        Cell::Float(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coercion_order() {
        assert_eq!(Cell::coerce("69.3"), Cell::Float(69.3));
        assert_eq!(Cell::coerce("48"), Cell::Integer(48));
        assert_eq!(Cell::coerce("-7"), Cell::Integer(-7));
        assert_eq!(Cell::coerce(""), Cell::Text(String::new()));
        assert_eq!(Cell::coerce("   "), Cell::Text(String::new()));
        assert_eq!(Cell::coerce("N/A"), Cell::Text("N/A".into()));
        assert_eq!(Cell::coerce("inf"), Cell::Text("inf".into()));
        assert_eq!(Cell::coerce(" 30.1 "), Cell::Float(30.1));
    }

    #[test]
    fn test_display_keeps_decimal_point() {
        assert_eq!(Cell::Float(30.0).to_string(), "30.0");
        assert_eq!(Cell::Float(65.3).to_string(), "65.3");
        assert_eq!(Cell::Integer(2095).to_string(), "2095");
        assert_eq!(Cell::Text("%Humidity".into()).to_string(), "%Humidity");
    }

    #[test]
    fn test_from_json_scalars_only() {
        assert_eq!(Cell::from_json(&json!(52)), Some(Cell::Integer(52)));
        assert_eq!(Cell::from_json(&json!(0.5)), Some(Cell::Float(0.5)));
        assert_eq!(Cell::from_json(&json!("off")), Some(Cell::Text("off".into())));
        assert_eq!(Cell::from_json(&json!(true)), Some(Cell::Text("true".into())));
        assert_eq!(Cell::from_json(&json!(null)), None);
        assert_eq!(Cell::from_json(&json!([1, 2])), None);
        assert_eq!(Cell::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_untagged_serialization() -> anyhow::Result<()> {
        let cells = vec![Cell::Integer(48), Cell::Float(68.8), Cell::Text("N/A".into())];
        assert_eq!(serde_json::to_string(&cells)?, r#"[48,68.8,"N/A"]"#);
        Ok(())
    }
}
