//! FILENAME: pivot-dataset/src/value.rs
//! Record values and flat keys.
//!
//! Records are opaque field-name -> value maps. Dimension tuples are read out
//! of records as strings and joined with a reserved separator into flat keys,
//! which are what the cube and the key sets are indexed by.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Separator used to join dimension values into a flat key.
pub const KEY_SEPARATOR: char = '\u{0}';

/// A dimension-value tuple (one element per configured dimension).
pub type DimensionKey = SmallVec<[String; 4]>;

/// A single input record.
pub type Record = FxHashMap<String, DataValue>;

// ============================================================================
// DATA VALUE
// ============================================================================

/// A value stored in a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum DataValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl DataValue {
    /// Numeric view of the value. Text is accepted when it parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            DataValue::Number(n) if !n.is_nan() => Some(*n),
            DataValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| !n.is_nan()),
            _ => None,
        }
    }

    /// True for values that carry something worth collecting.
    pub fn is_present(&self) -> bool {
        match self {
            DataValue::Null => false,
            DataValue::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// String form used inside dimension tuples and flat keys.
    pub fn to_key_string(&self) -> String {
        match self {
            DataValue::Null => String::new(),
            DataValue::Bool(b) => b.to_string(),
            DataValue::Number(n) => format_number(*n),
            DataValue::Text(s) => s.clone(),
        }
    }
}

/// Formats a number without a trailing `.0` for integral values.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<f64> for DataValue {
    fn from(n: f64) -> Self {
        DataValue::Number(n)
    }
}

impl From<i64> for DataValue {
    fn from(n: i64) -> Self {
        DataValue::Number(n as f64)
    }
}

impl From<i32> for DataValue {
    fn from(n: i32) -> Self {
        DataValue::Number(n as f64)
    }
}

impl From<bool> for DataValue {
    fn from(b: bool) -> Self {
        DataValue::Bool(b)
    }
}

impl From<&str> for DataValue {
    fn from(s: &str) -> Self {
        DataValue::Text(s.to_string())
    }
}

impl From<String> for DataValue {
    fn from(s: String) -> Self {
        DataValue::Text(s)
    }
}

/// Builds a record from `(field, value)` pairs.
pub fn record_from<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<DataValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// ============================================================================
// FLAT KEYS
// ============================================================================

/// Joins a dimension tuple into its flat key.
pub fn flat_key<S: AsRef<str>>(parts: &[S]) -> String {
    let mut key = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(part.as_ref());
    }
    key
}

/// Splits a flat key back into its tuple. The empty key yields one empty element.
pub fn split_flat_key(key: &str) -> DimensionKey {
    key.split(KEY_SEPARATOR).map(str::to_string).collect()
}

/// Reads the dimension tuple of a record. Missing fields become empty elements.
pub fn dimension_key(record: &Record, dimensions: &[String]) -> DimensionKey {
    dimensions
        .iter()
        .map(|field| {
            record
                .get(field)
                .map(DataValue::to_key_string)
                .unwrap_or_default()
        })
        .collect()
}
