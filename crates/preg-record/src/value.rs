//! Open-ended metadata values
//!
//! [`MetadataValue`] is a tagged value tree (null, bool, integer, float,
//! string, array, object). Objects are kept in a `BTreeMap`, so key order
//! never depends on insertion order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata object: string keys in sorted order
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// A JSON-like metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// Unsigned integer above `i64::MAX`
    UInteger(u64),
    Float(f64),
    String(String),
    Array(Vec<MetadataValue>),
    Object(MetadataMap),
}

impl MetadataValue {
    /// Empty object
    #[inline]
    #[must_use]
    pub fn empty_object() -> Self {
        Self::Object(MetadataMap::new())
    }

    /// Borrow as an object, if this is one
    #[inline]
    #[must_use]
    pub fn as_object(&self) -> Option<&MetadataMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) | Self::UInteger(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Find the first non-finite float, returning its path below `root`
    ///
    /// Paths look like `metadata.samples[2].density`.
    #[must_use]
    pub fn find_non_finite(&self, root: &str) -> Option<String> {
        match self {
            Self::Float(f) if !f.is_finite() => Some(root.to_string()),
            Self::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, v)| v.find_non_finite(&format!("{root}[{i}]"))),
            Self::Object(map) => map
                .iter()
                .find_map(|(k, v)| v.find_non_finite(&format!("{root}.{k}"))),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for MetadataValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as J;
        match value {
            J::Null => Self::Null,
            J::Bool(b) => Self::Bool(b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInteger(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            J::String(s) => Self::String(s),
            J::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            J::Object(map) => Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<u64> for MetadataValue {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Self::UInteger(u), Self::Integer)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<MetadataMap> for MetadataValue {
    fn from(map: MetadataMap) -> Self {
        Self::Object(map)
    }
}

impl<V: Into<MetadataValue>> FromIterator<(String, V)> for MetadataValue {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
