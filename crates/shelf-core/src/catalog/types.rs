//! Core type definitions for the catalog.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar data types an attribute can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// Binary data.
    Bytes,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float64
        )
    }

    /// Stable name used in signatures and diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float64 => "float64",
            ScalarType::String => "string",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Bytes => "bytes",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_checks() {
        assert!(ScalarType::Int32.is_numeric());
        assert!(ScalarType::Float64.is_numeric());
        assert!(!ScalarType::String.is_numeric());
        assert!(!ScalarType::Bool.is_numeric());
    }

    #[test]
    fn test_scalar_type_serde_names() {
        let parsed: ScalarType = serde_json::from_str("\"int64\"").unwrap();
        assert_eq!(parsed, ScalarType::Int64);
        assert_eq!(serde_json::to_string(&ScalarType::Timestamp).unwrap(), "\"timestamp\"");
        assert_eq!(ScalarType::Bytes.to_string(), "bytes");
    }
}
