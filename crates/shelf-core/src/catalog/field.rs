//! Attribute definitions for entities.

use super::types::ScalarType;
use crate::store::Value;
use serde::{Deserialize, Serialize};

/// An attribute definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name.
    pub name: String,
    /// Attribute data type.
    #[serde(rename = "type")]
    pub scalar: ScalarType,
    /// Whether the attribute may be null.
    #[serde(default)]
    pub optional: bool,
    /// Declared default, used when a migration has no other source for the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

/// Declared default value for an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value (fits Int32, Int64 and Timestamp attributes).
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
}

impl DefaultValue {
    /// Check whether this default can populate an attribute of the given type.
    pub fn fits(&self, scalar: ScalarType) -> bool {
        match (self, scalar) {
            (DefaultValue::Bool(_), ScalarType::Bool) => true,
            (DefaultValue::Int(v), ScalarType::Int32) => i32::try_from(*v).is_ok(),
            (DefaultValue::Int(_), ScalarType::Int64 | ScalarType::Timestamp) => true,
            (DefaultValue::Float(_), ScalarType::Float64) => true,
            (DefaultValue::String(_), ScalarType::String) => true,
            _ => false,
        }
    }

    /// Materialize the default as a value of the given type.
    ///
    /// Returns `None` when the default does not fit the type.
    pub fn to_value(&self, scalar: ScalarType) -> Option<Value> {
        if !self.fits(scalar) {
            return None;
        }
        let value = match (self, scalar) {
            (DefaultValue::Bool(b), _) => Value::Bool(*b),
            (DefaultValue::Int(v), ScalarType::Int32) => Value::Int32(*v as i32),
            (DefaultValue::Int(v), ScalarType::Timestamp) => Value::Timestamp(*v),
            (DefaultValue::Int(v), _) => Value::Int64(*v),
            (DefaultValue::Float(f), _) => Value::Float64(*f),
            (DefaultValue::String(s), _) => Value::String(s.clone()),
        };
        Some(value)
    }
}

impl AttributeDef {
    /// Create a new required attribute.
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            optional: false,
            default: None,
        }
    }

    /// Create an optional attribute.
    pub fn optional(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
            optional: true,
            default: None,
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Check if this attribute has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// The declared default as a typed value, if any.
    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().and_then(|d| d.to_value(self.scalar))
    }

    /// Check whether a value may be stored in this attribute.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.optional;
        }
        value.scalar_type() == Some(self.scalar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_builder() {
        let attr = AttributeDef::new("sort", ScalarType::Int64).with_default(DefaultValue::Int(0));

        assert_eq!(attr.name, "sort");
        assert!(!attr.optional);
        assert!(attr.has_default());
        assert_eq!(attr.default_value(), Some(Value::Int64(0)));
    }

    #[test]
    fn test_optional_attribute() {
        let attr = AttributeDef::optional("notes", ScalarType::String);

        assert!(attr.optional);
        assert!(!attr.has_default());
        assert!(attr.accepts(&Value::Null));
        assert!(attr.accepts(&Value::String("x".into())));
        assert!(!attr.accepts(&Value::Int32(1)));
    }

    #[test]
    fn test_required_attribute_rejects_null() {
        let attr = AttributeDef::new("title", ScalarType::String);
        assert!(!attr.accepts(&Value::Null));
    }

    #[test]
    fn test_default_fits() {
        assert!(DefaultValue::Int(7).fits(ScalarType::Int32));
        assert!(!DefaultValue::Int(i64::MAX).fits(ScalarType::Int32));
        assert!(!DefaultValue::String("a".into()).fits(ScalarType::Bool));
        assert_eq!(
            DefaultValue::Int(5).to_value(ScalarType::Timestamp),
            Some(Value::Timestamp(5))
        );
    }

    #[test]
    fn test_attribute_from_json() {
        let attr: AttributeDef =
            serde_json::from_str(r#"{"name":"sort","type":"int64","default":{"int":0}}"#).unwrap();
        assert_eq!(attr.scalar, ScalarType::Int64);
        assert!(!attr.optional);
        assert_eq!(attr.default, Some(DefaultValue::Int(0)));
    }
}
