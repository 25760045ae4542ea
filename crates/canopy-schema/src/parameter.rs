//! Parameter schemas: a typed value definition with optional validation
//! and an optional default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use canopy_types::CatalogError;

/// Data types a parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer.
    Integer,
    /// Double-precision float.
    Float,
    /// UTF-8 string.
    String,
    /// Boolean.
    Boolean,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataType::Integer => "Integer",
            DataType::Float => "Float",
            DataType::String => "String",
            DataType::Boolean => "Boolean",
        };
        f.write_str(s)
    }
}

impl DataType {
    /// Whether `value` is of this type. Integers reject fractional numbers;
    /// booleans are never numbers.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            DataType::Integer => value.is_i64() || value.is_u64(),
            DataType::Float => value.is_number(),
            DataType::String => value.is_string(),
            DataType::Boolean => value.is_boolean(),
        }
    }
}

/// Optional constraints applied on top of the data type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParameterValidation {
    /// Inclusive lower bound for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Inclusive upper bound for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Minimum length for string values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum length for string values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Closed set of admissible values.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

/// The `spec` of a `ParameterSchema` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParameterSchemaSpec {
    /// Declared value type.
    pub data_type: DataType,
    /// Optional constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ParameterValidation>,
    /// Optional default; must itself pass validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSchemaSpec {
    /// Parse a raw spec payload.
    pub fn parse(raw: &Value) -> Result<Self, CatalogError> {
        let spec: ParameterSchemaSpec = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Structural validation: bounds are sane, the default passes its own
    /// constraints.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if let Some(v) = &self.validation {
            if let (Some(min), Some(max)) = (v.min_value, v.max_value) {
                if min > max {
                    return Err(CatalogError::ValidationError(format!(
                        "minValue {min} exceeds maxValue {max}"
                    )));
                }
            }
            if let (Some(min), Some(max)) = (v.min_length, v.max_length) {
                if min > max {
                    return Err(CatalogError::ValidationError(format!(
                        "minLength {min} exceeds maxLength {max}"
                    )));
                }
            }
        }
        if let Some(default) = &self.default {
            self.validate_value("default", default)?;
        }
        Ok(())
    }

    /// Validate a concrete value against this schema. `name` labels error
    /// messages with the parameter being checked.
    pub fn validate_value(&self, name: &str, value: &Value) -> Result<(), CatalogError> {
        if !self.data_type.matches(value) {
            return Err(CatalogError::TypeMismatch(format!(
                "{name}: expected {} value, got {value}",
                self.data_type
            )));
        }
        let Some(validation) = &self.validation else {
            return Ok(());
        };
        if let Some(n) = value.as_f64() {
            if let Some(min) = validation.min_value {
                if n < min {
                    return Err(CatalogError::ValueBelowMin(format!(
                        "{name}: {n} is below minimum {min}"
                    )));
                }
            }
            if let Some(max) = validation.max_value {
                if n > max {
                    return Err(CatalogError::ValueAboveMax(format!(
                        "{name}: {n} is above maximum {max}"
                    )));
                }
            }
        }
        if let Some(s) = value.as_str() {
            if let Some(min) = validation.min_length {
                if s.len() < min {
                    return Err(CatalogError::ValueBelowMin(format!(
                        "{name}: length {} is below minimum {min}",
                        s.len()
                    )));
                }
            }
            if let Some(max) = validation.max_length {
                if s.len() > max {
                    return Err(CatalogError::ValueAboveMax(format!(
                        "{name}: length {} is above maximum {max}",
                        s.len()
                    )));
                }
            }
        }
        if let Some(allowed) = &validation.allowed {
            if !allowed.contains(value) {
                return Err(CatalogError::ValidationError(format!(
                    "{name}: {value} is not one of the allowed values"
                )));
            }
        }
        Ok(())
    }

    /// Whether `other` declares different validation semantics. Used by the
    /// reference-graph manager to decide when a re-save endangers
    /// dependents.
    pub fn validation_differs(&self, other: &ParameterSchemaSpec) -> bool {
        self.data_type != other.data_type || self.validation != other.validation
    }
}
