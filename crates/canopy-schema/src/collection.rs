//! Collection schemas and value collections.
//!
//! A collection schema bundles named parameters, each either inline-typed
//! (`dataType`) or referencing a parameter schema by name (`schema`). A
//! value collection instantiates a collection schema with concrete values.
//! Reference resolution happens upstream in the reference-graph manager;
//! this module owns the local grammar.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use canopy_types::metadata::validate_name;
use canopy_types::CatalogError;

use crate::parameter::{DataType, ParameterSchemaSpec};

/// One entry in a collection schema's `parameters` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectionParameter {
    /// Name of a parameter schema resolved via closest-ancestor lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Inline data type, mutually exclusive with `schema`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Optional default; validated against the resolved or inline type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// The `spec` of a `CollectionSchema` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CollectionSchemaSpec {
    /// Named parameters of the collection, ordered by name.
    pub parameters: BTreeMap<String, CollectionParameter>,
}

impl CollectionSchemaSpec {
    /// Parse a raw spec payload and check the local grammar.
    pub fn parse(raw: &Value) -> Result<Self, CatalogError> {
        let spec: CollectionSchemaSpec = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Local validation: names are DNS labels, exactly one of
    /// `schema`/`dataType` per parameter, inline defaults type-check.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (name, param) in &self.parameters {
            validate_name(name)?;
            match (&param.schema, &param.data_type) {
                (Some(schema), None) => validate_name(schema)?,
                (None, Some(data_type)) => {
                    if let Some(default) = &param.default {
                        let inline = ParameterSchemaSpec {
                            data_type: *data_type,
                            validation: None,
                            default: None,
                        };
                        inline.validate_value(name, default)?;
                    }
                }
                (Some(_), Some(_)) => {
                    return Err(CatalogError::ValidationError(format!(
                        "parameter {name}: schema and dataType are mutually exclusive"
                    )));
                }
                (None, None) => {
                    return Err(CatalogError::MissingRequiredAttribute(format!(
                        "parameter {name}: one of schema or dataType"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The parameter-schema names this collection depends on, with the
    /// parameter entries that reference them. Duplicates collapse.
    pub fn referenced_schemas(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        for param in self.parameters.values() {
            if let Some(schema) = &param.schema {
                seen.insert(schema.clone());
            }
        }
        seen.into_iter().collect()
    }

    /// Entries referencing a given schema name.
    pub fn parameters_using(&self, schema: &str) -> Vec<(&String, &CollectionParameter)> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.schema.as_deref() == Some(schema))
            .collect()
    }
}

/// The `spec` of a `ValueCollection` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ValueCollectionSpec {
    /// Collection schema this instance binds to, resolved by name. The
    /// binding is immutable once saved.
    pub schema: String,
    /// Concrete values keyed by parameter name.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl ValueCollectionSpec {
    /// Parse a raw spec payload.
    pub fn parse(raw: &Value) -> Result<Self, CatalogError> {
        let spec: ValueCollectionSpec = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        validate_name(&spec.schema)?;
        for name in spec.values.keys() {
            validate_name(name)?;
        }
        Ok(spec)
    }

    /// Check every value names a parameter of `schema`. Type validation of
    /// individual values happens against the resolved parameter schemas
    /// upstream; inline-typed parameters are checked here.
    pub fn validate_against(&self, schema: &CollectionSchemaSpec) -> Result<(), CatalogError> {
        for (name, value) in &self.values {
            let Some(param) = schema.parameters.get(name) else {
                return Err(CatalogError::UnknownParameter(name.clone()));
            };
            if let Some(data_type) = param.data_type {
                let inline = ParameterSchemaSpec {
                    data_type,
                    validation: None,
                    default: None,
                };
                inline.validate_value(name, value)?;
            }
        }
        Ok(())
    }
}
