//! Resource groups: named resources each carrying a JSON Schema and a
//! value validated against it.
//!
//! Schemas compile once under draft-07; a `null` value is accepted only
//! when the schema's `type` set contains `"null"`.

use std::collections::BTreeMap;

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use canopy_types::metadata::validate_name;
use canopy_types::CatalogError;

/// Size cap applied to each embedded JSON Schema.
const MAX_SCHEMA_BYTES: usize = 65_536; // 64 KiB

/// One entry in a resource group's `resources` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDef {
    /// JSON Schema (draft-07) the value must satisfy.
    pub schema: Value,
    /// The resource value.
    #[serde(default)]
    pub value: Value,
}

/// The `spec` of a `ResourceGroup` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceGroupSpec {
    /// Named resources, ordered by name.
    pub resources: BTreeMap<String, ResourceDef>,
}

impl ResourceGroupSpec {
    /// Parse a raw spec payload, compiling every schema and validating
    /// every value.
    pub fn parse(raw: &Value) -> Result<Self, CatalogError> {
        let spec: ResourceGroupSpec = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Compile each schema once and validate its value.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (name, def) in &self.resources {
            validate_name(name)?;
            let compiled = compile_schema(name, &def.schema)?;
            validate_resource_value(name, &def.schema, &compiled, &def.value)?;
        }
        Ok(())
    }

    /// Validate a replacement value for one resource.
    pub fn validate_value(&self, name: &str, value: &Value) -> Result<(), CatalogError> {
        let def = self
            .resources
            .get(name)
            .ok_or_else(|| CatalogError::ResourceGroupNotFound(name.to_string()))?;
        let compiled = compile_schema(name, &def.schema)?;
        validate_resource_value(name, &def.schema, &compiled, value)
    }
}

fn compile_schema(name: &str, schema: &Value) -> Result<JSONSchema, CatalogError> {
    let approx_len = schema.to_string().len();
    if approx_len > MAX_SCHEMA_BYTES {
        return Err(CatalogError::InvalidFieldSchema(format!(
            "{name}: schema exceeds {MAX_SCHEMA_BYTES} bytes ({approx_len} bytes)"
        )));
    }
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| CatalogError::InvalidFieldSchema(format!("{name}: invalid draft-07: {e}")))
}

/// Whether the schema's `type` keyword admits nulls.
fn schema_admits_null(schema: &Value) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == "null",
        Some(Value::Array(types)) => types.iter().any(|t| t == "null"),
        _ => false,
    }
}

fn validate_resource_value(
    name: &str,
    schema: &Value,
    compiled: &JSONSchema,
    value: &Value,
) -> Result<(), CatalogError> {
    if value.is_null() {
        if schema_admits_null(schema) {
            return Ok(());
        }
        return Err(CatalogError::TypeMismatch(format!(
            "{name}: null is not admitted by the schema"
        )));
    }
    if let Err(errors) = compiled.validate(value) {
        let detail: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(CatalogError::ValidationError(format!(
            "{name}: {}",
            detail.join("; ")
        )));
    }
    Ok(())
}
