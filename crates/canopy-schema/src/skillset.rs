//! Skillsets: named skills with a source, declared capabilities and an
//! opaque spec. Execution is a runtime concern outside the catalog core;
//! the catalog only validates structure and stores the definition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use canopy_types::metadata::validate_name;
use canopy_types::CatalogError;

/// One entry in a skillset's `skills` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SkillDef {
    /// Where the skill's implementation lives (image, script, endpoint).
    pub source: String,
    /// Capabilities the skill requires at execution time.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Opaque runtime spec, passed through unchanged.
    #[serde(default)]
    pub spec: Value,
}

/// The `spec` of a `SkillSet` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SkillSetSpec {
    /// Named skills, ordered by name.
    pub skills: BTreeMap<String, SkillDef>,
}

impl SkillSetSpec {
    /// Parse a raw spec payload.
    pub fn parse(raw: &Value) -> Result<Self, CatalogError> {
        let spec: SkillSetSpec = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Names are DNS labels, sources are non-empty.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for (name, skill) in &self.skills {
            validate_name(name)?;
            if skill.source.trim().is_empty() {
                return Err(CatalogError::MissingRequiredAttribute(format!(
                    "skill {name}: source"
                )));
            }
        }
        Ok(())
    }
}
