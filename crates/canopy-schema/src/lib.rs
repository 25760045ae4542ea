#![forbid(unsafe_code)]

//! **canopy-schema** – Typed schema kinds for the Canopy catalog.
//!
//! Each catalog kind validates under a fixed grammar before anything is
//! persisted. This crate owns the per-kind specs and their *local*
//! validation: structure, data types, bounds, enums and defaults.
//! Cross-object checks (resolving a referenced parameter schema, verifying
//! a default against the referenced schema's validation) live in the
//! reference-graph manager, which calls back into the types defined here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use canopy_types::{CatalogError, Kind, SchemaMetadata};

pub mod collection;
pub mod parameter;
pub mod resource;
pub mod skillset;

pub use collection::{CollectionParameter, CollectionSchemaSpec, ValueCollectionSpec};
pub use parameter::{DataType, ParameterSchemaSpec, ParameterValidation};
pub use resource::{ResourceDef, ResourceGroupSpec};
pub use skillset::{SkillDef, SkillSetSpec};

/// API version stamped on objects that do not carry one.
pub const DEFAULT_API_VERSION: &str = "0.1.0-alpha.1";

static VERSION_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.]+)?$").expect("static regex")
});

/// Validate a version string's shape.
pub fn validate_version(version: &str) -> Result<(), CatalogError> {
    if VERSION_FORMAT.is_match(version) {
        Ok(())
    } else {
        Err(CatalogError::InvalidVersion(version.to_string()))
    }
}

/// The envelope every catalog object travels in:
/// `{apiVersion, kind, metadata, spec}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDocument {
    /// Schema version of the document; defaulted when absent.
    #[serde(default)]
    pub api_version: String,
    /// Kind discriminator; must match the handler the document reaches.
    pub kind: String,
    /// Identity and placement.
    pub metadata: SchemaMetadata,
    /// Kind-specific payload.
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl ObjectDocument {
    /// Parse a raw JSON object into an envelope addressed at `expected`,
    /// validating version shape and kind agreement. The metadata is *not*
    /// canonicalized here; that happens after overrides are merged.
    pub fn parse(expected: Kind, raw: &serde_json::Value) -> Result<Self, CatalogError> {
        let mut doc: ObjectDocument = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(e.to_string()))?;
        if doc.api_version.is_empty() {
            doc.api_version = DEFAULT_API_VERSION.to_string();
        }
        validate_version(&doc.api_version)?;
        let kind = Kind::parse(&doc.kind)?;
        if kind != expected {
            return Err(CatalogError::InvalidSchema(format!(
                "expected kind {expected}, got {kind}"
            )));
        }
        Ok(doc)
    }

    /// The storage representation: the bytes that get content-addressed.
    ///
    /// Placement fields (catalog, variant, namespace, workspace, path) are
    /// deliberately excluded so that identical content saved under many
    /// paths shares one blob; only the ref rows differ. serde_json maps
    /// are key-ordered, so equal content always hashes equally.
    pub fn storage_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        let repr = serde_json::json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "metadata": {
                "name": self.metadata.name,
                "description": self.metadata.description,
            },
            "spec": self.spec,
        });
        serde_json::to_vec(&repr)
            .map_err(|e| CatalogError::internal("failed to serialize object document", e))
    }
}
