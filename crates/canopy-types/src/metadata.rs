//! Canonical object metadata.
//!
//! Every persisted object carries a [`SchemaMetadata`] naming it and placing
//! it in the hierarchy: catalog → variant → (workspace | namespace) → path.
//! Names follow DNS-label rules; paths are `/`-joined DNS labels with the
//! bare root `/` allowed. The *storage path* of an object is a deterministic
//! function of its placement and is unique within its kind's directory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::{MAX_DESCRIPTION_LEN, MAX_PATH_DEPTH};

/// Variant name applied when none is supplied.
pub const DEFAULT_VARIANT: &str = "default";

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("static regex"));

/// Validate a single DNS label (1-63 chars, lowercase alphanumeric + hyphen,
/// no leading/trailing hyphen).
pub fn validate_name(name: &str) -> Result<(), CatalogError> {
    if name.is_empty() {
        return Err(CatalogError::MissingRequiredAttribute("name".to_string()));
    }
    if !DNS_LABEL.is_match(name) {
        return Err(CatalogError::InvalidNameFormat(format!(
            "{name:?} is not a valid DNS label"
        )));
    }
    Ok(())
}

/// Validate a `/`-joined path of DNS labels. The bare root `/` is allowed.
pub fn validate_path(path: &str) -> Result<(), CatalogError> {
    if !path.starts_with('/') {
        return Err(CatalogError::InvalidNameFormat(format!(
            "path {path:?} must start with '/'"
        )));
    }
    if path == "/" {
        return Ok(());
    }
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if segments.len() > MAX_PATH_DEPTH {
        return Err(CatalogError::InvalidNameFormat(format!(
            "path {path:?} exceeds maximum depth of {MAX_PATH_DEPTH}"
        )));
    }
    for seg in segments {
        if !DNS_LABEL.is_match(seg) {
            return Err(CatalogError::InvalidNameFormat(format!(
                "path segment {seg:?} is not a valid DNS label"
            )));
        }
    }
    Ok(())
}

/// Collapse duplicate separators and strip any trailing `/`, preserving the
/// bare root.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(seg);
    }
    out
}

/// Identity and placement record embedded in every persisted object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    /// Object name (DNS label).
    #[serde(default)]
    pub name: String,
    /// Owning catalog name.
    #[serde(default)]
    pub catalog: String,
    /// Variant name; defaults to `"default"` when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Optional namespace axis within the variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Optional workspace overlay; wins over the variant's directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Placement path below the namespace root.
    #[serde(default)]
    pub path: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl SchemaMetadata {
    /// Merge `other` over `self`: non-empty override fields replace object
    /// fields. Returns the merged record; neither input is mutated.
    pub fn merged_with(&self, other: &SchemaMetadata) -> SchemaMetadata {
        fn pick(over: &str, base: &str) -> String {
            if over.is_empty() {
                base.to_string()
            } else {
                over.to_string()
            }
        }
        fn pick_opt(over: &Option<String>, base: &Option<String>) -> Option<String> {
            match over {
                Some(v) if !v.is_empty() => Some(v.clone()),
                _ => base.clone(),
            }
        }
        SchemaMetadata {
            name: pick(&other.name, &self.name),
            catalog: pick(&other.catalog, &self.catalog),
            variant: pick_opt(&other.variant, &self.variant),
            namespace: pick_opt(&other.namespace, &self.namespace),
            workspace: pick_opt(&other.workspace, &self.workspace),
            path: pick(&other.path, &self.path),
            description: pick(&other.description, &self.description),
        }
    }

    /// Apply defaults and validate every populated field.
    ///
    /// The variant defaults to [`DEFAULT_VARIANT`]; the path defaults to the
    /// root. Name, catalog, variant, namespace and every path segment must be
    /// DNS labels.
    pub fn canonicalize(&mut self) -> Result<(), CatalogError> {
        validate_name(&self.name)?;
        if self.catalog.is_empty() {
            return Err(CatalogError::MissingRequiredAttribute("catalog".to_string()));
        }
        validate_name(&self.catalog)?;
        match &self.variant {
            Some(v) if !v.is_empty() => validate_name(v)?,
            _ => self.variant = Some(DEFAULT_VARIANT.to_string()),
        }
        if let Some(ns) = &self.namespace {
            validate_name(ns)?;
        }
        if let Some(ws) = &self.workspace {
            validate_name(ws)?;
        }
        if self.path.is_empty() {
            self.path = "/".to_string();
        } else {
            self.path = normalize_path(&self.path);
        }
        validate_path(&self.path)?;
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(CatalogError::ValidationError(format!(
                "description exceeds {MAX_DESCRIPTION_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Variant name after canonicalization.
    pub fn variant_or_default(&self) -> &str {
        self.variant.as_deref().unwrap_or(DEFAULT_VARIANT)
    }

    /// Directory-relative path of the object's parent: the namespace (when
    /// present) followed by `path`.
    pub fn storage_dir(&self) -> String {
        let mut dir = String::from("/");
        if let Some(ns) = &self.namespace {
            dir.push_str(ns);
        }
        for seg in self.path.split('/').filter(|s| !s.is_empty()) {
            if !dir.ends_with('/') {
                dir.push('/');
            }
            dir.push_str(seg);
        }
        dir
    }

    /// Full storage path of the object within its kind's directory.
    pub fn storage_path(&self) -> String {
        let dir = self.storage_dir();
        if dir == "/" {
            format!("/{}", self.name)
        } else {
            format!("{}/{}", dir, self.name)
        }
    }
}
