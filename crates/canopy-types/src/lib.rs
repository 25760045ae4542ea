#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **canopy-types** – Shared primitive data structures for Canopy.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It owns object identity (kinds, metadata, storage paths), the flat
//! [`CatalogError`] taxonomy, the recognized configuration surface and the
//! per-request context threaded through every handler.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

//─────────────────────────────
//  Security constants
//─────────────────────────────

/// Maximum allowed size for a stored object payload to prevent memory
/// exhaustion through oversized catalog objects.
pub const MAX_OBJECT_DATA_LEN: usize = 1_048_576; // 1MB

/// Maximum allowed size for object descriptions.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Maximum depth of a storage path (number of `/`-separated labels).
pub const MAX_PATH_DEPTH: usize = 32;

//─────────────────────────────
//  Core identifiers
//─────────────────────────────

/// Unique identifier for a tenant.
pub type TenantId = Uuid;

/// Unique identifier for a project within a tenant.
pub type ProjectId = Uuid;

/// Unique identifier for a catalog.
pub type CatalogId = Uuid;

/// Unique identifier for a variant of a catalog.
pub type VariantId = Uuid;

/// Unique identifier for a workspace overlaying a variant.
pub type WorkspaceId = Uuid;

/// Unique identifier for a per-kind object directory.
pub type DirectoryId = Uuid;

/// Unique identifier for a persisted view.
pub type ViewId = Uuid;

/// Unique identifier for an issued token record (the JWT `jti`).
pub type TokenId = Uuid;

/// Unique identifier for a signing key.
pub type KeyId = Uuid;

//─────────────────────────────
//  Object kinds
//─────────────────────────────

/// Discriminator for every persisted catalog object and every registered
/// kind handler. Stored with each object row and used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// A tenant-owned namespace for variants and their contents.
    Catalog,
    /// A branch of a catalog with its own directory set.
    Variant,
    /// An additional axis within a variant; affects storage paths only.
    Namespace,
    /// An editable overlay on a variant with its own directory triple.
    Workspace,
    /// A typed value definition with optional validation and default.
    ParameterSchema,
    /// A named bundle of parameters referencing parameter schemas.
    CollectionSchema,
    /// An instance of a collection schema with concrete values.
    ValueCollection,
    /// A bundle of JSON-Schema validated resources.
    ResourceGroup,
    /// A set of executable skills; the execution runtime is external.
    SkillSet,
}

impl Kind {
    /// Canonical kind string as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Catalog => "Catalog",
            Kind::Variant => "Variant",
            Kind::Namespace => "Namespace",
            Kind::Workspace => "Workspace",
            Kind::ParameterSchema => "ParameterSchema",
            Kind::CollectionSchema => "CollectionSchema",
            Kind::ValueCollection => "ValueCollection",
            Kind::ResourceGroup => "ResourceGroup",
            Kind::SkillSet => "SkillSet",
        }
    }

    /// Parse a kind string, failing with [`CatalogError::UnsupportedKind`]
    /// for anything outside the registry.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s {
            "Catalog" => Ok(Kind::Catalog),
            "Variant" => Ok(Kind::Variant),
            "Namespace" => Ok(Kind::Namespace),
            "Workspace" => Ok(Kind::Workspace),
            "ParameterSchema" => Ok(Kind::ParameterSchema),
            "CollectionSchema" => Ok(Kind::CollectionSchema),
            "ValueCollection" => Ok(Kind::ValueCollection),
            "ResourceGroup" => Ok(Kind::ResourceGroup),
            "SkillSet" => Ok(Kind::SkillSet),
            other => Err(CatalogError::UnsupportedKind(other.to_string())),
        }
    }

    /// Whether objects of this kind live in a per-variant directory.
    pub fn is_directory_scoped(&self) -> bool {
        matches!(
            self,
            Kind::ParameterSchema
                | Kind::CollectionSchema
                | Kind::ValueCollection
                | Kind::ResourceGroup
                | Kind::SkillSet
        )
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//─────────────────────────────
//  Modules
//─────────────────────────────

/// Canonical object metadata and name/path validation.
pub mod metadata;
/// The flat error taxonomy shared by every crate.
pub mod error;
/// The recognized configuration surface.
pub mod config;
/// Per-request context threaded through handlers and stores.
pub mod context;

pub use config::{CanopyConfig, SecretString};
pub use context::RequestContext;
pub use error::CatalogError;
pub use metadata::SchemaMetadata;
