//! Relational records mirroring the persisted schema.
//!
//! These are dumb rows: view rules travel as raw JSON so that the storage
//! layer stays independent of the view model, and directory ids are plain
//! identifiers owned by their variant or workspace row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canopy_types::{
    CatalogError, CatalogId, DirectoryId, Kind, KeyId, ProjectId, TenantId, TokenId, VariantId,
    ViewId, WorkspaceId,
};

/// A tenant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Tenant identifier.
    pub tenant_id: TenantId,
}

/// A project row, scoped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project identifier.
    pub project_id: ProjectId,
    /// Owning tenant.
    pub tenant_id: TenantId,
}

/// A catalog row. Names are unique per project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Catalog identifier.
    pub catalog_id: CatalogId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Catalog name (DNS label).
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Opaque info payload.
    pub info: serde_json::Value,
}

/// A variant row owning the per-kind directory set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    /// Variant identifier.
    pub variant_id: VariantId,
    /// Owning catalog.
    pub catalog_id: CatalogId,
    /// Variant name (DNS label), unique within the catalog.
    pub name: String,
    /// Directory of parameter-schema refs.
    pub parameters_dir: DirectoryId,
    /// Directory of collection-schema refs.
    pub collections_dir: DirectoryId,
    /// Directory of value-collection and resource-group refs.
    pub values_dir: DirectoryId,
    /// Directory of skillset refs.
    pub skillset_dir: DirectoryId,
}

impl VariantRecord {
    /// A fresh variant with newly minted directories.
    pub fn new(catalog_id: CatalogId, name: impl Into<String>) -> Self {
        Self {
            variant_id: uuid::Uuid::new_v4(),
            catalog_id,
            name: name.into(),
            parameters_dir: uuid::Uuid::new_v4(),
            collections_dir: uuid::Uuid::new_v4(),
            values_dir: uuid::Uuid::new_v4(),
            skillset_dir: uuid::Uuid::new_v4(),
        }
    }

    /// The variant's own directory set.
    pub fn directories(&self) -> DirectorySet {
        DirectorySet {
            parameters: self.parameters_dir,
            collections: self.collections_dir,
            values: self.values_dir,
            skillsets: self.skillset_dir,
        }
    }
}

/// A namespace row; uniqueness is `(name, variant_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    /// Namespace name (DNS label).
    pub name: String,
    /// Owning variant.
    pub variant_id: VariantId,
    /// Free-form description.
    pub description: String,
}

/// A workspace row: an editable overlay on a variant with its own
/// directory triple. Workspace directories win over the variant's base
/// whenever a workspace id is supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    /// Workspace identifier.
    pub workspace_id: WorkspaceId,
    /// Variant this workspace overlays.
    pub variant_id: VariantId,
    /// Human label.
    pub label: String,
    /// Variant version the workspace was forked from.
    pub base_version: String,
    /// Workspace-local parameter-schema directory.
    pub parameters_dir: DirectoryId,
    /// Workspace-local collection-schema directory.
    pub collections_dir: DirectoryId,
    /// Workspace-local value directory.
    pub values_dir: DirectoryId,
}

impl WorkspaceRecord {
    /// A fresh workspace overlaying `variant` with newly minted directories.
    pub fn new(variant_id: VariantId, label: impl Into<String>) -> Self {
        Self {
            workspace_id: uuid::Uuid::new_v4(),
            variant_id,
            label: label.into(),
            base_version: "0".to_string(),
            parameters_dir: uuid::Uuid::new_v4(),
            collections_dir: uuid::Uuid::new_v4(),
            values_dir: uuid::Uuid::new_v4(),
        }
    }

    /// Directory set seen through this workspace. Skillsets have no
    /// workspace overlay and fall through to the variant.
    pub fn directories(&self, variant: &VariantRecord) -> DirectorySet {
        DirectorySet {
            parameters: self.parameters_dir,
            collections: self.collections_dir,
            values: self.values_dir,
            skillsets: variant.skillset_dir,
        }
    }
}

/// The per-kind directory set resolution picks for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectorySet {
    /// Parameter-schema directory.
    pub parameters: DirectoryId,
    /// Collection-schema directory.
    pub collections: DirectoryId,
    /// Value-collection / resource-group directory.
    pub values: DirectoryId,
    /// Skillset directory.
    pub skillsets: DirectoryId,
}

impl DirectorySet {
    /// Directory holding refs of the given kind.
    pub fn directory_for(&self, kind: Kind) -> Result<DirectoryId, CatalogError> {
        match kind {
            Kind::ParameterSchema => Ok(self.parameters),
            Kind::CollectionSchema => Ok(self.collections),
            Kind::ValueCollection | Kind::ResourceGroup => Ok(self.values),
            Kind::SkillSet => Ok(self.skillsets),
            other => Err(CatalogError::UnsupportedKind(format!(
                "{other} objects are not directory-scoped"
            ))),
        }
    }
}

/// A persisted view row. Rules travel as raw JSON; the view model parses
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    /// View identifier.
    pub view_id: ViewId,
    /// Owning catalog.
    pub catalog_id: CatalogId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human label, unique within the catalog.
    pub label: String,
    /// Free-form description.
    pub description: String,
    /// View definition as raw JSON (`{scope, rules}`).
    pub rules: serde_json::Value,
}

/// A token row proving a JWT's `jti` was issued by this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Token identifier, equal to the JWT `jti` claim.
    pub token_id: TokenId,
    /// View the token is bound to.
    pub view_id: ViewId,
    /// Expiry instant; the row is garbage after this.
    pub expire_at: DateTime<Utc>,
}

/// A signing-key row. At most one active key per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    /// Key identifier.
    pub key_id: KeyId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Raw Ed25519 public key bytes.
    pub public_key: Vec<u8>,
    /// Private half, encrypted at rest (salt ‖ nonce ‖ ciphertext).
    pub encrypted_private_key: Vec<u8>,
    /// Whether this is the tenant's active key.
    pub is_active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}
