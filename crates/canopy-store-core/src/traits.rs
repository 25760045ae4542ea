//! Store traits implemented by drivers.
//!
//! Every method is a potential suspension point; callers check their
//! request deadline before each call. Drivers serialize writes to a single
//! `(directory, path)` per tenant; no total order is promised across paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use canopy_types::{
    CatalogError, CatalogId, DirectoryId, ProjectId, TenantId, TokenId, VariantId, ViewId,
    WorkspaceId,
};

use crate::plan::{DeletePlan, SavePlan};
use crate::records::{
    CatalogRecord, NamespaceRecord, ProjectRecord, SigningKeyRecord, TenantRecord, TokenRecord,
    VariantRecord, ViewRecord, WorkspaceRecord,
};
use crate::{CatalogObject, ObjectHash, ObjectRef};

//─────────────────────────────
//  Object store
//─────────────────────────────

/// Content-addressed blob table plus path-indexed reference rows.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Insert a blob. Re-inserting the same `(tenant, hash)` is a
    /// successful no-op.
    async fn put_object(&self, tenant: TenantId, obj: &CatalogObject) -> Result<(), CatalogError>;

    /// Fetch a blob by content address.
    async fn get_object(
        &self,
        tenant: TenantId,
        hash: &ObjectHash,
    ) -> Result<Option<CatalogObject>, CatalogError>;

    /// Write-or-replace the ref row at `(directory, path)`.
    async fn upsert_ref(
        &self,
        tenant: TenantId,
        directory: DirectoryId,
        object_ref: &ObjectRef,
    ) -> Result<(), CatalogError>;

    /// Fetch the ref row at `(directory, path)`.
    async fn get_ref(
        &self,
        directory: DirectoryId,
        path: &str,
    ) -> Result<Option<ObjectRef>, CatalogError>;

    /// Delete the ref row, returning the displaced hash for the caller to
    /// potentially reap.
    async fn delete_ref(
        &self,
        tenant: TenantId,
        directory: DirectoryId,
        path: &str,
    ) -> Result<Option<ObjectHash>, CatalogError>;

    /// Add reference names to an existing ref row, idempotently.
    async fn add_references(
        &self,
        directory: DirectoryId,
        path: &str,
        names: &[String],
    ) -> Result<(), CatalogError>;

    /// Remove a reference name from an existing ref row, idempotently.
    async fn remove_reference(
        &self,
        directory: DirectoryId,
        path: &str,
        name: &str,
    ) -> Result<(), CatalogError>;

    /// Walk from `start_path` toward the root; at each ancestor directory,
    /// look for a ref whose last path component equals `target_name`.
    /// Returns the first (closest) hit.
    async fn find_closest(
        &self,
        directory: DirectoryId,
        target_name: &str,
        start_path: &str,
    ) -> Result<Option<(String, ObjectRef)>, CatalogError>;

    /// Whether the ref row at `path` carries any references (delete-safety).
    async fn has_any_reference(
        &self,
        directory: DirectoryId,
        path: &str,
    ) -> Result<bool, CatalogError>;

    /// All ref rows in the directory whose path starts with `prefix`,
    /// ordered by path.
    async fn list_refs(
        &self,
        directory: DirectoryId,
        prefix: &str,
    ) -> Result<Vec<ObjectRef>, CatalogError>;

    /// Execute a save plan atomically: blob insert, target ref upsert,
    /// back-reference delta on related rows.
    async fn commit_save(&self, tenant: TenantId, plan: SavePlan) -> Result<(), CatalogError>;

    /// Execute a delete plan atomically, then reap the displaced blob when
    /// its last ref is gone (reap failure is logged, not rolled back).
    /// Returns the displaced hash.
    async fn commit_delete(
        &self,
        tenant: TenantId,
        plan: DeletePlan,
    ) -> Result<Option<ObjectHash>, CatalogError>;
}

//─────────────────────────────
//  Identity store
//─────────────────────────────

/// Tenants, projects, catalogs, variants, namespaces and workspaces.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a tenant row.
    async fn create_tenant(&self, tenant: &TenantRecord) -> Result<(), CatalogError>;
    /// Insert a project row.
    async fn create_project(&self, project: &ProjectRecord) -> Result<(), CatalogError>;

    /// Insert a catalog; names are unique per project (`AlreadyExists`).
    async fn create_catalog(&self, catalog: &CatalogRecord) -> Result<(), CatalogError>;
    /// Look up a catalog by name within a project.
    async fn get_catalog(
        &self,
        tenant: TenantId,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<CatalogRecord>, CatalogError>;
    /// Look up a catalog by id.
    async fn get_catalog_by_id(&self, id: CatalogId) -> Result<Option<CatalogRecord>, CatalogError>;
    /// All catalogs in a project, ordered by name.
    async fn list_catalogs(
        &self,
        tenant: TenantId,
        project: ProjectId,
    ) -> Result<Vec<CatalogRecord>, CatalogError>;
    /// Update a catalog's description and info in place (`CatalogNotFound`).
    async fn update_catalog(&self, catalog: &CatalogRecord) -> Result<(), CatalogError>;
    /// Delete a catalog row; true when a row was removed.
    async fn delete_catalog(&self, id: CatalogId) -> Result<bool, CatalogError>;

    /// Insert a variant; names are unique per catalog (`AlreadyExists`).
    async fn create_variant(&self, variant: &VariantRecord) -> Result<(), CatalogError>;
    /// Look up a variant by name within a catalog.
    async fn get_variant(
        &self,
        catalog: CatalogId,
        name: &str,
    ) -> Result<Option<VariantRecord>, CatalogError>;
    /// All variants of a catalog, ordered by name.
    async fn list_variants(&self, catalog: CatalogId) -> Result<Vec<VariantRecord>, CatalogError>;
    /// Delete a variant row; true when a row was removed.
    async fn delete_variant(&self, catalog: CatalogId, name: &str) -> Result<bool, CatalogError>;

    /// Insert a namespace; uniqueness is `(name, variant)` (`AlreadyExists`).
    async fn create_namespace(&self, ns: &NamespaceRecord) -> Result<(), CatalogError>;
    /// Look up a namespace by name within a variant.
    async fn get_namespace(
        &self,
        variant: VariantId,
        name: &str,
    ) -> Result<Option<NamespaceRecord>, CatalogError>;
    /// All namespaces of a variant, ordered by name.
    async fn list_namespaces(
        &self,
        variant: VariantId,
    ) -> Result<Vec<NamespaceRecord>, CatalogError>;
    /// Update a namespace's description in place (`NamespaceNotFound`).
    async fn update_namespace(&self, ns: &NamespaceRecord) -> Result<(), CatalogError>;
    /// Delete a namespace row; true when a row was removed.
    async fn delete_namespace(&self, variant: VariantId, name: &str)
        -> Result<bool, CatalogError>;

    /// Insert a workspace row.
    async fn create_workspace(&self, ws: &WorkspaceRecord) -> Result<(), CatalogError>;
    /// Look up a workspace by id.
    async fn get_workspace(
        &self,
        id: WorkspaceId,
    ) -> Result<Option<WorkspaceRecord>, CatalogError>;
    /// Look up a workspace by label within a variant.
    async fn get_workspace_by_label(
        &self,
        variant: VariantId,
        label: &str,
    ) -> Result<Option<WorkspaceRecord>, CatalogError>;
    /// All workspaces of a variant, ordered by label.
    async fn list_workspaces(
        &self,
        variant: VariantId,
    ) -> Result<Vec<WorkspaceRecord>, CatalogError>;
    /// Delete a workspace row; true when a row was removed.
    async fn delete_workspace(&self, id: WorkspaceId) -> Result<bool, CatalogError>;
}

//─────────────────────────────
//  View / token / key stores
//─────────────────────────────

/// Persisted view records, scoped to a catalog and addressed by label.
#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Insert a view; labels are unique per catalog (`AlreadyExists`).
    async fn create_view(&self, view: &ViewRecord) -> Result<(), CatalogError>;
    /// Look up a view by id.
    async fn get_view(&self, id: ViewId) -> Result<Option<ViewRecord>, CatalogError>;
    /// Look up a view by label within a catalog.
    async fn get_view_by_label(
        &self,
        catalog: CatalogId,
        label: &str,
    ) -> Result<Option<ViewRecord>, CatalogError>;
    /// Replace a view in place by `(catalog, label)` (`ViewNotFound`).
    async fn update_view(&self, view: &ViewRecord) -> Result<(), CatalogError>;
    /// Delete a view by label; true when a row was removed.
    async fn delete_view(&self, catalog: CatalogId, label: &str) -> Result<bool, CatalogError>;
    /// All views of a catalog, ordered by label.
    async fn list_views(&self, catalog: CatalogId) -> Result<Vec<ViewRecord>, CatalogError>;
}

/// Issued-token records (`jti` proofs).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a token row.
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), CatalogError>;
    /// Look up a token row by id.
    async fn get_token(&self, id: TokenId) -> Result<Option<TokenRecord>, CatalogError>;
    /// Delete a token row before expiry; true when a row was removed.
    async fn delete_token(&self, id: TokenId) -> Result<bool, CatalogError>;
    /// Remove rows whose expiry lies at or before `now`; returns the count.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CatalogError>;
}

/// Signing-key records. This trait is the KMS seam: the bundled drivers
/// store encrypted keys locally, a production deployment substitutes an
/// external key service behind the same interface.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The tenant's active key, when one exists.
    async fn get_active_key(
        &self,
        tenant: TenantId,
    ) -> Result<Option<SigningKeyRecord>, CatalogError>;
    /// Insert a key row; enforces at most one active key per tenant
    /// (`AlreadyExists` when an active key is present and `key.is_active`).
    async fn insert_key(&self, key: &SigningKeyRecord) -> Result<(), CatalogError>;
}
