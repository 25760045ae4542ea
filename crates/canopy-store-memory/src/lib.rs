#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **canopy-store-memory** – In-memory storage driver for Canopy.
//!
//! A fast, non-persistent backend suitable for tests and development. All
//! state lives behind a single `RwLock`, which gives save and delete plans
//! the same atomicity the SQLite driver gets from database transactions:
//! a plan is applied under one write guard or not at all.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use canopy_store_core::paths::{ancestor_dirs, join_path};
use canopy_store_core::plan::{BackRefUpdate, DeletePlan, SavePlan};
use canopy_store_core::records::{
    CatalogRecord, NamespaceRecord, ProjectRecord, SigningKeyRecord, TenantRecord, TokenRecord,
    VariantRecord, ViewRecord, WorkspaceRecord,
};
use canopy_store_core::traits::{IdentityStore, KeyStore, ObjectStore, TokenStore, ViewStore};
use canopy_store_core::{CatalogObject, ObjectHash, ObjectRef, ObjectReference};
use canopy_types::{
    CatalogError, CatalogId, DirectoryId, TenantId, TokenId, VariantId, ViewId, WorkspaceId,
};

#[derive(Debug, Default)]
struct State {
    objects: HashMap<(TenantId, ObjectHash), CatalogObject>,
    // Ref rows remember their tenant so blob reaping can count survivors.
    refs: HashMap<(DirectoryId, String), (TenantId, ObjectRef)>,
    tenants: HashMap<TenantId, TenantRecord>,
    projects: HashMap<uuid::Uuid, ProjectRecord>,
    catalogs: HashMap<CatalogId, CatalogRecord>,
    variants: HashMap<VariantId, VariantRecord>,
    namespaces: HashMap<(VariantId, String), NamespaceRecord>,
    workspaces: HashMap<WorkspaceId, WorkspaceRecord>,
    views: HashMap<ViewId, ViewRecord>,
    tokens: HashMap<TokenId, TokenRecord>,
    keys: Vec<SigningKeyRecord>,
}

impl State {
    fn apply_back_ref_add(&mut self, update: &BackRefUpdate) {
        if let Some((_, r)) = self.refs.get_mut(&(update.directory, update.path.clone())) {
            if !r.has_reference(&update.reference) {
                r.references.push(ObjectReference {
                    name: update.reference.clone(),
                });
            }
        }
    }

    fn apply_back_ref_remove(&mut self, update: &BackRefUpdate) {
        if let Some((_, r)) = self.refs.get_mut(&(update.directory, update.path.clone())) {
            r.references.retain(|n| n.name != update.reference);
        }
    }

    fn reap_if_unreferenced(&mut self, tenant: TenantId, hash: ObjectHash) {
        let still_referenced = self
            .refs
            .values()
            .any(|(t, r)| *t == tenant && r.hash == hash);
        if !still_referenced && self.objects.remove(&(tenant, hash)).is_none() {
            // Keeps parity with the SQLite driver, where a missing blob row
            // at reap time is worth a log line but never an error.
            warn!(hash = %canopy_store_core::hash_hex(&hash), "blob already absent at reap time");
        }
    }
}

/// An in-memory, non-persistent catalog store.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs (may be less than ref count due to content
    /// deduplication).
    pub async fn object_count(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Number of stored ref rows across all directories.
    pub async fn ref_count(&self) -> usize {
        self.state.read().await.refs.len()
    }

    /// Clear all state. Useful between test cases.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, tenant: TenantId, obj: &CatalogObject) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state
            .objects
            .entry((tenant, obj.hash))
            .or_insert_with(|| obj.clone());
        Ok(())
    }

    async fn get_object(
        &self,
        tenant: TenantId,
        hash: &ObjectHash,
    ) -> Result<Option<CatalogObject>, CatalogError> {
        Ok(self.state.read().await.objects.get(&(tenant, *hash)).cloned())
    }

    async fn upsert_ref(
        &self,
        tenant: TenantId,
        directory: DirectoryId,
        object_ref: &ObjectRef,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state.refs.insert(
            (directory, object_ref.path.clone()),
            (tenant, object_ref.clone()),
        );
        Ok(())
    }

    async fn get_ref(
        &self,
        directory: DirectoryId,
        path: &str,
    ) -> Result<Option<ObjectRef>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .refs
            .get(&(directory, path.to_string()))
            .map(|(_, r)| r.clone()))
    }

    async fn delete_ref(
        &self,
        _tenant: TenantId,
        directory: DirectoryId,
        path: &str,
    ) -> Result<Option<ObjectHash>, CatalogError> {
        let mut state = self.state.write().await;
        let removed = state.refs.remove(&(directory, path.to_string()));
        Ok(removed.map(|(_, r)| r.hash))
    }

    async fn add_references(
        &self,
        directory: DirectoryId,
        path: &str,
        names: &[String],
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let (_, r) = state
            .refs
            .get_mut(&(directory, path.to_string()))
            .ok_or_else(|| CatalogError::ObjectNotFound(path.to_string()))?;
        for name in names {
            if !r.has_reference(name) {
                r.references.push(ObjectReference { name: name.clone() });
            }
        }
        Ok(())
    }

    async fn remove_reference(
        &self,
        directory: DirectoryId,
        path: &str,
        name: &str,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        if let Some((_, r)) = state.refs.get_mut(&(directory, path.to_string())) {
            r.references.retain(|n| n.name != name);
        }
        Ok(())
    }

    async fn find_closest(
        &self,
        directory: DirectoryId,
        target_name: &str,
        start_path: &str,
    ) -> Result<Option<(String, ObjectRef)>, CatalogError> {
        let state = self.state.read().await;
        for dir in ancestor_dirs(start_path) {
            let candidate = join_path(&dir, target_name);
            if let Some((_, r)) = state.refs.get(&(directory, candidate.clone())) {
                return Ok(Some((candidate, r.clone())));
            }
        }
        Ok(None)
    }

    async fn has_any_reference(
        &self,
        directory: DirectoryId,
        path: &str,
    ) -> Result<bool, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .refs
            .get(&(directory, path.to_string()))
            .map(|(_, r)| !r.references.is_empty())
            .unwrap_or(false))
    }

    async fn list_refs(
        &self,
        directory: DirectoryId,
        prefix: &str,
    ) -> Result<Vec<ObjectRef>, CatalogError> {
        let state = self.state.read().await;
        let mut rows: Vec<ObjectRef> = state
            .refs
            .iter()
            .filter(|((dir, path), _)| *dir == directory && path.starts_with(prefix))
            .map(|(_, (_, r))| r.clone())
            .collect();
        rows.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(rows)
    }

    async fn commit_save(&self, tenant: TenantId, plan: SavePlan) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state
            .objects
            .entry((tenant, plan.object.hash))
            .or_insert_with(|| plan.object.clone());
        let displaced = state.refs.insert(
            (plan.directory, plan.object_ref.path.clone()),
            (tenant, plan.object_ref.clone()),
        );
        for update in &plan.add_back_refs {
            state.apply_back_ref_add(update);
        }
        for update in &plan.remove_back_refs {
            state.apply_back_ref_remove(update);
        }
        // A replaced ref may have been the last path holding its old hash.
        if let Some((_, old)) = displaced {
            if old.hash != plan.object.hash {
                state.reap_if_unreferenced(tenant, old.hash);
            }
        }
        Ok(())
    }

    async fn commit_delete(
        &self,
        tenant: TenantId,
        plan: DeletePlan,
    ) -> Result<Option<ObjectHash>, CatalogError> {
        let mut state = self.state.write().await;
        let removed = state.refs.remove(&(plan.directory, plan.path.clone()));
        for update in &plan.remove_back_refs {
            state.apply_back_ref_remove(update);
        }
        match removed {
            Some((_, r)) => {
                state.reap_if_unreferenced(tenant, r.hash);
                Ok(Some(r.hash))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_tenant(&self, tenant: &TenantRecord) -> Result<(), CatalogError> {
        self.state
            .write()
            .await
            .tenants
            .insert(tenant.tenant_id, tenant.clone());
        Ok(())
    }

    async fn create_project(&self, project: &ProjectRecord) -> Result<(), CatalogError> {
        self.state
            .write()
            .await
            .projects
            .insert(project.project_id, project.clone());
        Ok(())
    }

    async fn create_catalog(&self, catalog: &CatalogRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let duplicate = state.catalogs.values().any(|c| {
            c.project_id == catalog.project_id
                && c.tenant_id == catalog.tenant_id
                && c.name == catalog.name
        });
        if duplicate {
            return Err(CatalogError::AlreadyExists(format!(
                "catalog {}",
                catalog.name
            )));
        }
        state.catalogs.insert(catalog.catalog_id, catalog.clone());
        Ok(())
    }

    async fn get_catalog(
        &self,
        tenant: TenantId,
        project: uuid::Uuid,
        name: &str,
    ) -> Result<Option<CatalogRecord>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .catalogs
            .values()
            .find(|c| c.tenant_id == tenant && c.project_id == project && c.name == name)
            .cloned())
    }

    async fn get_catalog_by_id(
        &self,
        id: CatalogId,
    ) -> Result<Option<CatalogRecord>, CatalogError> {
        Ok(self.state.read().await.catalogs.get(&id).cloned())
    }

    async fn list_catalogs(
        &self,
        tenant: TenantId,
        project: uuid::Uuid,
    ) -> Result<Vec<CatalogRecord>, CatalogError> {
        let state = self.state.read().await;
        let mut rows: Vec<CatalogRecord> = state
            .catalogs
            .values()
            .filter(|c| c.tenant_id == tenant && c.project_id == project)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn update_catalog(&self, catalog: &CatalogRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        match state.catalogs.get_mut(&catalog.catalog_id) {
            Some(existing) => {
                existing.description = catalog.description.clone();
                existing.info = catalog.info.clone();
                Ok(())
            }
            None => Err(CatalogError::CatalogNotFound(catalog.name.clone())),
        }
    }

    async fn delete_catalog(&self, id: CatalogId) -> Result<bool, CatalogError> {
        Ok(self.state.write().await.catalogs.remove(&id).is_some())
    }

    async fn create_variant(&self, variant: &VariantRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let duplicate = state
            .variants
            .values()
            .any(|v| v.catalog_id == variant.catalog_id && v.name == variant.name);
        if duplicate {
            return Err(CatalogError::AlreadyExists(format!(
                "variant {}",
                variant.name
            )));
        }
        state.variants.insert(variant.variant_id, variant.clone());
        Ok(())
    }

    async fn get_variant(
        &self,
        catalog: CatalogId,
        name: &str,
    ) -> Result<Option<VariantRecord>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .variants
            .values()
            .find(|v| v.catalog_id == catalog && v.name == name)
            .cloned())
    }

    async fn list_variants(&self, catalog: CatalogId) -> Result<Vec<VariantRecord>, CatalogError> {
        let state = self.state.read().await;
        let mut rows: Vec<VariantRecord> = state
            .variants
            .values()
            .filter(|v| v.catalog_id == catalog)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn delete_variant(&self, catalog: CatalogId, name: &str) -> Result<bool, CatalogError> {
        let mut state = self.state.write().await;
        let id = state
            .variants
            .values()
            .find(|v| v.catalog_id == catalog && v.name == name)
            .map(|v| v.variant_id);
        Ok(match id {
            Some(id) => state.variants.remove(&id).is_some(),
            None => false,
        })
    }

    async fn create_namespace(&self, ns: &NamespaceRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let key = (ns.variant_id, ns.name.clone());
        if state.namespaces.contains_key(&key) {
            return Err(CatalogError::AlreadyExists(format!("namespace {}", ns.name)));
        }
        state.namespaces.insert(key, ns.clone());
        Ok(())
    }

    async fn get_namespace(
        &self,
        variant: VariantId,
        name: &str,
    ) -> Result<Option<NamespaceRecord>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .namespaces
            .get(&(variant, name.to_string()))
            .cloned())
    }

    async fn list_namespaces(
        &self,
        variant: VariantId,
    ) -> Result<Vec<NamespaceRecord>, CatalogError> {
        let state = self.state.read().await;
        let mut rows: Vec<NamespaceRecord> = state
            .namespaces
            .values()
            .filter(|n| n.variant_id == variant)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn update_namespace(&self, ns: &NamespaceRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        match state.namespaces.get_mut(&(ns.variant_id, ns.name.clone())) {
            Some(existing) => {
                existing.description = ns.description.clone();
                Ok(())
            }
            None => Err(CatalogError::NamespaceNotFound(ns.name.clone())),
        }
    }

    async fn delete_namespace(
        &self,
        variant: VariantId,
        name: &str,
    ) -> Result<bool, CatalogError> {
        Ok(self
            .state
            .write()
            .await
            .namespaces
            .remove(&(variant, name.to_string()))
            .is_some())
    }

    async fn create_workspace(&self, ws: &WorkspaceRecord) -> Result<(), CatalogError> {
        self.state
            .write()
            .await
            .workspaces
            .insert(ws.workspace_id, ws.clone());
        Ok(())
    }

    async fn get_workspace(
        &self,
        id: WorkspaceId,
    ) -> Result<Option<WorkspaceRecord>, CatalogError> {
        Ok(self.state.read().await.workspaces.get(&id).cloned())
    }

    async fn get_workspace_by_label(
        &self,
        variant: VariantId,
        label: &str,
    ) -> Result<Option<WorkspaceRecord>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .workspaces
            .values()
            .find(|w| w.variant_id == variant && w.label == label)
            .cloned())
    }

    async fn list_workspaces(
        &self,
        variant: VariantId,
    ) -> Result<Vec<WorkspaceRecord>, CatalogError> {
        let state = self.state.read().await;
        let mut rows: Vec<WorkspaceRecord> = state
            .workspaces
            .values()
            .filter(|w| w.variant_id == variant)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(rows)
    }

    async fn delete_workspace(&self, id: WorkspaceId) -> Result<bool, CatalogError> {
        Ok(self.state.write().await.workspaces.remove(&id).is_some())
    }
}

#[async_trait]
impl ViewStore for MemoryStore {
    async fn create_view(&self, view: &ViewRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let duplicate = state
            .views
            .values()
            .any(|v| v.catalog_id == view.catalog_id && v.label == view.label);
        if duplicate {
            return Err(CatalogError::AlreadyExists(format!("view {}", view.label)));
        }
        state.views.insert(view.view_id, view.clone());
        Ok(())
    }

    async fn get_view(&self, id: ViewId) -> Result<Option<ViewRecord>, CatalogError> {
        Ok(self.state.read().await.views.get(&id).cloned())
    }

    async fn get_view_by_label(
        &self,
        catalog: CatalogId,
        label: &str,
    ) -> Result<Option<ViewRecord>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .views
            .values()
            .find(|v| v.catalog_id == catalog && v.label == label)
            .cloned())
    }

    async fn update_view(&self, view: &ViewRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let id = state
            .views
            .values()
            .find(|v| v.catalog_id == view.catalog_id && v.label == view.label)
            .map(|v| v.view_id);
        match id {
            Some(id) => {
                let mut updated = view.clone();
                updated.view_id = id;
                state.views.insert(id, updated);
                Ok(())
            }
            None => Err(CatalogError::ViewNotFound(view.label.clone())),
        }
    }

    async fn delete_view(&self, catalog: CatalogId, label: &str) -> Result<bool, CatalogError> {
        let mut state = self.state.write().await;
        let id = state
            .views
            .values()
            .find(|v| v.catalog_id == catalog && v.label == label)
            .map(|v| v.view_id);
        Ok(match id {
            Some(id) => state.views.remove(&id).is_some(),
            None => false,
        })
    }

    async fn list_views(&self, catalog: CatalogId) -> Result<Vec<ViewRecord>, CatalogError> {
        let state = self.state.read().await;
        let mut rows: Vec<ViewRecord> = state
            .views
            .values()
            .filter(|v| v.catalog_id == catalog)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(rows)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), CatalogError> {
        self.state
            .write()
            .await
            .tokens
            .insert(token.token_id, token.clone());
        Ok(())
    }

    async fn get_token(&self, id: TokenId) -> Result<Option<TokenRecord>, CatalogError> {
        Ok(self.state.read().await.tokens.get(&id).cloned())
    }

    async fn delete_token(&self, id: TokenId) -> Result<bool, CatalogError> {
        Ok(self.state.write().await.tokens.remove(&id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CatalogError> {
        let mut state = self.state.write().await;
        let before = state.tokens.len();
        state.tokens.retain(|_, t| t.expire_at > now);
        Ok((before - state.tokens.len()) as u64)
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get_active_key(
        &self,
        tenant: TenantId,
    ) -> Result<Option<SigningKeyRecord>, CatalogError> {
        Ok(self
            .state
            .read()
            .await
            .keys
            .iter()
            .find(|k| k.tenant_id == tenant && k.is_active)
            .cloned())
    }

    async fn insert_key(&self, key: &SigningKeyRecord) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        if key.is_active
            && state
                .keys
                .iter()
                .any(|k| k.tenant_id == key.tenant_id && k.is_active)
        {
            return Err(CatalogError::AlreadyExists(format!(
                "active signing key for tenant {}",
                key.tenant_id
            )));
        }
        state.keys.push(key.clone());
        Ok(())
    }
}
