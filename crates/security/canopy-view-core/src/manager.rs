//! View persistence lifecycle: create from JSON, update in place by label,
//! delete by label, all scoped to a catalog.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use canopy_store_core::records::ViewRecord;
use canopy_store_core::traits::ViewStore;
use canopy_types::{CatalogError, CatalogId, TenantId, ViewId};

use crate::definition::ViewDefinition;

/// Catalog-scoped view CRUD over a [`ViewStore`].
#[derive(Clone)]
pub struct ViewManager {
    store: Arc<dyn ViewStore>,
}

impl ViewManager {
    /// Build a manager over the given store.
    pub fn new(store: Arc<dyn ViewStore>) -> Self {
        Self { store }
    }

    /// Parse, validate and persist a new view.
    pub async fn create_view(
        &self,
        tenant: TenantId,
        catalog: CatalogId,
        label: &str,
        description: &str,
        definition: &serde_json::Value,
    ) -> Result<ViewRecord, CatalogError> {
        let parsed = ViewDefinition::parse(definition)?;
        let record = ViewRecord {
            view_id: Uuid::new_v4(),
            catalog_id: catalog,
            tenant_id: tenant,
            label: label.to_string(),
            description: description.to_string(),
            rules: parsed.to_value()?,
        };
        self.store.create_view(&record).await?;
        info!(view_id = %record.view_id, label, "created view");
        Ok(record)
    }

    /// Replace an existing view's definition in place.
    pub async fn update_view(
        &self,
        tenant: TenantId,
        catalog: CatalogId,
        label: &str,
        description: &str,
        definition: &serde_json::Value,
    ) -> Result<ViewRecord, CatalogError> {
        let parsed = ViewDefinition::parse(definition)?;
        let existing = self
            .store
            .get_view_by_label(catalog, label)
            .await?
            .ok_or_else(|| CatalogError::ViewNotFound(label.to_string()))?;
        let record = ViewRecord {
            rules: parsed.to_value()?,
            description: description.to_string(),
            tenant_id: tenant,
            ..existing
        };
        self.store.update_view(&record).await?;
        Ok(record)
    }

    /// Delete a view by label; idempotent.
    pub async fn delete_view(&self, catalog: CatalogId, label: &str) -> Result<bool, CatalogError> {
        let removed = self.store.delete_view(catalog, label).await?;
        if removed {
            info!(label, "deleted view");
        }
        Ok(removed)
    }

    /// Load a view record by id.
    pub async fn load(&self, id: ViewId) -> Result<ViewRecord, CatalogError> {
        self.store
            .get_view(id)
            .await?
            .ok_or_else(|| CatalogError::ViewNotFound(id.to_string()))
    }

    /// Load a view record by label within a catalog.
    pub async fn load_by_label(
        &self,
        catalog: CatalogId,
        label: &str,
    ) -> Result<ViewRecord, CatalogError> {
        self.store
            .get_view_by_label(catalog, label)
            .await?
            .ok_or_else(|| CatalogError::ViewNotFound(label.to_string()))
    }

    /// Parse the definition stored on a record.
    pub fn definition_of(record: &ViewRecord) -> Result<ViewDefinition, CatalogError> {
        ViewDefinition::parse(&record.rules)
    }
}
