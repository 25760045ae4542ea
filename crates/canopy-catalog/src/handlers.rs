//! Kind-handler dispatch: a uniform CRUD surface over every kind.
//!
//! The registry is built by an explicit registration pass at startup; no
//! global state, no init-order surprises. Unknown kind strings fail with
//! `InvalidSchema("unsupported kind: …")`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use canopy_schema::ObjectDocument;
use canopy_store_core::records::{CatalogRecord, NamespaceRecord, VariantRecord, WorkspaceRecord};
use canopy_types::metadata::{validate_name, DEFAULT_VARIANT};
use canopy_types::{CatalogError, Kind, RequestContext};

use crate::canonical::Placement;
use crate::CatalogService;

/// Uniform operations every kind supports.
#[async_trait]
pub trait KindHandler: Send + Sync + std::fmt::Debug {
    /// Create a new object; fails with `AlreadyExists` when present.
    async fn create(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError>;
    /// Fetch the object addressed by the context.
    async fn get(&self, ctx: &RequestContext) -> Result<Value, CatalogError>;
    /// Replace an existing object; fails when absent.
    async fn update(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError>;
    /// Delete the addressed object; idempotent when absent.
    async fn delete(&self, ctx: &RequestContext) -> Result<(), CatalogError>;
    /// Enumerate objects under the context's path.
    async fn list(&self, ctx: &RequestContext) -> Result<Value, CatalogError>;
    /// Canonical storage location of the addressed object.
    async fn location(&self, ctx: &RequestContext) -> Result<String, CatalogError>;
}

//─────────────────────────────
//  Registry
//─────────────────────────────

/// Kind-string → handler dispatch table.
#[derive(Clone, Default)]
pub struct KindRegistry {
    handlers: HashMap<Kind, Arc<dyn KindHandler>>,
}

impl KindRegistry {
    /// An empty registry; callers register handlers explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a kind, replacing any previous one.
    pub fn register(&mut self, kind: Kind, handler: Arc<dyn KindHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// The standard registration pass over all supported kinds.
    pub fn with_defaults(service: Arc<CatalogService>) -> Self {
        let mut registry = Self::new();
        registry.register(Kind::Catalog, Arc::new(CatalogHandler::new(service.clone())));
        registry.register(Kind::Variant, Arc::new(VariantHandler::new(service.clone())));
        registry.register(
            Kind::Namespace,
            Arc::new(NamespaceHandler::new(service.clone())),
        );
        registry.register(
            Kind::Workspace,
            Arc::new(WorkspaceHandler::new(service.clone())),
        );
        for kind in [
            Kind::ParameterSchema,
            Kind::CollectionSchema,
            Kind::ValueCollection,
            Kind::ResourceGroup,
            Kind::SkillSet,
        ] {
            registry.register(kind, Arc::new(ObjectKindHandler::new(service.clone(), kind)));
        }
        registry
    }

    /// Resolve a kind string to its handler.
    pub fn handler(&self, kind: &str) -> Result<Arc<dyn KindHandler>, CatalogError> {
        let parsed = Kind::parse(kind)
            .map_err(|_| CatalogError::InvalidSchema(format!("unsupported kind: {kind}")))?;
        self.handlers
            .get(&parsed)
            .cloned()
            .ok_or_else(|| CatalogError::InvalidSchema(format!("unsupported kind: {kind}")))
    }
}

//─────────────────────────────
//  Object kinds
//─────────────────────────────

/// Shared handler for every directory-scoped object kind. The kind value
/// picks the save/delete path on the service.
#[derive(Debug)]
pub struct ObjectKindHandler {
    service: Arc<CatalogService>,
    kind: Kind,
}

impl ObjectKindHandler {
    /// Handler for one object kind.
    pub fn new(service: Arc<CatalogService>, kind: Kind) -> Self {
        Self { service, kind }
    }

    async fn save(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
    ) -> Result<Placement, CatalogError> {
        match self.kind {
            Kind::ParameterSchema => {
                let ignore = ctx.query_flag("ignoreSpecChange");
                self.service
                    .save_parameter_schema(ctx, doc, None, ignore)
                    .await
            }
            Kind::CollectionSchema => self.service.save_collection_schema(ctx, doc, None).await,
            Kind::ValueCollection => self.service.save_value_collection(ctx, doc, None).await,
            Kind::ResourceGroup => self.service.save_resource_group(ctx, doc, None).await,
            Kind::SkillSet => self.service.save_skill_set(ctx, doc, None).await,
            other => Err(CatalogError::UnsupportedKind(other.to_string())),
        }
    }
}

#[async_trait]
impl KindHandler for ObjectKindHandler {
    async fn create(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        let mut doc = ObjectDocument::parse(self.kind, body)?;
        let placement = {
            let mut probe = doc.clone();
            self.service.canonicalize(ctx, &mut probe, None).await?
        };
        let dir = placement.directories.directory_for(self.kind)?;
        if self
            .service
            .objects()
            .get_ref(dir, &placement.storage_path())
            .await?
            .is_some()
        {
            return Err(CatalogError::AlreadyExists(placement.storage_path()));
        }
        self.save(ctx, &mut doc).await?;
        serde_json::to_value(&doc)
            .map_err(|e| CatalogError::internal("failed to render object", e))
    }

    async fn get(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        let placement = self.service.placement_from_context(ctx, self.kind).await?;
        let doc = self
            .service
            .get_document(ctx, self.kind, &placement)
            .await?
            .ok_or_else(|| CatalogError::ObjectNotFound(placement.storage_path()))?;
        serde_json::to_value(&doc)
            .map_err(|e| CatalogError::internal("failed to render object", e))
    }

    async fn update(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        let mut doc = ObjectDocument::parse(self.kind, body)?;
        let placement = {
            let mut probe = doc.clone();
            self.service.canonicalize(ctx, &mut probe, None).await?
        };
        let dir = placement.directories.directory_for(self.kind)?;
        if self
            .service
            .objects()
            .get_ref(dir, &placement.storage_path())
            .await?
            .is_none()
        {
            return Err(CatalogError::ObjectNotFound(placement.storage_path()));
        }
        self.save(ctx, &mut doc).await?;
        serde_json::to_value(&doc)
            .map_err(|e| CatalogError::internal("failed to render object", e))
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<(), CatalogError> {
        let placement = self.service.placement_from_context(ctx, self.kind).await?;
        match self.kind {
            Kind::ParameterSchema => {
                self.service.delete_parameter_schema(ctx, &placement).await?;
            }
            Kind::CollectionSchema => {
                self.service.delete_collection_schema(ctx, &placement).await?;
            }
            Kind::ValueCollection => {
                self.service.delete_value_collection(ctx, &placement).await?;
            }
            Kind::ResourceGroup | Kind::SkillSet => {
                self.service.delete_plain(ctx, self.kind, &placement).await?;
            }
            other => return Err(CatalogError::UnsupportedKind(other.to_string())),
        }
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        ctx.check_deadline()?;
        let placement = self.service.scope_from_context(ctx).await?;
        let dir = placement.directories.directory_for(self.kind)?;
        let rows = self
            .service
            .objects()
            .list_refs(dir, &placement.storage_dir())
            .await?;
        let items: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "path": r.path,
                    "hash": canopy_store_core::hash_hex(&r.hash),
                })
            })
            .collect();
        Ok(Value::Array(items))
    }

    async fn location(&self, ctx: &RequestContext) -> Result<String, CatalogError> {
        let placement = self.service.placement_from_context(ctx, self.kind).await?;
        Ok(placement.storage_path())
    }
}

//─────────────────────────────
//  Identity kinds
//─────────────────────────────

fn body_str(body: &Value, field: &str) -> Result<String, CatalogError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CatalogError::MissingRequiredAttribute(field.to_string()))
}

fn body_str_or_default(body: &Value, field: &str) -> String {
    body.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn render<T: serde::Serialize>(record: &T) -> Result<Value, CatalogError> {
    serde_json::to_value(record).map_err(|e| CatalogError::internal("failed to render record", e))
}

/// Catalog CRUD. Creating a catalog also creates its `default` variant so
/// objects can be saved without further setup.
#[derive(Debug)]
pub struct CatalogHandler {
    service: Arc<CatalogService>,
}

impl CatalogHandler {
    /// Handler over the identity store.
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    async fn require(&self, ctx: &RequestContext) -> Result<CatalogRecord, CatalogError> {
        ctx.check_deadline()?;
        let name = ctx
            .catalog
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("catalog".to_string()))?;
        self.service
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, &name)
            .await?
            .ok_or(CatalogError::CatalogNotFound(name))
    }
}

#[async_trait]
impl KindHandler for CatalogHandler {
    async fn create(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        ctx.check_deadline()?;
        let name = body_str(body, "name")?;
        validate_name(&name)?;
        let record = CatalogRecord {
            catalog_id: Uuid::new_v4(),
            project_id: ctx.project_id,
            tenant_id: ctx.tenant_id,
            name,
            description: body_str_or_default(body, "description"),
            info: body.get("info").cloned().unwrap_or(json!({})),
        };
        self.service.identity().create_catalog(&record).await?;
        self.service
            .identity()
            .create_variant(&VariantRecord::new(record.catalog_id, DEFAULT_VARIANT))
            .await?;
        render(&record)
    }

    async fn get(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        render(&self.require(ctx).await?)
    }

    async fn update(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        let mut record = self.require(ctx).await?;
        record.description = body_str_or_default(body, "description");
        if let Some(info) = body.get("info") {
            record.info = info.clone();
        }
        self.service.identity().update_catalog(&record).await?;
        render(&record)
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<(), CatalogError> {
        match self.require(ctx).await {
            Ok(record) => {
                self.service.identity().delete_catalog(record.catalog_id).await?;
                Ok(())
            }
            Err(CatalogError::CatalogNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        ctx.check_deadline()?;
        let rows = self
            .service
            .identity()
            .list_catalogs(ctx.tenant_id, ctx.project_id)
            .await?;
        render(&rows)
    }

    async fn location(&self, ctx: &RequestContext) -> Result<String, CatalogError> {
        let record = self.require(ctx).await?;
        Ok(format!("/catalogs/{}", record.name))
    }
}

/// Variant CRUD under the context's catalog.
#[derive(Debug)]
pub struct VariantHandler {
    service: Arc<CatalogService>,
}

impl VariantHandler {
    /// Handler over the identity store.
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    async fn catalog(&self, ctx: &RequestContext) -> Result<CatalogRecord, CatalogError> {
        ctx.check_deadline()?;
        let name = ctx
            .catalog
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("catalog".to_string()))?;
        self.service
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, &name)
            .await?
            .ok_or(CatalogError::InvalidCatalog(name))
    }

    async fn require(&self, ctx: &RequestContext) -> Result<VariantRecord, CatalogError> {
        let catalog = self.catalog(ctx).await?;
        let name = ctx
            .variant
            .clone()
            .unwrap_or_else(|| DEFAULT_VARIANT.to_string());
        self.service
            .identity()
            .get_variant(catalog.catalog_id, &name)
            .await?
            .ok_or(CatalogError::VariantNotFound(name))
    }
}

#[async_trait]
impl KindHandler for VariantHandler {
    async fn create(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        let catalog = self.catalog(ctx).await?;
        let name = body_str(body, "name")?;
        validate_name(&name)?;
        let record = VariantRecord::new(catalog.catalog_id, name);
        self.service.identity().create_variant(&record).await?;
        render(&record)
    }

    async fn get(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        render(&self.require(ctx).await?)
    }

    async fn update(&self, ctx: &RequestContext, _body: &Value) -> Result<Value, CatalogError> {
        // A variant's identity is its name and directory set; neither is
        // mutable in place.
        let record = self.require(ctx).await?;
        render(&record)
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<(), CatalogError> {
        let catalog = self.catalog(ctx).await?;
        let name = ctx
            .variant
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("variant".to_string()))?;
        self.service
            .identity()
            .delete_variant(catalog.catalog_id, &name)
            .await?;
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        let catalog = self.catalog(ctx).await?;
        let rows = self
            .service
            .identity()
            .list_variants(catalog.catalog_id)
            .await?;
        render(&rows)
    }

    async fn location(&self, ctx: &RequestContext) -> Result<String, CatalogError> {
        let record = self.require(ctx).await?;
        let catalog = self.catalog(ctx).await?;
        Ok(format!("/catalogs/{}/variants/{}", catalog.name, record.name))
    }
}

/// Namespace CRUD under the context's variant.
#[derive(Debug)]
pub struct NamespaceHandler {
    service: Arc<CatalogService>,
}

impl NamespaceHandler {
    /// Handler over the identity store.
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    async fn variant(&self, ctx: &RequestContext) -> Result<VariantRecord, CatalogError> {
        ctx.check_deadline()?;
        let catalog_name = ctx
            .catalog
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("catalog".to_string()))?;
        let catalog = self
            .service
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, &catalog_name)
            .await?
            .ok_or(CatalogError::InvalidCatalog(catalog_name))?;
        let variant_name = ctx
            .variant
            .clone()
            .unwrap_or_else(|| DEFAULT_VARIANT.to_string());
        self.service
            .identity()
            .get_variant(catalog.catalog_id, &variant_name)
            .await?
            .ok_or(CatalogError::VariantNotFound(variant_name))
    }
}

#[async_trait]
impl KindHandler for NamespaceHandler {
    async fn create(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        let variant = self.variant(ctx).await?;
        let name = body_str(body, "name")?;
        validate_name(&name)?;
        let record = NamespaceRecord {
            name,
            variant_id: variant.variant_id,
            description: body_str_or_default(body, "description"),
        };
        self.service.identity().create_namespace(&record).await?;
        render(&record)
    }

    async fn get(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        let variant = self.variant(ctx).await?;
        let name = ctx
            .namespace
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("namespace".to_string()))?;
        let record = self
            .service
            .identity()
            .get_namespace(variant.variant_id, &name)
            .await?
            .ok_or(CatalogError::NamespaceNotFound(name))?;
        render(&record)
    }

    async fn update(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        let variant = self.variant(ctx).await?;
        let name = ctx
            .namespace
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("namespace".to_string()))?;
        let record = NamespaceRecord {
            name,
            variant_id: variant.variant_id,
            description: body_str_or_default(body, "description"),
        };
        self.service.identity().update_namespace(&record).await?;
        render(&record)
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<(), CatalogError> {
        let variant = self.variant(ctx).await?;
        let name = ctx
            .namespace
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("namespace".to_string()))?;
        self.service
            .identity()
            .delete_namespace(variant.variant_id, &name)
            .await?;
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        let variant = self.variant(ctx).await?;
        let rows = self
            .service
            .identity()
            .list_namespaces(variant.variant_id)
            .await?;
        render(&rows)
    }

    async fn location(&self, ctx: &RequestContext) -> Result<String, CatalogError> {
        let variant = self.variant(ctx).await?;
        let name = ctx
            .namespace
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("namespace".to_string()))?;
        Ok(format!("/variants/{}/namespaces/{}", variant.name, name))
    }
}

/// Workspace CRUD under the context's variant.
#[derive(Debug)]
pub struct WorkspaceHandler {
    service: Arc<CatalogService>,
}

impl WorkspaceHandler {
    /// Handler over the identity store.
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    async fn require(&self, ctx: &RequestContext) -> Result<WorkspaceRecord, CatalogError> {
        ctx.check_deadline()?;
        let id = ctx.workspace.ok_or_else(|| {
            CatalogError::MissingRequiredAttribute("workspace".to_string())
        })?;
        self.service
            .identity()
            .get_workspace(id)
            .await?
            .ok_or_else(|| {
                CatalogError::WorkspaceNotFound(format!("workspace {id} was expected but not found"))
            })
    }
}

#[async_trait]
impl KindHandler for WorkspaceHandler {
    async fn create(&self, ctx: &RequestContext, body: &Value) -> Result<Value, CatalogError> {
        ctx.check_deadline()?;
        let catalog_name = ctx
            .catalog
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("catalog".to_string()))?;
        let catalog = self
            .service
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, &catalog_name)
            .await?
            .ok_or(CatalogError::InvalidCatalog(catalog_name))?;
        let variant_name = ctx
            .variant
            .clone()
            .unwrap_or_else(|| DEFAULT_VARIANT.to_string());
        let variant = self
            .service
            .identity()
            .get_variant(catalog.catalog_id, &variant_name)
            .await?
            .ok_or(CatalogError::VariantNotFound(variant_name))?;
        let record = WorkspaceRecord::new(variant.variant_id, body_str(body, "label")?);
        self.service.identity().create_workspace(&record).await?;
        render(&record)
    }

    async fn get(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        render(&self.require(ctx).await?)
    }

    async fn update(&self, ctx: &RequestContext, _body: &Value) -> Result<Value, CatalogError> {
        // Workspace identity (label, base version, directories) is fixed
        // at fork time.
        render(&self.require(ctx).await?)
    }

    async fn delete(&self, ctx: &RequestContext) -> Result<(), CatalogError> {
        if let Some(id) = ctx.workspace {
            self.service.identity().delete_workspace(id).await?;
        }
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext) -> Result<Value, CatalogError> {
        ctx.check_deadline()?;
        let catalog_name = ctx
            .catalog
            .clone()
            .ok_or_else(|| CatalogError::MissingRequiredAttribute("catalog".to_string()))?;
        let catalog = self
            .service
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, &catalog_name)
            .await?
            .ok_or(CatalogError::InvalidCatalog(catalog_name))?;
        let variant_name = ctx
            .variant
            .clone()
            .unwrap_or_else(|| DEFAULT_VARIANT.to_string());
        let variant = self
            .service
            .identity()
            .get_variant(catalog.catalog_id, &variant_name)
            .await?
            .ok_or(CatalogError::VariantNotFound(variant_name))?;
        let rows = self
            .service
            .identity()
            .list_workspaces(variant.variant_id)
            .await?;
        render(&rows)
    }

    async fn location(&self, ctx: &RequestContext) -> Result<String, CatalogError> {
        let record = self.require(ctx).await?;
        Ok(format!("/workspaces/{}", record.workspace_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store_memory::MemoryStore;
    use canopy_types::CanopyConfig;

    fn registry() -> KindRegistry {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(CatalogService::new(
            store.clone(),
            store,
            CanopyConfig::default(),
        ));
        KindRegistry::with_defaults(service)
    }

    #[test]
    fn unknown_kinds_fail_with_invalid_schema() {
        let registry = registry();
        let err = registry.handler("Widget").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSchema(msg) if msg.contains("unsupported kind")));
    }

    #[test]
    fn all_supported_kinds_dispatch() {
        let registry = registry();
        for kind in [
            "Catalog",
            "Variant",
            "Namespace",
            "Workspace",
            "ParameterSchema",
            "CollectionSchema",
            "ValueCollection",
            "ResourceGroup",
            "SkillSet",
        ] {
            assert!(registry.handler(kind).is_ok(), "no handler for {kind}");
        }
    }

    #[tokio::test]
    async fn catalog_create_seeds_the_default_variant() {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(CatalogService::new(
            store.clone(),
            store.clone(),
            CanopyConfig::default(),
        ));
        let registry = KindRegistry::with_defaults(service.clone());
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());

        let handler = registry.handler("Catalog").unwrap();
        let rendered = handler
            .create(&ctx, &json!({"name": "prod", "description": "main"}))
            .await
            .unwrap();
        assert_eq!(rendered["name"], "prod");

        let catalog = service
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, "prod")
            .await
            .unwrap()
            .unwrap();
        assert!(service
            .identity()
            .get_variant(catalog.catalog_id, DEFAULT_VARIANT)
            .await
            .unwrap()
            .is_some());

        // Creating the same catalog again conflicts.
        let err = handler
            .create(&ctx, &json!({"name": "prod"}))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }
}
