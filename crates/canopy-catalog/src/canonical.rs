//! Canonical placement: from request context and (possibly overridden)
//! metadata to validated identity and the directory set to operate on.

use canopy_schema::ObjectDocument;
use canopy_store_core::records::{CatalogRecord, DirectorySet, VariantRecord, WorkspaceRecord};
use canopy_types::{CatalogError, Kind, RequestContext, SchemaMetadata};

use crate::CatalogService;

/// Fully resolved placement of one object: canonical metadata plus the
/// identity rows and directories every subsequent step needs.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Canonicalized metadata, as embedded back into the object.
    pub meta: SchemaMetadata,
    /// Owning catalog row.
    pub catalog: CatalogRecord,
    /// Owning variant row.
    pub variant: VariantRecord,
    /// Workspace overlay, when the request carries one.
    pub workspace: Option<WorkspaceRecord>,
    /// Directory set after workspace-wins resolution.
    pub directories: DirectorySet,
}

impl Placement {
    /// Storage path of the object inside its kind directory.
    pub fn storage_path(&self) -> String {
        self.meta.storage_path()
    }

    /// Directory-relative parent path, the resolver's starting point.
    pub fn storage_dir(&self) -> String {
        self.meta.storage_dir()
    }
}

impl CatalogService {
    /// Canonicalize a document in place and resolve its placement.
    ///
    /// Override fields replace document fields when non-empty; the request
    /// context fills whatever is still missing. The rewritten metadata is
    /// embedded back into the document before hashing so that the stored
    /// bytes carry their own canonical identity.
    pub async fn canonicalize(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
        override_meta: Option<&SchemaMetadata>,
    ) -> Result<Placement, CatalogError> {
        ctx.check_deadline()?;

        let mut meta = doc.metadata.clone();
        if let Some(over) = override_meta {
            meta = meta.merged_with(over);
        }
        if meta.catalog.is_empty() {
            if let Some(catalog) = &ctx.catalog {
                meta.catalog = catalog.clone();
            }
        }
        if meta.variant.is_none() {
            meta.variant = ctx.variant.clone();
        }
        if meta.namespace.is_none() {
            meta.namespace = ctx.namespace.clone();
        }
        meta.canonicalize()?;

        let placement = self.resolve_placement(ctx, meta).await?;
        doc.metadata = placement.meta.clone();
        Ok(placement)
    }

    /// Resolve identity rows and directories for already-canonical
    /// metadata.
    pub async fn resolve_placement(
        &self,
        ctx: &RequestContext,
        meta: SchemaMetadata,
    ) -> Result<Placement, CatalogError> {
        ctx.check_deadline()?;

        let catalog = self
            .identity()
            .get_catalog(ctx.tenant_id, ctx.project_id, &meta.catalog)
            .await?
            .ok_or_else(|| CatalogError::InvalidCatalog(meta.catalog.clone()))?;
        let variant_name = meta.variant_or_default().to_string();
        let variant = self
            .identity()
            .get_variant(catalog.catalog_id, &variant_name)
            .await?
            .ok_or_else(|| CatalogError::VariantNotFound(variant_name.clone()))?;
        if let Some(ns) = &meta.namespace {
            self.identity()
                .get_namespace(variant.variant_id, ns)
                .await?
                .ok_or_else(|| CatalogError::NamespaceNotFound(ns.clone()))?;
        }
        // Workspace wins over the variant's directories when supplied.
        let workspace = match ctx.workspace {
            Some(id) => Some(self.identity().get_workspace(id).await?.ok_or_else(|| {
                CatalogError::WorkspaceNotFound(format!("workspace {id} was expected but not found"))
            })?),
            None => None,
        };
        let directories = match &workspace {
            Some(ws) => ws.directories(&variant),
            None => variant.directories(),
        };
        Ok(Placement {
            meta,
            catalog,
            variant,
            workspace,
            directories,
        })
    }

    /// Directory scope for prefix operations (list). Only the directory
    /// fields of the returned placement are meaningful; no object name is
    /// involved.
    pub async fn scope_from_context(
        &self,
        ctx: &RequestContext,
    ) -> Result<Placement, CatalogError> {
        let mut meta = SchemaMetadata {
            name: "scope".to_string(),
            catalog: ctx.catalog.clone().unwrap_or_default(),
            variant: ctx.variant.clone(),
            namespace: ctx.namespace.clone(),
            workspace: None,
            path: ctx.object_path.clone().unwrap_or_default(),
            description: String::new(),
        };
        if meta.catalog.is_empty() {
            return Err(CatalogError::MissingRequiredAttribute("catalog".to_string()));
        }
        meta.canonicalize()?;
        self.resolve_placement(ctx, meta).await
    }

    /// Placement for requests that address an object by context alone
    /// (get, delete, location).
    pub async fn placement_from_context(
        &self,
        ctx: &RequestContext,
        _kind: Kind,
    ) -> Result<Placement, CatalogError> {
        let mut meta = SchemaMetadata {
            name: ctx.object_name.clone().unwrap_or_default(),
            catalog: ctx.catalog.clone().unwrap_or_default(),
            variant: ctx.variant.clone(),
            namespace: ctx.namespace.clone(),
            workspace: None,
            path: ctx.object_path.clone().unwrap_or_default(),
            description: String::new(),
        };
        if meta.catalog.is_empty() {
            return Err(CatalogError::MissingRequiredAttribute("catalog".to_string()));
        }
        meta.canonicalize()?;
        self.resolve_placement(ctx, meta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store_core::records::{CatalogRecord, VariantRecord, WorkspaceRecord};
    use canopy_store_core::traits::IdentityStore;
    use canopy_store_memory::MemoryStore;
    use canopy_types::CanopyConfig;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn service_with_identity() -> (CatalogService, RequestContext) {
        let store = Arc::new(MemoryStore::new());
        let tenant = Uuid::new_v4();
        let project = Uuid::new_v4();
        let catalog = CatalogRecord {
            catalog_id: Uuid::new_v4(),
            project_id: project,
            tenant_id: tenant,
            name: "prod".to_string(),
            description: String::new(),
            info: json!({}),
        };
        store.create_catalog(&catalog).await.unwrap();
        store
            .create_variant(&VariantRecord::new(catalog.catalog_id, "default"))
            .await
            .unwrap();
        let service = CatalogService::new(store.clone(), store, CanopyConfig::default());
        let ctx = RequestContext::new(tenant, project).with_catalog("prod");
        (service, ctx)
    }

    fn doc(name: &str) -> ObjectDocument {
        ObjectDocument::parse(
            Kind::ParameterSchema,
            &json!({
                "kind": "ParameterSchema",
                "metadata": {"name": name, "catalog": "prod", "path": "/a"},
                "spec": {"dataType": "Integer"}
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn canonicalization_embeds_defaults() {
        let (service, ctx) = service_with_identity().await;
        let mut d = doc("p1");
        let placement = service.canonicalize(&ctx, &mut d, None).await.unwrap();
        assert_eq!(d.metadata.variant.as_deref(), Some("default"));
        assert_eq!(placement.storage_path(), "/a/p1");
        assert_eq!(
            placement.directories.parameters,
            placement.variant.parameters_dir
        );
    }

    #[tokio::test]
    async fn unknown_identity_fails_typed() {
        let (service, ctx) = service_with_identity().await;

        let mut d = doc("p1");
        d.metadata.catalog = "nope".to_string();
        assert!(matches!(
            service.canonicalize(&ctx, &mut d, None).await,
            Err(CatalogError::InvalidCatalog(_))
        ));

        let mut d = doc("p1");
        d.metadata.variant = Some("missing".to_string());
        assert!(matches!(
            service.canonicalize(&ctx, &mut d, None).await,
            Err(CatalogError::VariantNotFound(_))
        ));

        let mut d = doc("p1");
        d.metadata.namespace = Some("ghost".to_string());
        assert!(matches!(
            service.canonicalize(&ctx, &mut d, None).await,
            Err(CatalogError::NamespaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn workspace_directories_win() {
        let (service, ctx) = service_with_identity().await;
        let variant = service
            .identity()
            .get_variant(
                service
                    .identity()
                    .get_catalog(ctx.tenant_id, ctx.project_id, "prod")
                    .await
                    .unwrap()
                    .unwrap()
                    .catalog_id,
                "default",
            )
            .await
            .unwrap()
            .unwrap();
        let ws = WorkspaceRecord::new(variant.variant_id, "edit");
        service.identity().create_workspace(&ws).await.unwrap();

        let ctx = ctx.with_workspace(ws.workspace_id);
        let mut d = doc("p1");
        let placement = service.canonicalize(&ctx, &mut d, None).await.unwrap();
        assert_eq!(placement.directories.parameters, ws.parameters_dir);
        assert_eq!(placement.directories.skillsets, variant.skillset_dir);

        // A dangling workspace id names the workspace in the error.
        let bad_ctx = RequestContext::new(ctx.tenant_id, ctx.project_id)
            .with_catalog("prod")
            .with_workspace(Uuid::new_v4());
        let mut d = doc("p1");
        assert!(matches!(
            service.canonicalize(&bad_ctx, &mut d, None).await,
            Err(CatalogError::WorkspaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn overrides_replace_non_empty_fields() {
        let (service, ctx) = service_with_identity().await;
        let mut d = doc("p1");
        let over = SchemaMetadata {
            path: "/b/c".to_string(),
            ..Default::default()
        };
        let placement = service.canonicalize(&ctx, &mut d, Some(&over)).await.unwrap();
        assert_eq!(placement.storage_path(), "/b/c/p1");
        assert_eq!(d.metadata.path, "/b/c");
    }
}
