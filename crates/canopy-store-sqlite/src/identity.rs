//! Identity rows: tenants, projects, catalogs, variants, namespaces,
//! workspaces.

use async_trait::async_trait;
use sqlx::Row;

use canopy_store_core::records::{
    CatalogRecord, NamespaceRecord, ProjectRecord, TenantRecord, VariantRecord, WorkspaceRecord,
};
use canopy_store_core::traits::IdentityStore;
use canopy_types::{CatalogError, CatalogId, ProjectId, TenantId, VariantId, WorkspaceId};

use crate::{db_err, parse_uuid, SqliteStore};

fn row_to_catalog(row: &sqlx::sqlite::SqliteRow) -> Result<CatalogRecord, CatalogError> {
    let info: String = row.get("info");
    Ok(CatalogRecord {
        catalog_id: parse_uuid(&row.get::<String, _>("catalog_id"))?,
        project_id: parse_uuid(&row.get::<String, _>("project_id"))?,
        tenant_id: parse_uuid(&row.get::<String, _>("tenant_id"))?,
        name: row.get("name"),
        description: row.get("description"),
        info: serde_json::from_str(&info)
            .map_err(|e| CatalogError::internal("malformed catalog info column", e))?,
    })
}

fn row_to_variant(row: &sqlx::sqlite::SqliteRow) -> Result<VariantRecord, CatalogError> {
    Ok(VariantRecord {
        variant_id: parse_uuid(&row.get::<String, _>("variant_id"))?,
        catalog_id: parse_uuid(&row.get::<String, _>("catalog_id"))?,
        name: row.get("name"),
        parameters_dir: parse_uuid(&row.get::<String, _>("parameters_dir"))?,
        collections_dir: parse_uuid(&row.get::<String, _>("collections_dir"))?,
        values_dir: parse_uuid(&row.get::<String, _>("values_dir"))?,
        skillset_dir: parse_uuid(&row.get::<String, _>("skillset_dir"))?,
    })
}

fn row_to_workspace(row: &sqlx::sqlite::SqliteRow) -> Result<WorkspaceRecord, CatalogError> {
    Ok(WorkspaceRecord {
        workspace_id: parse_uuid(&row.get::<String, _>("workspace_id"))?,
        variant_id: parse_uuid(&row.get::<String, _>("variant_id"))?,
        label: row.get("label"),
        base_version: row.get("base_version"),
        parameters_dir: parse_uuid(&row.get::<String, _>("parameters_dir"))?,
        collections_dir: parse_uuid(&row.get::<String, _>("collections_dir"))?,
        values_dir: parse_uuid(&row.get::<String, _>("values_dir"))?,
    })
}

fn row_to_namespace(row: &sqlx::sqlite::SqliteRow) -> Result<NamespaceRecord, CatalogError> {
    Ok(NamespaceRecord {
        name: row.get("name"),
        variant_id: parse_uuid(&row.get::<String, _>("variant_id"))?,
        description: row.get("description"),
    })
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn create_tenant(&self, tenant: &TenantRecord) -> Result<(), CatalogError> {
        sqlx::query("INSERT OR IGNORE INTO tenants (tenant_id) VALUES (?)")
            .bind(tenant.tenant_id.to_string())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn create_project(&self, project: &ProjectRecord) -> Result<(), CatalogError> {
        sqlx::query("INSERT OR IGNORE INTO projects (project_id, tenant_id) VALUES (?, ?)")
            .bind(project.project_id.to_string())
            .bind(project.tenant_id.to_string())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn create_catalog(&self, catalog: &CatalogRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "INSERT INTO catalogs (catalog_id, project_id, tenant_id, name, description, info)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(catalog.catalog_id.to_string())
        .bind(catalog.project_id.to_string())
        .bind(catalog.tenant_id.to_string())
        .bind(&catalog.name)
        .bind(&catalog.description)
        .bind(catalog.info.to_string())
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match db_err(e) {
                CatalogError::Conflict(_) => Err(CatalogError::AlreadyExists(format!(
                    "catalog {}",
                    catalog.name
                ))),
                other => Err(other),
            },
        }
    }

    async fn get_catalog(
        &self,
        tenant: TenantId,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<CatalogRecord>, CatalogError> {
        let row = sqlx::query(
            "SELECT * FROM catalogs WHERE tenant_id = ? AND project_id = ? AND name = ?",
        )
        .bind(tenant.to_string())
        .bind(project.to_string())
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_catalog).transpose()
    }

    async fn get_catalog_by_id(
        &self,
        id: CatalogId,
    ) -> Result<Option<CatalogRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM catalogs WHERE catalog_id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_catalog).transpose()
    }

    async fn list_catalogs(
        &self,
        tenant: TenantId,
        project: ProjectId,
    ) -> Result<Vec<CatalogRecord>, CatalogError> {
        let rows = sqlx::query(
            "SELECT * FROM catalogs WHERE tenant_id = ? AND project_id = ? ORDER BY name",
        )
        .bind(tenant.to_string())
        .bind(project.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_catalog).collect()
    }

    async fn update_catalog(&self, catalog: &CatalogRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE catalogs SET description = ?, info = ? WHERE catalog_id = ?",
        )
        .bind(&catalog.description)
        .bind(catalog.info.to_string())
        .bind(catalog.catalog_id.to_string())
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::CatalogNotFound(catalog.name.clone()));
        }
        Ok(())
    }

    async fn delete_catalog(&self, id: CatalogId) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM catalogs WHERE catalog_id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_variant(&self, variant: &VariantRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "INSERT INTO variants
             (variant_id, catalog_id, name, parameters_dir, collections_dir, values_dir, skillset_dir)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(variant.variant_id.to_string())
        .bind(variant.catalog_id.to_string())
        .bind(&variant.name)
        .bind(variant.parameters_dir.to_string())
        .bind(variant.collections_dir.to_string())
        .bind(variant.values_dir.to_string())
        .bind(variant.skillset_dir.to_string())
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match db_err(e) {
                CatalogError::Conflict(_) => Err(CatalogError::AlreadyExists(format!(
                    "variant {}",
                    variant.name
                ))),
                other => Err(other),
            },
        }
    }

    async fn get_variant(
        &self,
        catalog: CatalogId,
        name: &str,
    ) -> Result<Option<VariantRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM variants WHERE catalog_id = ? AND name = ?")
            .bind(catalog.to_string())
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_variant).transpose()
    }

    async fn list_variants(&self, catalog: CatalogId) -> Result<Vec<VariantRecord>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM variants WHERE catalog_id = ? ORDER BY name")
            .bind(catalog.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_variant).collect()
    }

    async fn delete_variant(&self, catalog: CatalogId, name: &str) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM variants WHERE catalog_id = ? AND name = ?")
            .bind(catalog.to_string())
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_namespace(&self, ns: &NamespaceRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "INSERT INTO namespaces (name, variant_id, description) VALUES (?, ?, ?)",
        )
        .bind(&ns.name)
        .bind(ns.variant_id.to_string())
        .bind(&ns.description)
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match db_err(e) {
                CatalogError::Conflict(_) => {
                    Err(CatalogError::AlreadyExists(format!("namespace {}", ns.name)))
                }
                other => Err(other),
            },
        }
    }

    async fn get_namespace(
        &self,
        variant: VariantId,
        name: &str,
    ) -> Result<Option<NamespaceRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM namespaces WHERE variant_id = ? AND name = ?")
            .bind(variant.to_string())
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_namespace).transpose()
    }

    async fn list_namespaces(
        &self,
        variant: VariantId,
    ) -> Result<Vec<NamespaceRecord>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM namespaces WHERE variant_id = ? ORDER BY name")
            .bind(variant.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_namespace).collect()
    }

    async fn update_namespace(&self, ns: &NamespaceRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE namespaces SET description = ? WHERE variant_id = ? AND name = ?",
        )
        .bind(&ns.description)
        .bind(ns.variant_id.to_string())
        .bind(&ns.name)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NamespaceNotFound(ns.name.clone()));
        }
        Ok(())
    }

    async fn delete_namespace(
        &self,
        variant: VariantId,
        name: &str,
    ) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM namespaces WHERE variant_id = ? AND name = ?")
            .bind(variant.to_string())
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_workspace(&self, ws: &WorkspaceRecord) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO workspaces
             (workspace_id, variant_id, label, base_version, parameters_dir, collections_dir, values_dir)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ws.workspace_id.to_string())
        .bind(ws.variant_id.to_string())
        .bind(&ws.label)
        .bind(&ws.base_version)
        .bind(ws.parameters_dir.to_string())
        .bind(ws.collections_dir.to_string())
        .bind(ws.values_dir.to_string())
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_workspace(
        &self,
        id: WorkspaceId,
    ) -> Result<Option<WorkspaceRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE workspace_id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_workspace).transpose()
    }

    async fn get_workspace_by_label(
        &self,
        variant: VariantId,
        label: &str,
    ) -> Result<Option<WorkspaceRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM workspaces WHERE variant_id = ? AND label = ?")
            .bind(variant.to_string())
            .bind(label)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_workspace).transpose()
    }

    async fn list_workspaces(
        &self,
        variant: VariantId,
    ) -> Result<Vec<WorkspaceRecord>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM workspaces WHERE variant_id = ? ORDER BY label")
            .bind(variant.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_workspace).collect()
    }

    async fn delete_workspace(&self, id: WorkspaceId) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM workspaces WHERE workspace_id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
