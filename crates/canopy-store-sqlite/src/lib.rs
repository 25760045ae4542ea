#![forbid(unsafe_code)]

//! **canopy-store-sqlite** – SQLite-based persistent storage driver for Canopy.
//!
//! This crate provides a reliable, portable storage backend using the SQLite
//! database engine via sqlx. It offers ACID transactions and an efficient
//! on-disk representation while implementing the same store traits as the
//! in-memory driver.
//!
//! Every save and delete plan runs inside a single database transaction:
//! blob insert, target ref upsert, back-reference updates on related rows.
//! The only step outside the transaction is the opportunistic blob reap
//! after the last ref to a hash disappears; a failure there is logged and
//! never rolled back, because ref rows are authoritative.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use canopy_store_core::paths::{ancestor_dirs, join_path};
use canopy_store_core::plan::{BackRefUpdate, DeletePlan, SavePlan};
use canopy_store_core::traits::ObjectStore;
use canopy_store_core::{CatalogObject, ObjectHash, ObjectRef, ObjectReference};
use canopy_types::{CatalogError, DirectoryId, Kind, TenantId};

mod identity;
mod security;

//─────────────────────────────
//  Backend
//─────────────────────────────

/// A persistent catalog store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens or creates a database at the given path and runs migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let url = format!("sqlite://{}?mode=rwc", path.as_ref().display());
        let pool = SqlitePool::connect(&url).await.map_err(db_err)?;
        Self::from_pool(pool).await
    }

    /// Opens an in-memory database. Useful for tests.
    ///
    /// The pool is pinned to one connection: every pooled connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, CatalogError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        Self::from_pool(pool).await
    }

    /// Creates a store from an existing pool, running migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CatalogError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Close the underlying connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), CatalogError> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id TEXT PRIMARY KEY
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                project_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS catalogs (
                catalog_id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                info TEXT NOT NULL DEFAULT '{}',
                UNIQUE (project_id, name)
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS variants (
                variant_id TEXT PRIMARY KEY,
                catalog_id TEXT NOT NULL,
                name TEXT NOT NULL,
                parameters_dir TEXT NOT NULL,
                collections_dir TEXT NOT NULL,
                values_dir TEXT NOT NULL,
                skillset_dir TEXT NOT NULL,
                UNIQUE (catalog_id, name)
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS namespaces (
                name TEXT NOT NULL,
                variant_id TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (name, variant_id)
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS workspaces (
                workspace_id TEXT PRIMARY KEY,
                variant_id TEXT NOT NULL,
                label TEXT NOT NULL,
                base_version TEXT NOT NULL DEFAULT '0',
                parameters_dir TEXT NOT NULL,
                collections_dir TEXT NOT NULL,
                values_dir TEXT NOT NULL
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS catalog_objects (
                tenant_id TEXT NOT NULL,
                hash BLOB NOT NULL,
                type TEXT NOT NULL,
                version TEXT NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (tenant_id, hash)
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS object_refs (
                directory_id TEXT NOT NULL,
                path TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                hash BLOB NOT NULL,
                refs TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (directory_id, path)
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS views (
                view_id TEXT PRIMARY KEY,
                catalog_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                label TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                rules TEXT NOT NULL,
                UNIQUE (catalog_id, label)
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS view_tokens (
                token_id TEXT PRIMARY KEY,
                view_id TEXT NOT NULL,
                expire_at TEXT NOT NULL
            ) STRICT
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS signing_keys (
                key_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                public_key BLOB NOT NULL,
                private_key BLOB NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            ) STRICT
            "#,
            "CREATE INDEX IF NOT EXISTS idx_object_refs_hash ON object_refs (tenant_id, hash)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_signing_keys_active
             ON signing_keys (tenant_id) WHERE is_active = 1",
            "CREATE INDEX IF NOT EXISTS idx_view_tokens_expiry ON view_tokens (expire_at)",
        ];
        for stmt in ddl {
            sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Reap the blob for `hash` when no ref row still points at it.
    ///
    /// Runs outside the caller's transaction; a failure is logged and the
    /// delete that triggered it stands.
    async fn reap_unreferenced(&self, tenant: TenantId, hash: ObjectHash) {
        let result = async {
            let row = sqlx::query(
                "SELECT COUNT(*) AS n FROM object_refs WHERE tenant_id = ? AND hash = ?",
            )
            .bind(tenant.to_string())
            .bind(&hash[..])
            .fetch_one(&self.pool)
            .await?;
            let remaining: i64 = row.get("n");
            if remaining == 0 {
                sqlx::query("DELETE FROM catalog_objects WHERE tenant_id = ? AND hash = ?")
                    .bind(tenant.to_string())
                    .bind(&hash[..])
                    .execute(&self.pool)
                    .await?;
            }
            Ok::<_, sqlx::Error>(())
        }
        .await;
        if let Err(e) = result {
            warn!(
                hash = %canopy_store_core::hash_hex(&hash),
                error = %e,
                "failed to reap unreferenced catalog object"
            );
        }
    }
}

//─────────────────────────────
//  Row conversion helpers
//─────────────────────────────

pub(crate) fn db_err(e: sqlx::Error) -> CatalogError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return CatalogError::Conflict(db.message().to_string());
        }
    }
    CatalogError::internal("database operation failed", e)
}

pub(crate) fn parse_uuid(raw: &str) -> Result<uuid::Uuid, CatalogError> {
    uuid::Uuid::parse_str(raw)
        .map_err(|e| CatalogError::internal(format!("malformed uuid column {raw:?}"), e))
}

pub(crate) fn parse_time(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, CatalogError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| CatalogError::internal(format!("malformed timestamp column {raw:?}"), e))
}

fn parse_hash(raw: Vec<u8>) -> Result<ObjectHash, CatalogError> {
    let len = raw.len();
    raw.try_into()
        .map_err(|_| CatalogError::infra(format!("hash column has {len} bytes, expected 32")))
}

fn refs_to_json(refs: &[ObjectReference]) -> Result<String, CatalogError> {
    serde_json::to_string(refs)
        .map_err(|e| CatalogError::internal("failed to encode reference list", e))
}

fn refs_from_json(raw: &str) -> Result<Vec<ObjectReference>, CatalogError> {
    serde_json::from_str(raw)
        .map_err(|e| CatalogError::internal("failed to decode reference list", e))
}

fn row_to_ref(row: &sqlx::sqlite::SqliteRow) -> Result<ObjectRef, CatalogError> {
    Ok(ObjectRef {
        path: row.get("path"),
        hash: parse_hash(row.get("hash"))?,
        references: refs_from_json(&row.get::<String, _>("refs"))?,
    })
}

/// Read-modify-write of one ref row's reference list inside a transaction.
async fn mutate_refs_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    directory: DirectoryId,
    path: &str,
    mutate: impl FnOnce(&mut Vec<ObjectReference>),
    missing_is_error: bool,
) -> Result<(), CatalogError> {
    let row = sqlx::query("SELECT refs FROM object_refs WHERE directory_id = ? AND path = ?")
        .bind(directory.to_string())
        .bind(path)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?;
    let Some(row) = row else {
        if missing_is_error {
            return Err(CatalogError::ObjectNotFound(path.to_string()));
        }
        return Ok(());
    };
    let mut refs = refs_from_json(&row.get::<String, _>("refs"))?;
    mutate(&mut refs);
    sqlx::query("UPDATE object_refs SET refs = ? WHERE directory_id = ? AND path = ?")
        .bind(refs_to_json(&refs)?)
        .bind(directory.to_string())
        .bind(path)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn apply_back_ref_adds(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    updates: &[BackRefUpdate],
) -> Result<(), CatalogError> {
    for u in updates {
        mutate_refs_tx(
            tx,
            u.directory,
            &u.path,
            |refs| {
                if !refs.iter().any(|r| r.name == u.reference) {
                    refs.push(ObjectReference {
                        name: u.reference.clone(),
                    });
                }
            },
            false,
        )
        .await?;
    }
    Ok(())
}

async fn apply_back_ref_removes(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    updates: &[BackRefUpdate],
) -> Result<(), CatalogError> {
    for u in updates {
        mutate_refs_tx(
            tx,
            u.directory,
            &u.path,
            |refs| refs.retain(|r| r.name != u.reference),
            false,
        )
        .await?;
    }
    Ok(())
}

//─────────────────────────────
//  ObjectStore
//─────────────────────────────

#[async_trait]
impl ObjectStore for SqliteStore {
    async fn put_object(&self, tenant: TenantId, obj: &CatalogObject) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT OR IGNORE INTO catalog_objects (tenant_id, hash, type, version, data)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(tenant.to_string())
        .bind(&obj.hash[..])
        .bind(obj.kind.as_str())
        .bind(&obj.version)
        .bind(&obj.data)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_object(
        &self,
        tenant: TenantId,
        hash: &ObjectHash,
    ) -> Result<Option<CatalogObject>, CatalogError> {
        let row = sqlx::query(
            "SELECT type, version, data FROM catalog_objects WHERE tenant_id = ? AND hash = ?",
        )
        .bind(tenant.to_string())
        .bind(&hash[..])
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some(CatalogObject {
                kind: Kind::parse(&row.get::<String, _>("type"))?,
                version: row.get("version"),
                hash: *hash,
                data: row.get("data"),
            })),
            None => Ok(None),
        }
    }

    async fn upsert_ref(
        &self,
        tenant: TenantId,
        directory: DirectoryId,
        object_ref: &ObjectRef,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT OR REPLACE INTO object_refs (directory_id, path, tenant_id, hash, refs)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(directory.to_string())
        .bind(&object_ref.path)
        .bind(tenant.to_string())
        .bind(&object_ref.hash[..])
        .bind(refs_to_json(&object_ref.references)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_ref(
        &self,
        directory: DirectoryId,
        path: &str,
    ) -> Result<Option<ObjectRef>, CatalogError> {
        let row = sqlx::query(
            "SELECT path, hash, refs FROM object_refs WHERE directory_id = ? AND path = ?",
        )
        .bind(directory.to_string())
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_ref).transpose()
    }

    async fn delete_ref(
        &self,
        _tenant: TenantId,
        directory: DirectoryId,
        path: &str,
    ) -> Result<Option<ObjectHash>, CatalogError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query("SELECT hash FROM object_refs WHERE directory_id = ? AND path = ?")
            .bind(directory.to_string())
            .bind(path)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let hash = parse_hash(row.get("hash"))?;
        sqlx::query("DELETE FROM object_refs WHERE directory_id = ? AND path = ?")
            .bind(directory.to_string())
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(Some(hash))
    }

    async fn add_references(
        &self,
        directory: DirectoryId,
        path: &str,
        names: &[String],
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        mutate_refs_tx(
            &mut tx,
            directory,
            path,
            |refs| {
                for name in names {
                    if !refs.iter().any(|r| r.name == *name) {
                        refs.push(ObjectReference { name: name.clone() });
                    }
                }
            },
            true,
        )
        .await?;
        tx.commit().await.map_err(db_err)
    }

    async fn remove_reference(
        &self,
        directory: DirectoryId,
        path: &str,
        name: &str,
    ) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        mutate_refs_tx(
            &mut tx,
            directory,
            path,
            |refs| refs.retain(|r| r.name != name),
            false,
        )
        .await?;
        tx.commit().await.map_err(db_err)
    }

    async fn find_closest(
        &self,
        directory: DirectoryId,
        target_name: &str,
        start_path: &str,
    ) -> Result<Option<(String, ObjectRef)>, CatalogError> {
        for dir in ancestor_dirs(start_path) {
            let candidate = join_path(&dir, target_name);
            if let Some(r) = self.get_ref(directory, &candidate).await? {
                return Ok(Some((candidate, r)));
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
            .get_ref(directory, path)
            .await?
            .map(|r| !r.references.is_empty())
            .unwrap_or(false))
    }

    async fn list_refs(
        &self,
        directory: DirectoryId,
        prefix: &str,
    ) -> Result<Vec<ObjectRef>, CatalogError> {
        let rows = sqlx::query(
            "SELECT path, hash, refs FROM object_refs
             WHERE directory_id = ? AND path LIKE ? || '%' ORDER BY path",
        )
        .bind(directory.to_string())
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_ref).collect()
    }

    async fn commit_save(&self, tenant: TenantId, plan: SavePlan) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT OR IGNORE INTO catalog_objects (tenant_id, hash, type, version, data)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(tenant.to_string())
        .bind(&plan.object.hash[..])
        .bind(plan.object.kind.as_str())
        .bind(&plan.object.version)
        .bind(&plan.object.data)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let displaced = sqlx::query(
            "SELECT hash FROM object_refs WHERE directory_id = ? AND path = ?",
        )
        .bind(plan.directory.to_string())
        .bind(&plan.object_ref.path)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .map(|row| parse_hash(row.get("hash")))
        .transpose()?;

        sqlx::query(
            "INSERT OR REPLACE INTO object_refs (directory_id, path, tenant_id, hash, refs)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(plan.directory.to_string())
        .bind(&plan.object_ref.path)
        .bind(tenant.to_string())
        .bind(&plan.object_ref.hash[..])
        .bind(refs_to_json(&plan.object_ref.references)?)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        apply_back_ref_adds(&mut tx, &plan.add_back_refs).await?;
        apply_back_ref_removes(&mut tx, &plan.remove_back_refs).await?;
        tx.commit().await.map_err(db_err)?;

        if let Some(old) = displaced {
            if old != plan.object.hash {
                self.reap_unreferenced(tenant, old).await;
            }
        }
        Ok(())
    }

    async fn commit_delete(
        &self,
        tenant: TenantId,
        plan: DeletePlan,
    ) -> Result<Option<ObjectHash>, CatalogError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query("SELECT hash FROM object_refs WHERE directory_id = ? AND path = ?")
            .bind(plan.directory.to_string())
            .bind(&plan.path)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let hash = parse_hash(row.get("hash"))?;
        sqlx::query("DELETE FROM object_refs WHERE directory_id = ? AND path = ?")
            .bind(plan.directory.to_string())
            .bind(&plan.path)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        apply_back_ref_removes(&mut tx, &plan.remove_back_refs).await?;
        tx.commit().await.map_err(db_err)?;

        self.reap_unreferenced(tenant, hash).await;
        Ok(Some(hash))
    }
}
