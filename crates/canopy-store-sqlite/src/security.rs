//! Security rows: views, view tokens, signing keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use canopy_store_core::records::{SigningKeyRecord, TokenRecord, ViewRecord};
use canopy_store_core::traits::{KeyStore, TokenStore, ViewStore};
use canopy_types::{CatalogError, CatalogId, TenantId, TokenId, ViewId};

use crate::{db_err, parse_time, parse_uuid, SqliteStore};

fn row_to_view(row: &sqlx::sqlite::SqliteRow) -> Result<ViewRecord, CatalogError> {
    let rules: String = row.get("rules");
    Ok(ViewRecord {
        view_id: parse_uuid(&row.get::<String, _>("view_id"))?,
        catalog_id: parse_uuid(&row.get::<String, _>("catalog_id"))?,
        tenant_id: parse_uuid(&row.get::<String, _>("tenant_id"))?,
        label: row.get("label"),
        description: row.get("description"),
        rules: serde_json::from_str(&rules)
            .map_err(|e| CatalogError::internal("malformed view rules column", e))?,
    })
}

#[async_trait]
impl ViewStore for SqliteStore {
    async fn create_view(&self, view: &ViewRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "INSERT INTO views (view_id, catalog_id, tenant_id, label, description, rules)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(view.view_id.to_string())
        .bind(view.catalog_id.to_string())
        .bind(view.tenant_id.to_string())
        .bind(&view.label)
        .bind(&view.description)
        .bind(view.rules.to_string())
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match db_err(e) {
                CatalogError::Conflict(_) => {
                    Err(CatalogError::AlreadyExists(format!("view {}", view.label)))
                }
                other => Err(other),
            },
        }
    }

    async fn get_view(&self, id: ViewId) -> Result<Option<ViewRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM views WHERE view_id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_view).transpose()
    }

    async fn get_view_by_label(
        &self,
        catalog: CatalogId,
        label: &str,
    ) -> Result<Option<ViewRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM views WHERE catalog_id = ? AND label = ?")
            .bind(catalog.to_string())
            .bind(label)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_view).transpose()
    }

    async fn update_view(&self, view: &ViewRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE views SET description = ?, rules = ? WHERE catalog_id = ? AND label = ?",
        )
        .bind(&view.description)
        .bind(view.rules.to_string())
        .bind(view.catalog_id.to_string())
        .bind(&view.label)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::ViewNotFound(view.label.clone()));
        }
        Ok(())
    }

    async fn delete_view(&self, catalog: CatalogId, label: &str) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM views WHERE catalog_id = ? AND label = ?")
            .bind(catalog.to_string())
            .bind(label)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_views(&self, catalog: CatalogId) -> Result<Vec<ViewRecord>, CatalogError> {
        let rows = sqlx::query("SELECT * FROM views WHERE catalog_id = ? ORDER BY label")
            .bind(catalog.to_string())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_view).collect()
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn insert_token(&self, token: &TokenRecord) -> Result<(), CatalogError> {
        sqlx::query("INSERT INTO view_tokens (token_id, view_id, expire_at) VALUES (?, ?, ?)")
            .bind(token.token_id.to_string())
            .bind(token.view_id.to_string())
            .bind(token.expire_at.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_token(&self, id: TokenId) -> Result<Option<TokenRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM view_tokens WHERE token_id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some(TokenRecord {
                token_id: parse_uuid(&row.get::<String, _>("token_id"))?,
                view_id: parse_uuid(&row.get::<String, _>("view_id"))?,
                expire_at: parse_time(&row.get::<String, _>("expire_at"))?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_token(&self, id: TokenId) -> Result<bool, CatalogError> {
        let result = sqlx::query("DELETE FROM view_tokens WHERE token_id = ?")
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CatalogError> {
        let result = sqlx::query("DELETE FROM view_tokens WHERE expire_at <= ?")
            .bind(now.to_rfc3339())
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KeyStore for SqliteStore {
    async fn get_active_key(
        &self,
        tenant: TenantId,
    ) -> Result<Option<SigningKeyRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM signing_keys WHERE tenant_id = ? AND is_active = 1")
            .bind(tenant.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some(SigningKeyRecord {
                key_id: parse_uuid(&row.get::<String, _>("key_id"))?,
                tenant_id: parse_uuid(&row.get::<String, _>("tenant_id"))?,
                public_key: row.get("public_key"),
                encrypted_private_key: row.get("private_key"),
                is_active: row.get::<i64, _>("is_active") != 0,
                created_at: parse_time(&row.get::<String, _>("created_at"))?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_key(&self, key: &SigningKeyRecord) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "INSERT INTO signing_keys
             (key_id, tenant_id, public_key, private_key, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key.key_id.to_string())
        .bind(key.tenant_id.to_string())
        .bind(&key.public_key)
        .bind(&key.encrypted_private_key)
        .bind(if key.is_active { 1i64 } else { 0i64 })
        .bind(key.created_at.to_rfc3339())
        .execute(self.pool())
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match db_err(e) {
                // The partial unique index on (tenant_id) WHERE is_active
                // rejects a second active key.
                CatalogError::Conflict(_) => Err(CatalogError::AlreadyExists(format!(
                    "active signing key for tenant {}",
                    key.tenant_id
                ))),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn view(catalog: CatalogId, label: &str) -> ViewRecord {
        ViewRecord {
            view_id: Uuid::new_v4(),
            catalog_id: catalog,
            tenant_id: Uuid::new_v4(),
            label: label.to_string(),
            description: String::new(),
            rules: serde_json::json!({"rules": []}),
        }
    }

    #[tokio::test]
    async fn view_lifecycle_by_label() {
        let store = SqliteStore::in_memory().await.unwrap();
        let catalog = Uuid::new_v4();
        let mut v = view(catalog, "readers");
        store.create_view(&v).await.unwrap();

        assert!(matches!(
            store.create_view(&view(catalog, "readers")).await,
            Err(CatalogError::AlreadyExists(_))
        ));

        v.description = "updated".to_string();
        store.update_view(&v).await.unwrap();
        let back = store
            .get_view_by_label(catalog, "readers")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.description, "updated");
        assert_eq!(back.view_id, v.view_id);

        assert!(store.delete_view(catalog, "readers").await.unwrap());
        assert!(store
            .get_view_by_label(catalog, "readers")
            .await
            .unwrap()
            .is_none());

        let missing = view(catalog, "missing");
        assert!(matches!(
            store.update_view(&missing).await,
            Err(CatalogError::ViewNotFound(_))
        ));
    }

    #[tokio::test]
    async fn token_records_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let token = TokenRecord {
            token_id: Uuid::new_v4(),
            view_id: Uuid::new_v4(),
            expire_at: Utc::now() + chrono::Duration::hours(1),
        };
        store.insert_token(&token).await.unwrap();
        let back = store.get_token(token.token_id).await.unwrap().unwrap();
        assert_eq!(back.view_id, token.view_id);
        // rfc3339 round trip keeps the instant.
        assert!((back.expire_at - token.expire_at).num_milliseconds().abs() < 1000);
    }

    #[tokio::test]
    async fn second_active_key_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let tenant = Uuid::new_v4();
        let key = SigningKeyRecord {
            key_id: Uuid::new_v4(),
            tenant_id: tenant,
            public_key: vec![7; 32],
            encrypted_private_key: vec![9; 80],
            is_active: true,
            created_at: Utc::now(),
        };
        store.insert_key(&key).await.unwrap();
        let again = SigningKeyRecord {
            key_id: Uuid::new_v4(),
            ..key.clone()
        };
        assert!(matches!(
            store.insert_key(&again).await,
            Err(CatalogError::AlreadyExists(_))
        ));
        let active = store.get_active_key(tenant).await.unwrap().unwrap();
        assert_eq!(active.key_id, key.key_id);
        assert_eq!(active.public_key, key.public_key);
    }
}
