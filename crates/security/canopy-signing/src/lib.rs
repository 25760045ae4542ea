#![forbid(unsafe_code)]

//! **canopy-signing** – Signing-key lifecycle for Canopy tokens.
//!
//! Each tenant gets one active Ed25519 keypair, created lazily on first
//! need. The private half is encrypted at rest (see [`crypto`]); the
//! decrypted handle is cached in-process behind a read-mostly lock, with a
//! separate mutex serializing initialization so concurrent first callers
//! observe the same instance.
//!
//! This module is explicitly a local-development stand-in for a KMS. The
//! [`KeyStore`] trait in `canopy-store-core` is the boundary that persists
//! across that substitution: swap the store, keep the manager.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use canopy_store_core::records::SigningKeyRecord;
use canopy_store_core::traits::KeyStore;
use canopy_types::{CatalogError, KeyId, SecretString, TenantId};

pub mod crypto;

/// A decrypted, ready-to-sign key handle.
///
/// Cloning is cheap behind the `Arc` handed out by [`KeyManager`]; the
/// private DER never leaves this struct except through
/// [`ActiveKey::private_key_der`], which token issuance feeds straight
/// into the JWT encoder.
pub struct ActiveKey {
    key_id: KeyId,
    tenant_id: TenantId,
    public_key: Vec<u8>,
    pkcs8_der: Vec<u8>,
    signing: SigningKey,
}

impl ActiveKey {
    /// Key identifier.
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    /// Owning tenant.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Raw Ed25519 public key bytes (32 bytes).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// PKCS#8 DER of the private key, for the JWT encoder.
    pub fn private_key_der(&self) -> &[u8] {
        &self.pkcs8_der
    }

    /// Sign arbitrary bytes. Token issuance goes through the JWT encoder
    /// instead; this is for detached signatures and tests.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for ActiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveKey")
            .field("key_id", &self.key_id)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Per-tenant lazy fetch-or-create of the active signing key.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    passphrase: SecretString,
    cache: RwLock<HashMap<TenantId, Arc<ActiveKey>>>,
    // Taken only on cache miss; the read path above never blocks on it.
    init_lock: Mutex<()>,
}

impl KeyManager {
    /// Build a manager over a key store and the configured passphrase.
    pub fn new(store: Arc<dyn KeyStore>, passphrase: SecretString) -> Self {
        Self {
            store,
            passphrase,
            cache: RwLock::new(HashMap::new()),
            init_lock: Mutex::new(()),
        }
    }

    /// The tenant's active key, initializing it on first use.
    ///
    /// Concurrent callers during the initial fetch are serialized on the
    /// init mutex and all observe the same instance. Key generation does
    /// not honor cancellation (it takes a handful of milliseconds); the
    /// mutex is released on every path.
    pub async fn active_key(&self, tenant: TenantId) -> Result<Arc<ActiveKey>, CatalogError> {
        if let Some(key) = self.cache.read().await.get(&tenant) {
            return Ok(key.clone());
        }

        let _guard = self.init_lock.lock().await;
        // Double check: a racing initializer may have filled the cache
        // while this caller waited on the mutex.
        if let Some(key) = self.cache.read().await.get(&tenant) {
            return Ok(key.clone());
        }

        let key = match self.store.get_active_key(tenant).await? {
            Some(record) => self.unseal(record)?,
            None => self.generate_and_persist(tenant).await?,
        };
        let key = Arc::new(key);
        self.cache.write().await.insert(tenant, key.clone());
        Ok(key)
    }

    fn unseal(&self, record: SigningKeyRecord) -> Result<ActiveKey, CatalogError> {
        let der = crypto::open_private_key(
            self.passphrase.expose(),
            &record.encrypted_private_key,
        )?;
        let signing = SigningKey::from_pkcs8_der(&der).map_err(|e| {
            CatalogError::UnableToGenerateSigningKey(format!("stored key is malformed: {e}"))
        })?;
        Ok(ActiveKey {
            key_id: record.key_id,
            tenant_id: record.tenant_id,
            public_key: record.public_key,
            pkcs8_der: der,
            signing,
        })
    }

    async fn generate_and_persist(&self, tenant: TenantId) -> Result<ActiveKey, CatalogError> {
        let signing = SigningKey::generate(&mut OsRng);
        let der = signing
            .to_pkcs8_der()
            .map_err(|e| {
                CatalogError::UnableToGenerateSigningKey(format!("pkcs8 encoding failed: {e}"))
            })?
            .as_bytes()
            .to_vec();
        let public_key = signing.verifying_key().to_bytes().to_vec();
        let record = SigningKeyRecord {
            key_id: Uuid::new_v4(),
            tenant_id: tenant,
            public_key: public_key.clone(),
            encrypted_private_key: crypto::seal_private_key(self.passphrase.expose(), &der)?,
            is_active: true,
            created_at: Utc::now(),
        };

        match self.store.insert_key(&record).await {
            Ok(()) => {
                info!(tenant = %tenant, key_id = %record.key_id, "generated signing key");
                Ok(ActiveKey {
                    key_id: record.key_id,
                    tenant_id: tenant,
                    public_key,
                    pkcs8_der: der,
                    signing,
                })
            }
            // Another writer won the insert race; adopt its key.
            Err(CatalogError::AlreadyExists(_)) => {
                let record = self.store.get_active_key(tenant).await?.ok_or_else(|| {
                    CatalogError::UnableToGenerateSigningKey(
                        "active key vanished during initialization".to_string(),
                    )
                })?;
                self.unseal(record)
            }
            Err(e) => Err(e),
        }
    }
}
