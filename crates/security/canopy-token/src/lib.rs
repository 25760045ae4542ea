#![forbid(unsafe_code)]

//! **canopy-token** – EdDSA token issuance for Canopy views.
//!
//! A token is a JWT signed with the tenant's active Ed25519 key, bound to
//! a persisted view record through its `jti` claim: consumers verify the
//! signature, `exp` and `aud`, then confirm a matching `view_tokens` row
//! exists. Issuance always passes the derived view through the containment
//! gate *before* anything is persisted.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use canopy_signing::KeyManager;
use canopy_store_core::records::{TokenRecord, ViewRecord};
use canopy_store_core::traits::{TokenStore, ViewStore};
use canopy_types::{CanopyConfig, CatalogError, CatalogId, TenantId, TokenId, ViewId};
use canopy_view_core::{validate_derived, ViewDefinition, ViewManager};

pub mod duration;

pub use duration::parse_duration;

/// Claim set carried by every issued token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// View the token authorizes.
    pub view_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Issuer (`host:port`).
    pub iss: String,
    /// Audience (`host:port`).
    pub aud: Vec<String>,
    /// Expiry (seconds since Unix epoch).
    pub exp: u64,
    /// Issued-at (seconds since Unix epoch).
    pub iat: u64,
    /// Token identifier; matches a `view_tokens` row.
    pub jti: String,
    /// Caller-supplied extras, flattened into the claim set.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// How the parent view is supplied to issuance.
#[derive(Debug, Clone)]
pub enum ParentView {
    /// Look the parent up by id.
    Id(ViewId),
    /// Look the parent up by label within the catalog.
    Label(String),
    /// An explicit, already-loaded definition. Requires
    /// `create_derived_view` since there is no persisted row to bind to.
    Definition(ViewDefinition),
}

/// One issuance request.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Parent the derived view must be contained in.
    pub parent: ParentView,
    /// The derived view definition.
    pub derived: ViewDefinition,
    /// Persist the derived view as its own record and bind the token to it.
    pub create_derived_view: bool,
    /// Label for the persisted derived view; generated when absent.
    pub derived_label: Option<String>,
    /// Description for the persisted derived view.
    pub derived_description: String,
    /// Extra claims flattened into the JWT.
    pub extra_claims: serde_json::Map<String, serde_json::Value>,
}

impl IssueRequest {
    /// A request deriving from a persisted parent with default settings.
    pub fn derived_from(parent: ParentView, derived: ViewDefinition) -> Self {
        Self {
            parent,
            derived,
            create_derived_view: true,
            derived_label: None,
            derived_description: String::new(),
            extra_claims: serde_json::Map::new(),
        }
    }
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Signed JWT string.
    pub token: String,
    /// The `jti` recorded in `view_tokens`.
    pub token_id: TokenId,
    /// View the token binds to.
    pub view_id: ViewId,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Assembles, signs and records view tokens.
pub struct TokenIssuer {
    views: ViewManager,
    view_store: Arc<dyn ViewStore>,
    tokens: Arc<dyn TokenStore>,
    keys: Arc<KeyManager>,
    config: CanopyConfig,
}

impl TokenIssuer {
    /// Build an issuer over the view/token stores and the key manager.
    pub fn new(
        view_store: Arc<dyn ViewStore>,
        tokens: Arc<dyn TokenStore>,
        keys: Arc<KeyManager>,
        config: CanopyConfig,
    ) -> Self {
        Self {
            views: ViewManager::new(view_store.clone()),
            view_store,
            tokens,
            keys,
            config,
        }
    }

    /// Issue a token for `request.derived` within `catalog`.
    ///
    /// The containment gate runs before any persistence: a derived view
    /// exceeding its parent writes nothing. A token row that ends up
    /// never referenced (because signing failed afterwards) is harmless;
    /// the token is useless without the JWT.
    pub async fn issue(
        &self,
        tenant: TenantId,
        catalog: CatalogId,
        request: IssueRequest,
    ) -> Result<IssuedToken, CatalogError> {
        let (parent_def, parent_record) = self.resolve_parent(catalog, &request.parent).await?;
        validate_derived(&parent_def, &request.derived)?;

        let view_id = if request.create_derived_view {
            let label = request
                .derived_label
                .clone()
                .unwrap_or_else(|| format!("derived-{}", &Uuid::new_v4().simple().to_string()[..8]));
            let record = self
                .views
                .create_view(
                    tenant,
                    catalog,
                    &label,
                    &request.derived_description,
                    &request.derived.to_value()?,
                )
                .await
                .map_err(|e| match e {
                    CatalogError::AlreadyExists(msg) => CatalogError::UnableToCreateView(msg),
                    other => other,
                })?;
            record.view_id
        } else {
            parent_record
                .ok_or_else(|| {
                    CatalogError::UnableToCreateView(
                        "an inline parent definition requires creating a derived view".to_string(),
                    )
                })?
                .view_id
        };

        let ttl = parse_duration(&self.config.default_token_validity)?;
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| CatalogError::UnableToParseTokenDuration(e.to_string()))?;
        let now = Utc::now();
        let expires_at = now + ttl;

        let token_id = Uuid::new_v4();
        self.tokens
            .insert_token(&TokenRecord {
                token_id,
                view_id,
                expire_at: expires_at,
            })
            .await?;

        let authority = self.config.server_authority();
        let mut claims = Claims {
            view_id: view_id.to_string(),
            tenant_id: tenant.to_string(),
            iss: authority.clone(),
            aud: vec![authority],
            exp: expires_at.timestamp() as u64,
            iat: now.timestamp() as u64,
            jti: token_id.to_string(),
            extra: serde_json::Map::new(),
        };
        claims.extra.extend(request.extra_claims.clone());

        let key = self.keys.active_key(tenant).await?;
        let encoding = EncodingKey::from_ed_der(key.private_key_der());
        let token = encode(&Header::new(Algorithm::EdDSA), &claims, &encoding)
            .map_err(|e| CatalogError::UnableToGenerateToken(e.to_string()))?;

        info!(%view_id, %token_id, %expires_at, "issued view token");
        Ok(IssuedToken {
            token,
            token_id,
            view_id,
            expires_at,
        })
    }

    async fn resolve_parent(
        &self,
        catalog: CatalogId,
        parent: &ParentView,
    ) -> Result<(ViewDefinition, Option<ViewRecord>), CatalogError> {
        match parent {
            ParentView::Id(id) => {
                let record = self.views.load(*id).await?;
                let def = ViewManager::definition_of(&record)?;
                Ok((def, Some(record)))
            }
            ParentView::Label(label) => {
                let record = self.views.load_by_label(catalog, label).await?;
                let def = ViewManager::definition_of(&record)?;
                Ok((def, Some(record)))
            }
            ParentView::Definition(def) => {
                debug!("issuing against an inline parent definition");
                Ok((def.clone(), None))
            }
        }
    }

    /// The view store this issuer persists derived views into.
    pub fn view_store(&self) -> &Arc<dyn ViewStore> {
        &self.view_store
    }
}

/// Structural token validation: signature, `exp`, `aud`, claim decode and
/// (optionally) the `view_tokens` row behind `jti`. Data-plane rule
/// enforcement is a consumer concern.
pub struct TokenValidator {
    keys: Arc<KeyManager>,
    audience: String,
}

impl TokenValidator {
    /// Build a validator over the same key material the issuer uses.
    pub fn new(keys: Arc<KeyManager>, config: &CanopyConfig) -> Self {
        Self {
            keys,
            audience: config.server_authority(),
        }
    }

    /// Verify signature, expiry and audience; return the claims.
    pub async fn validate(&self, tenant: TenantId, raw: &str) -> Result<Claims, CatalogError> {
        let key = self.keys.active_key(tenant).await?;
        let decoding = DecodingKey::from_ed_der(key.public_key());
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[self.audience.clone()]);
        decode::<Claims>(raw, &decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| CatalogError::ValidationError(format!("token rejected: {e}")))
    }

    /// [`validate`](Self::validate), plus proof that the `jti` was issued
    /// by this service and still maps to the claimed view.
    pub async fn validate_with_store(
        &self,
        tenant: TenantId,
        raw: &str,
        tokens: &dyn TokenStore,
    ) -> Result<Claims, CatalogError> {
        let claims = self.validate(tenant, raw).await?;
        let jti = Uuid::parse_str(&claims.jti)
            .map_err(|e| CatalogError::ValidationError(format!("malformed jti: {e}")))?;
        let record = tokens
            .get_token(jti)
            .await?
            .ok_or_else(|| CatalogError::ValidationError("unknown token id".to_string()))?;
        if record.view_id.to_string() != claims.view_id {
            return Err(CatalogError::ValidationError(
                "token does not match its view record".to_string(),
            ));
        }
        if record.expire_at <= Utc::now() {
            return Err(CatalogError::ValidationError("token expired".to_string()));
        }
        Ok(claims)
    }
}
