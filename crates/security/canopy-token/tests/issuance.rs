//! End-to-end issuance: containment gate, persistence, EdDSA verification.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use canopy_signing::KeyManager;
use canopy_store_core::traits::{TokenStore, ViewStore};
use canopy_store_memory::MemoryStore;
use canopy_token::{IssueRequest, ParentView, TokenIssuer, TokenValidator};
use canopy_types::{CanopyConfig, CatalogError, SecretString};
use canopy_view_core::{ViewDefinition, ViewManager};

fn config() -> CanopyConfig {
    CanopyConfig {
        default_token_validity: "1h".to_string(),
        server_host_name: "catalog".to_string(),
        server_port: "8678".to_string(),
        key_encryption_passwd: SecretString::new("test-passphrase"),
        ..CanopyConfig::default()
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    issuer: TokenIssuer,
    validator: TokenValidator,
    views: ViewManager,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let keys = Arc::new(KeyManager::new(
        store.clone(),
        SecretString::new("test-passphrase"),
    ));
    let issuer = TokenIssuer::new(store.clone(), store.clone(), keys.clone(), config());
    let validator = TokenValidator::new(keys, &config());
    let views = ViewManager::new(store.clone());
    Harness {
        store,
        issuer,
        validator,
        views,
    }
}

fn parent_definition() -> serde_json::Value {
    json!({
        "scope": {"catalog": "tc"},
        "rules": [
            {"intent": "Allow", "actions": ["catalog.list", "variant.list"],
             "targets": ["res://catalogs/tc"]}
        ]
    })
}

fn derived_definition() -> ViewDefinition {
    ViewDefinition::parse(&json!({
        "scope": {"catalog": "tc"},
        "rules": [
            {"intent": "Allow", "actions": ["catalog.list"], "targets": ["res://catalogs/tc"]}
        ]
    }))
    .unwrap()
}

#[tokio::test]
async fn issue_and_verify_end_to_end() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let catalog = Uuid::new_v4();

    let parent = h
        .views
        .create_view(tenant, catalog, "parent", "", &parent_definition())
        .await
        .unwrap();

    let issued = h
        .issuer
        .issue(
            tenant,
            catalog,
            IssueRequest::derived_from(ParentView::Id(parent.view_id), derived_definition()),
        )
        .await
        .unwrap();

    // The jti is retrievable from view_tokens and bound to the derived view.
    let record = h.store.get_token(issued.token_id).await.unwrap().unwrap();
    assert_eq!(record.view_id, issued.view_id);
    assert_ne!(issued.view_id, parent.view_id);

    // The JWT verifies under EdDSA and matches the persisted row.
    let claims = h
        .validator
        .validate_with_store(tenant, &issued.token, &*h.store)
        .await
        .unwrap();
    assert_eq!(claims.jti, issued.token_id.to_string());
    assert_eq!(claims.view_id, issued.view_id.to_string());
    assert_eq!(claims.tenant_id, tenant.to_string());
    assert_eq!(claims.iss, "catalog:8678");
}

#[tokio::test]
async fn denied_derivation_writes_nothing() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let catalog = Uuid::new_v4();

    let parent = h
        .views
        .create_view(tenant, catalog, "parent", "", &parent_definition())
        .await
        .unwrap();

    let exceeding = ViewDefinition::parse(&json!({
        "scope": {"catalog": "tc"},
        "rules": [
            {"intent": "Allow", "actions": ["catalog.admin"], "targets": ["res://catalogs/tc"]}
        ]
    }))
    .unwrap();

    let err = h
        .issuer
        .issue(
            tenant,
            catalog,
            IssueRequest::derived_from(ParentView::Id(parent.view_id), exceeding),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnableToCreateView(_)));

    // The refusal happened before any persistence.
    let views = h.store.list_views(catalog).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(h.store.purge_expired(chrono::Utc::now()).await.unwrap(), 0);
}

#[tokio::test]
async fn expiry_tracks_configured_validity() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let catalog = Uuid::new_v4();

    h.views
        .create_view(tenant, catalog, "parent", "", &parent_definition())
        .await
        .unwrap();
    let before = chrono::Utc::now();
    let issued = h
        .issuer
        .issue(
            tenant,
            catalog,
            IssueRequest::derived_from(ParentView::Label("parent".to_string()), derived_definition()),
        )
        .await
        .unwrap();
    let after = chrono::Utc::now();

    let lower = before + chrono::Duration::hours(1) - chrono::Duration::seconds(2);
    let upper = after + chrono::Duration::hours(1) + chrono::Duration::seconds(2);
    assert!(issued.expires_at >= lower && issued.expires_at <= upper);
}

#[tokio::test]
async fn extra_claims_ride_along() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let catalog = Uuid::new_v4();
    h.views
        .create_view(tenant, catalog, "parent", "", &parent_definition())
        .await
        .unwrap();

    let mut request = IssueRequest::derived_from(
        ParentView::Label("parent".to_string()),
        derived_definition(),
    );
    request
        .extra_claims
        .insert("session".to_string(), json!("abc-123"));

    let issued = h.issuer.issue(tenant, catalog, request).await.unwrap();
    let claims = h.validator.validate(tenant, &issued.token).await.unwrap();
    assert_eq!(claims.extra.get("session"), Some(&json!("abc-123")));
}

#[tokio::test]
async fn forged_and_unknown_tokens_are_rejected() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let catalog = Uuid::new_v4();
    h.views
        .create_view(tenant, catalog, "parent", "", &parent_definition())
        .await
        .unwrap();
    let issued = h
        .issuer
        .issue(
            tenant,
            catalog,
            IssueRequest::derived_from(ParentView::Label("parent".to_string()), derived_definition()),
        )
        .await
        .unwrap();

    // Tampering with the payload breaks the signature.
    let mut parts: Vec<String> = issued.token.split('.').map(str::to_string).collect();
    parts[1] = format!("{}AA", parts[1]);
    let forged = parts.join(".");
    assert!(h.validator.validate(tenant, &forged).await.is_err());

    // A valid-looking token with no view_tokens row is refused.
    h.store.delete_token(issued.token_id).await.unwrap();
    assert!(h
        .validator
        .validate_with_store(tenant, &issued.token, &*h.store)
        .await
        .is_err());
}

#[tokio::test]
async fn inline_parent_requires_derived_view_creation() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let catalog = Uuid::new_v4();

    let parent = ViewDefinition::parse(&parent_definition()).unwrap();
    let mut request = IssueRequest::derived_from(ParentView::Definition(parent), derived_definition());
    request.create_derived_view = false;

    let err = h.issuer.issue(tenant, catalog, request).await.unwrap_err();
    assert!(matches!(err, CatalogError::UnableToCreateView(_)));
}
