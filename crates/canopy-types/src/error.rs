//! The flat error taxonomy for the catalog control plane.
//!
//! Every variant carries an HTTP status and an "expand" flag controlling
//! whether wrapped details are included in responses. Validation and
//! conflict errors surface unchanged; infrastructure errors are logged by
//! the caller and returned as opaque 500s.

use thiserror::Error;

/// Boxed error cause attached to infrastructure failures.
pub type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for all catalog, view and token operations.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CatalogError {
    // Validation
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("invalid name format: {0}")]
    InvalidNameFormat(String),
    #[error("missing required attribute: {0}")]
    MissingRequiredAttribute(String),
    #[error("unsupported kind: {0}")]
    UnsupportedKind(String),
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("validation failed: {0}")]
    ValidationError(String),
    #[error("invalid field schema: {0}")]
    InvalidFieldSchema(String),
    #[error("value above maximum: {0}")]
    ValueAboveMax(String),
    #[error("value below minimum: {0}")]
    ValueBelowMin(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    // Identity
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    #[error("catalog not found: {0}")]
    CatalogNotFound(String),
    #[error("variant not found: {0}")]
    VariantNotFound(String),
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    // Conflict
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("object is identical to the existing object")]
    EqualToExistingObject,
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    #[error("unable to delete parameter with references: {0}")]
    UnableToDeleteParameterWithReferences(String),
    #[error("unable to delete collection with references: {0}")]
    UnableToDeleteCollectionWithReferences(String),
    #[error("schema of a collection is not mutable: {0}")]
    SchemaOfCollectionNotMutable(String),
    #[error("write conflict, retry the operation: {0}")]
    Conflict(String),

    // Not found
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("resource group not found: {0}")]
    ResourceGroupNotFound(String),
    #[error("view not found: {0}")]
    ViewNotFound(String),

    // Crypto / token issuance
    #[error("unable to generate signing key: {0}")]
    UnableToGenerateSigningKey(String),
    #[error("unable to parse token duration: {0}")]
    UnableToParseTokenDuration(String),
    #[error("unable to generate token: {0}")]
    UnableToGenerateToken(String),
    #[error("unable to create view: {0}")]
    UnableToCreateView(String),

    // Infrastructure fallback
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Cause>,
    },
}

impl CatalogError {
    /// Wrap an infrastructure failure, preserving the cause chain.
    pub fn internal(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        CatalogError::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// An infrastructure failure without a structured cause.
    pub fn infra(message: impl Into<String>) -> Self {
        CatalogError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// The deadline carried by the request context has passed.
    pub fn timed_out() -> Self {
        CatalogError::Internal {
            message: "operation timed out".to_string(),
            source: None,
        }
    }

    /// HTTP status this error maps to at the service boundary.
    pub fn http_status(&self) -> u16 {
        use CatalogError::*;
        match self {
            InvalidSchema(_)
            | InvalidNameFormat(_)
            | MissingRequiredAttribute(_)
            | UnsupportedKind(_)
            | InvalidVersion(_)
            | ValidationError(_)
            | InvalidFieldSchema(_)
            | ValueAboveMax(_)
            | ValueBelowMin(_)
            | TypeMismatch(_)
            | UnknownParameter(_)
            | InvalidCatalog(_) => 400,
            CatalogNotFound(_)
            | VariantNotFound(_)
            | NamespaceNotFound(_)
            | WorkspaceNotFound(_)
            | ObjectNotFound(_)
            | ResourceGroupNotFound(_)
            | ViewNotFound(_) => 404,
            AlreadyExists(_)
            | EqualToExistingObject
            | SchemaConflict(_)
            | UnableToDeleteParameterWithReferences(_)
            | UnableToDeleteCollectionWithReferences(_)
            | SchemaOfCollectionNotMutable(_)
            | Conflict(_) => 409,
            UnableToGenerateSigningKey(_)
            | UnableToParseTokenDuration(_)
            | UnableToGenerateToken(_)
            | UnableToCreateView(_)
            | Internal { .. } => 500,
        }
    }

    /// Whether wrapped details may be included in the response body.
    /// Infrastructure errors stay opaque.
    pub fn expand(&self) -> bool {
        !matches!(
            self,
            CatalogError::Internal { .. }
                | CatalogError::UnableToGenerateSigningKey(_)
                | CatalogError::UnableToGenerateToken(_)
        )
    }

    /// Whether the caller may retry the operation verbatim.
    pub fn retriable(&self) -> bool {
        matches!(self, CatalogError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_service_contract() {
        assert_eq!(CatalogError::InvalidCatalog("c".into()).http_status(), 400);
        assert_eq!(CatalogError::CatalogNotFound("c".into()).http_status(), 404);
        assert_eq!(CatalogError::AlreadyExists("c".into()).http_status(), 409);
        assert_eq!(CatalogError::EqualToExistingObject.http_status(), 409);
        assert_eq!(
            CatalogError::SchemaConflict("p".into()).http_status(),
            409
        );
        assert_eq!(
            CatalogError::UnableToDeleteParameterWithReferences("p".into()).http_status(),
            409
        );
        assert_eq!(CatalogError::InvalidSchema("s".into()).http_status(), 400);
        assert_eq!(CatalogError::infra("boom").http_status(), 500);
    }

    #[test]
    fn infrastructure_errors_stay_opaque() {
        assert!(!CatalogError::infra("db down").expand());
        assert!(CatalogError::SchemaConflict("p".into()).expand());
        assert!(CatalogError::ValidationError("v".into()).expand());
    }

    #[test]
    fn only_write_conflicts_are_retriable() {
        assert!(CatalogError::Conflict("row locked".into()).retriable());
        assert!(!CatalogError::AlreadyExists("x".into()).retriable());
    }

    #[test]
    fn cause_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = CatalogError::internal("write failed", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
