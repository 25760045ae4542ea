//! The recognized configuration surface.
//!
//! Loading (files, environment, CLI) is a collaborator concern; this module
//! only enumerates the options the core consumes and their defaults.

use serde::Deserialize;

/// A string that must never leak through `Debug` or log output.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        SecretString(value.into())
    }

    /// Access the underlying secret.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString(***)")
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        SecretString(value.to_string())
    }
}

/// Options recognized by the catalog core.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CanopyConfig {
    /// Validity window applied to issued tokens, as a duration string
    /// (`"30s"`, `"15m"`, `"24h"`, …).
    pub default_token_validity: String,
    /// Host name placed in the JWT `iss`/`aud` claims.
    pub server_host_name: String,
    /// Port placed in the JWT `iss`/`aud` claims.
    pub server_port: String,
    /// Passphrase the signing key's private half is encrypted under.
    pub key_encryption_passwd: SecretString,
    /// Enables closest-ancestor parameter-schema resolution. When off, only
    /// the starting directory path is consulted.
    pub hierarchical_schemas: bool,
    /// When a parameter schema lands between an ancestor and its dependents,
    /// remap those dependents to the closer schema instead of rejecting.
    pub remap_attribute_schema_references: bool,
}

impl Default for CanopyConfig {
    fn default() -> Self {
        Self {
            default_token_validity: "24h".to_string(),
            server_host_name: "localhost".to_string(),
            server_port: "8678".to_string(),
            key_encryption_passwd: SecretString::default(),
            hierarchical_schemas: true,
            remap_attribute_schema_references: false,
        }
    }
}

impl CanopyConfig {
    /// `host:port` issuer/audience string for token claims.
    pub fn server_authority(&self) -> String {
        format!("{}:{}", self.server_host_name, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let s = SecretString::new("hunter2");
        assert_eq!(format!("{s:?}"), "SecretString(***)");
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn defaults() {
        let c = CanopyConfig::default();
        assert_eq!(c.default_token_validity, "24h");
        assert!(c.hierarchical_schemas);
        assert!(!c.remap_attribute_schema_references);
        assert_eq!(c.server_authority(), "localhost:8678");
    }

    #[test]
    fn deserializes_from_pascal_case() {
        let c: CanopyConfig = serde_json::from_str(
            r#"{"DefaultTokenValidity":"1h","ServerHostName":"svc","ServerPort":"80",
                "KeyEncryptionPasswd":"pw","HierarchicalSchemas":false,
                "RemapAttributeSchemaReferences":true}"#,
        )
        .unwrap();
        assert_eq!(c.default_token_validity, "1h");
        assert_eq!(c.server_authority(), "svc:80");
        assert!(!c.hierarchical_schemas);
        assert!(c.remap_attribute_schema_references);
        assert_eq!(c.key_encryption_passwd.expose(), "pw");
    }
}
