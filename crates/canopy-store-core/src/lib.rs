#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **canopy-store-core** – Core storage abstractions for Canopy.
//!
//! This crate defines the content-addressed object model and the store
//! traits the catalog core is written against. It sits directly above
//! `canopy-types` and contains no concrete persistence; drivers (in-memory,
//! SQLite) implement the traits in separate crates.
//!
//! The model splits every persisted object in two:
//!
//! * a [`CatalogObject`] blob keyed by `(tenant, hash)` where `hash` is the
//!   blake3 digest of the canonical payload bytes, inserted idempotently;
//! * one or more [`ObjectRef`] rows mapping a human path inside a per-kind
//!   directory to that hash, each carrying the object's outbound reference
//!   names.
//!
//! Two refs at different paths may share a hash (namespace-local views of
//! identical content). The reference rows are authoritative: a blob with no
//! remaining ref is unreachable and is reaped opportunistically.

use serde::{Deserialize, Serialize};

use canopy_types::Kind;

/// Pure path arithmetic shared by the resolver and the drivers.
pub mod paths;
/// Relational records mirroring the persisted schema.
pub mod records;
/// Transactional write plans executed atomically by drivers.
pub mod plan;
/// Store traits implemented by drivers.
pub mod traits;

//─────────────────────────────
//  Content addressing
//─────────────────────────────

/// Blake3 digest of an object's canonical payload bytes.
pub type ObjectHash = [u8; 32];

/// Compute the content address of a payload.
pub fn content_hash(data: &[u8]) -> ObjectHash {
    blake3::hash(data).into()
}

/// Hex rendering of an object hash, for logs and error messages.
pub fn hash_hex(hash: &ObjectHash) -> String {
    let mut out = String::with_capacity(64);
    for b in hash {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

//─────────────────────────────
//  Stored object model
//─────────────────────────────

/// A content-addressed object blob.
///
/// The table is keyed by `(tenant, hash)`; re-inserting the same hash is a
/// successful no-op, which is what makes saves idempotent at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogObject {
    /// Kind discriminator (tagged variant, not per-kind subclasses).
    pub kind: Kind,
    /// Schema version of the payload.
    pub version: String,
    /// Blake3 digest of `data`.
    pub hash: ObjectHash,
    /// Canonical payload bytes.
    pub data: Vec<u8>,
}

impl CatalogObject {
    /// Build an object from payload bytes, computing its content address.
    pub fn new(kind: Kind, version: impl Into<String>, data: Vec<u8>) -> Self {
        let hash = content_hash(&data);
        Self {
            kind,
            version: version.into(),
            hash,
            data,
        }
    }
}

/// A named outbound dependency on another object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    /// Fully-qualified storage path of the referenced or referencing object.
    pub name: String,
}

/// A row in a per-kind directory mapping a path to an object hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Storage path within the directory.
    pub path: String,
    /// Content address of the object this path resolves to.
    pub hash: ObjectHash,
    /// Reference names tracked on this row. For collection schemas these are
    /// outbound parameter paths; for parameter schemas these are the inbound
    /// collection paths depending on them.
    pub references: Vec<ObjectReference>,
}

impl ObjectRef {
    /// A ref row with no references.
    pub fn new(path: impl Into<String>, hash: ObjectHash) -> Self {
        Self {
            path: path.into(),
            hash,
            references: Vec::new(),
        }
    }

    /// A ref row with an initial reference set.
    pub fn with_references(
        path: impl Into<String>,
        hash: ObjectHash,
        references: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            path: path.into(),
            hash,
            references: references
                .into_iter()
                .map(|name| ObjectReference { name })
                .collect(),
        }
    }

    /// Reference names as a plain list.
    pub fn reference_names(&self) -> Vec<String> {
        self.references.iter().map(|r| r.name.clone()).collect()
    }

    /// Whether a reference with this name is present.
    pub fn has_reference(&self, name: &str) -> bool {
        self.references.iter().any(|r| r.name == name)
    }
}

/// Convenient prelude for importing the most common types.
pub mod prelude {
    pub use super::paths::{ancestor_dirs, is_parent_or_same, join_path, last_segment, parent_dir};
    pub use super::plan::{BackRefUpdate, DeletePlan, SavePlan};
    pub use super::records::*;
    pub use super::traits::{IdentityStore, KeyStore, ObjectStore, TokenStore, ViewStore};
    pub use super::{content_hash, hash_hex, CatalogObject, ObjectHash, ObjectRef, ObjectReference};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_and_collision_visible() {
        let a = content_hash(b"payload");
        let b = content_hash(b"payload");
        let c = content_hash(b"other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(hash_hex(&a).len(), 64);
    }

    #[test]
    fn object_hash_tracks_data() {
        let obj = CatalogObject::new(Kind::ParameterSchema, "0.1.0", b"{}".to_vec());
        assert_eq!(obj.hash, content_hash(b"{}"));
    }

    #[test]
    fn ref_reference_helpers() {
        let mut r = ObjectRef::with_references("/a/p", [0u8; 32], ["/a/c1".to_string()]);
        assert!(r.has_reference("/a/c1"));
        assert!(!r.has_reference("/a/c2"));
        r.references.push(ObjectReference {
            name: "/a/c2".to_string(),
        });
        assert_eq!(r.reference_names(), vec!["/a/c1", "/a/c2"]);
    }
}
