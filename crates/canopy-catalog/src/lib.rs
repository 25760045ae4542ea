#![forbid(unsafe_code)]

//! **canopy-catalog** – The catalog core: saving, resolving and deleting
//! typed objects while keeping the reference graph consistent.
//!
//! The crate wires the layers below into the uniform surface handlers
//! expose:
//!
//! * [`canonical`] merges metadata overrides, validates identity and
//!   resolves catalog/variant/namespace/workspace placement into the
//!   directory set a request operates on (workspace directories win).
//! * [`resolver`] performs closest-ancestor parameter lookup, gated by the
//!   `hierarchical_schemas` option.
//! * [`graph`] owns every save and delete path: dependency validation,
//!   reference deltas, delete-safety and the schema-conflict rules for
//!   parameter re-saves.
//! * [`handlers`] maps kind strings to uniform CRUD handlers via an
//!   explicitly constructed registry.

use std::sync::Arc;

use canopy_store_core::traits::{IdentityStore, ObjectStore};
use canopy_types::CanopyConfig;

pub mod canonical;
pub mod graph;
pub mod handlers;
pub mod resolver;

pub use canonical::Placement;
pub use handlers::{KindHandler, KindRegistry};

/// Shared dependencies for every catalog operation.
#[derive(Clone)]
pub struct CatalogService {
    objects: Arc<dyn ObjectStore>,
    identity: Arc<dyn IdentityStore>,
    config: CanopyConfig,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    /// Build a service over the two stores and the recognized options.
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        identity: Arc<dyn IdentityStore>,
        config: CanopyConfig,
    ) -> Self {
        Self {
            objects,
            identity,
            config,
        }
    }

    /// Object store handle.
    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Identity store handle.
    pub fn identity(&self) -> &Arc<dyn IdentityStore> {
        &self.identity
    }

    /// Service options.
    pub fn config(&self) -> &CanopyConfig {
        &self.config
    }
}
