//! Transactional write plans.
//!
//! The reference-graph manager computes *what* must change (the target ref,
//! the blob, and the symmetric back-reference updates on related paths) as
//! plain data; a driver executes the whole plan inside a single
//! transaction. This keeps the graph logic pure and the atomicity boundary
//! in one place per driver.

use canopy_types::DirectoryId;

use crate::{CatalogObject, ObjectRef};

/// One back-reference mutation on a related path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackRefUpdate {
    /// Directory holding the related ref row.
    pub directory: DirectoryId,
    /// Storage path of the related ref row.
    pub path: String,
    /// Reference name to add or remove.
    pub reference: String,
}

/// Atomic save: insert the blob (idempotent), upsert the target ref, and
/// apply the back-reference delta on related rows.
///
/// Execution order inside the transaction is fixed: blob, target ref,
/// related rows.
#[derive(Debug, Clone)]
pub struct SavePlan {
    /// Directory the target ref lives in.
    pub directory: DirectoryId,
    /// Blob to insert.
    pub object: CatalogObject,
    /// Target ref row; `object_ref.hash` must equal `object.hash`.
    pub object_ref: ObjectRef,
    /// References to add on related rows (e.g. a new dependency's inbound
    /// list gains the target path).
    pub add_back_refs: Vec<BackRefUpdate>,
    /// References to remove from related rows.
    pub remove_back_refs: Vec<BackRefUpdate>,
}

impl SavePlan {
    /// A plan that writes only the blob and the target ref.
    pub fn simple(directory: DirectoryId, object: CatalogObject, object_ref: ObjectRef) -> Self {
        Self {
            directory,
            object,
            object_ref,
            add_back_refs: Vec::new(),
            remove_back_refs: Vec::new(),
        }
    }
}

/// Atomic delete: remove the target ref, remove the target's name from
/// related rows, then reap the blob when the displaced hash has no
/// remaining refs.
///
/// The reap itself is the single documented non-transactional step: a reap
/// failure is logged and never rolls the delete back, because the
/// reference rows are authoritative.
#[derive(Debug, Clone)]
pub struct DeletePlan {
    /// Directory the target ref lives in.
    pub directory: DirectoryId,
    /// Storage path of the ref to delete.
    pub path: String,
    /// References to remove from related rows.
    pub remove_back_refs: Vec<BackRefUpdate>,
}
