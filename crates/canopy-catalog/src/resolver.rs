//! Hierarchical schema resolution.
//!
//! `resolve` walks the storage path from the starting directory toward the
//! root and returns the first ref whose final component equals the target
//! name; ties break toward the deepest directory (closest wins). The
//! resolver is pure with respect to the store: it only reads.
//!
//! When `hierarchical_schemas` is disabled, only the starting directory is
//! consulted and ancestors are invisible.

use canopy_store_core::paths::join_path;
use canopy_store_core::traits::ObjectStore;
use canopy_store_core::ObjectRef;
use canopy_types::{CatalogError, DirectoryId};

/// Resolve `target_name` from `start_dir`, returning the fully qualified
/// storage path and its ref.
pub async fn resolve(
    objects: &dyn ObjectStore,
    directory: DirectoryId,
    target_name: &str,
    start_dir: &str,
    hierarchical: bool,
) -> Result<Option<(String, ObjectRef)>, CatalogError> {
    if hierarchical {
        objects.find_closest(directory, target_name, start_dir).await
    } else {
        let candidate = join_path(start_dir, target_name);
        Ok(objects
            .get_ref(directory, &candidate)
            .await?
            .map(|r| (candidate, r)))
    }
}
