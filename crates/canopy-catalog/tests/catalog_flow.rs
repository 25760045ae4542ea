//! End-to-end catalog flows over the in-memory driver: reference
//! symmetry, delete-safety, hash deduplication, schema immutability and
//! closest-ancestor resolution.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use canopy_catalog::CatalogService;
use canopy_schema::ObjectDocument;
use canopy_store_core::records::{CatalogRecord, NamespaceRecord, VariantRecord};
use canopy_store_core::traits::{IdentityStore, ObjectStore};
use canopy_store_memory::MemoryStore;
use canopy_types::{CanopyConfig, CatalogError, Kind, RequestContext};

struct Env {
    store: Arc<MemoryStore>,
    service: CatalogService,
    ctx: RequestContext,
}

async fn env_with(config: CanopyConfig) -> Env {
    let store = Arc::new(MemoryStore::new());
    let tenant = Uuid::new_v4();
    let project = Uuid::new_v4();
    let catalog = CatalogRecord {
        catalog_id: Uuid::new_v4(),
        project_id: project,
        tenant_id: tenant,
        name: "prod".to_string(),
        description: String::new(),
        info: json!({}),
    };
    store.create_catalog(&catalog).await.unwrap();
    store
        .create_variant(&VariantRecord::new(catalog.catalog_id, "default"))
        .await
        .unwrap();
    let variant = store
        .get_variant(catalog.catalog_id, "default")
        .await
        .unwrap()
        .unwrap();
    for ns in ["ns1", "ns2"] {
        store
            .create_namespace(&NamespaceRecord {
                name: ns.to_string(),
                variant_id: variant.variant_id,
                description: String::new(),
            })
            .await
            .unwrap();
    }
    let service = CatalogService::new(store.clone(), store.clone(), config);
    let ctx = RequestContext::new(tenant, project).with_catalog("prod");
    Env {
        store,
        service,
        ctx,
    }
}

async fn env() -> Env {
    env_with(CanopyConfig::default()).await
}

fn param_doc(name: &str, path: &str, min: i64, max: i64, default: i64) -> ObjectDocument {
    ObjectDocument::parse(
        Kind::ParameterSchema,
        &json!({
            "kind": "ParameterSchema",
            "metadata": {"name": name, "catalog": "prod", "path": path},
            "spec": {
                "dataType": "Integer",
                "validation": {"minValue": min, "maxValue": max},
                "default": default
            }
        }),
    )
    .unwrap()
}

fn collection_doc(name: &str, path: &str, schema: &str, default: i64) -> ObjectDocument {
    ObjectDocument::parse(
        Kind::CollectionSchema,
        &json!({
            "kind": "CollectionSchema",
            "metadata": {"name": name, "catalog": "prod", "path": path},
            "spec": {
                "parameters": {
                    "threads": {"schema": schema, "default": default}
                }
            }
        }),
    )
    .unwrap()
}

fn value_doc(name: &str, path: &str, schema: &str, value: i64) -> ObjectDocument {
    ObjectDocument::parse(
        Kind::ValueCollection,
        &json!({
            "kind": "ValueCollection",
            "metadata": {"name": name, "catalog": "prod", "path": path},
            "spec": {
                "schema": schema,
                "values": {"threads": value}
            }
        }),
    )
    .unwrap()
}

#[tokio::test]
async fn reference_symmetry_and_delete_safety() {
    let e = env().await;

    // Save int-param: Integer[1..10] default 5, then cs1 referring to it
    // with default 8.
    let mut param = param_doc("int-param", "/", 1, 10, 5);
    let p_placement = e
        .service
        .save_parameter_schema(&e.ctx, &mut param, None, false)
        .await
        .unwrap();

    let mut coll = collection_doc("cs1", "/", "int-param", 8);
    let c_placement = e
        .service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap();

    // Symmetric edges exist.
    let p_ref = e
        .store
        .get_ref(p_placement.directories.parameters, "/int-param")
        .await
        .unwrap()
        .unwrap();
    assert!(p_ref.has_reference("/cs1"));
    let c_ref = e
        .store
        .get_ref(c_placement.directories.collections, "/cs1")
        .await
        .unwrap()
        .unwrap();
    assert!(c_ref.has_reference("/int-param"));

    // Deleting the parameter while referenced is refused and changes
    // nothing.
    let err = e
        .service
        .delete_parameter_schema(&e.ctx, &p_placement)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::UnableToDeleteParameterWithReferences(_)
    ));
    assert!(e
        .store
        .get_ref(p_placement.directories.parameters, "/int-param")
        .await
        .unwrap()
        .is_some());

    // Delete the collection first, then the parameter goes through.
    assert!(e
        .service
        .delete_collection_schema(&e.ctx, &c_placement)
        .await
        .unwrap());
    let p_ref = e
        .store
        .get_ref(p_placement.directories.parameters, "/int-param")
        .await
        .unwrap()
        .unwrap();
    assert!(p_ref.references.is_empty());
    assert!(e
        .service
        .delete_parameter_schema(&e.ctx, &p_placement)
        .await
        .unwrap());

    // Idempotent second delete.
    assert!(!e
        .service
        .delete_parameter_schema(&e.ctx, &p_placement)
        .await
        .unwrap());
}

#[tokio::test]
async fn collection_defaults_validate_against_resolved_parameter() {
    let e = env().await;
    let mut param = param_doc("int-param", "/", 1, 10, 5);
    e.service
        .save_parameter_schema(&e.ctx, &mut param, None, false)
        .await
        .unwrap();

    // Default 42 falls outside [1, 10].
    let mut coll = collection_doc("cs1", "/", "int-param", 42);
    let err = e
        .service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ValueAboveMax(_)));

    // Unknown parameter names fail typed.
    let mut coll = collection_doc("cs2", "/", "missing-param", 3);
    let err = e
        .service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownParameter(_)));
}

#[tokio::test]
async fn hash_deduplication_across_namespaces() {
    let e = env().await;

    // The same parameter JSON saved under two namespaces: two refs, one
    // blob.
    for ns in ["ns1", "ns2"] {
        let mut doc = ObjectDocument::parse(
            Kind::ParameterSchema,
            &json!({
                "kind": "ParameterSchema",
                "metadata": {"name": "shared", "catalog": "prod", "namespace": ns},
                "spec": {"dataType": "String"}
            }),
        )
        .unwrap();
        e.service
            .save_parameter_schema(&e.ctx, &mut doc, None, false)
            .await
            .unwrap();
    }
    assert_eq!(e.store.object_count().await, 1);
    assert_eq!(e.store.ref_count().await, 2);

    // Deleting one path leaves the other resolvable and the blob alive.
    let mut doc = ObjectDocument::parse(
        Kind::ParameterSchema,
        &json!({
            "kind": "ParameterSchema",
            "metadata": {"name": "shared", "catalog": "prod", "namespace": "ns1"},
            "spec": {"dataType": "String"}
        }),
    )
    .unwrap();
    let placement = e.service.canonicalize(&e.ctx, &mut doc, None).await.unwrap();
    assert!(e
        .service
        .delete_parameter_schema(&e.ctx, &placement)
        .await
        .unwrap());
    assert_eq!(e.store.object_count().await, 1);
    assert_eq!(e.store.ref_count().await, 1);

    let surviving = e
        .store
        .get_ref(placement.directories.parameters, "/ns2/shared")
        .await
        .unwrap()
        .unwrap();
    assert!(e
        .store
        .get_object(e.ctx.tenant_id, &surviving.hash)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn value_collection_schema_binding_is_immutable() {
    let e = env().await;
    let mut param = param_doc("int-param", "/", 1, 100, 5);
    e.service
        .save_parameter_schema(&e.ctx, &mut param, None, false)
        .await
        .unwrap();
    for cs in ["cs-a", "cs-b"] {
        let mut coll = collection_doc(cs, "/", "int-param", 8);
        e.service
            .save_collection_schema(&e.ctx, &mut coll, None)
            .await
            .unwrap();
    }

    let mut val = value_doc("c", "/", "cs-a", 9);
    let v_placement = e
        .service
        .save_value_collection(&e.ctx, &mut val, None)
        .await
        .unwrap();

    // Re-binding to cs-b is refused.
    let mut rebound = value_doc("c", "/", "cs-b", 9);
    let err = e
        .service
        .save_value_collection(&e.ctx, &mut rebound, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SchemaOfCollectionNotMutable(_)));

    // The bound collection schema cannot be deleted while the value
    // collection exists.
    let mut cs_a = collection_doc("cs-a", "/", "int-param", 8);
    let cs_placement = e.service.canonicalize(&e.ctx, &mut cs_a, None).await.unwrap();
    let err = e
        .service
        .delete_collection_schema(&e.ctx, &cs_placement)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CatalogError::UnableToDeleteCollectionWithReferences(_)
    ));

    // Value values validate against the resolved parameter schema.
    let mut bad = value_doc("c2", "/", "cs-a", 500);
    let err = e
        .service
        .save_value_collection(&e.ctx, &mut bad, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ValueAboveMax(_)));

    // Deleting the value collection releases the schema.
    assert!(e
        .service
        .delete_value_collection(&e.ctx, &v_placement)
        .await
        .unwrap());
    assert!(e
        .service
        .delete_collection_schema(&e.ctx, &cs_placement)
        .await
        .unwrap());
}

#[tokio::test]
async fn closest_ancestor_wins_for_collection_references() {
    let e = env().await;

    // Same-named parameter at /a (wide bounds) and /a/b (tight bounds).
    let mut wide = param_doc("n", "/a", 1, 100, 50);
    e.service
        .save_parameter_schema(&e.ctx, &mut wide, None, false)
        .await
        .unwrap();
    let mut tight = param_doc("n", "/a/b", 1, 10, 5);
    e.service
        .save_parameter_schema(&e.ctx, &mut tight, None, false)
        .await
        .unwrap();

    // A collection at /a/b/c resolves the /a/b schema: default 50 is out
    // of its range.
    let mut coll = collection_doc("cs1", "/a/b/c", "n", 50);
    let err = e
        .service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::ValueAboveMax(_)));

    // Remove /a/b/n; the same save now resolves /a/n and passes.
    let mut tight = param_doc("n", "/a/b", 1, 10, 5);
    let tight_placement = e.service.canonicalize(&e.ctx, &mut tight, None).await.unwrap();
    e.service
        .delete_parameter_schema(&e.ctx, &tight_placement)
        .await
        .unwrap();

    let mut coll = collection_doc("cs1", "/a/b/c", "n", 50);
    let placement = e
        .service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap();
    let c_ref = e
        .store
        .get_ref(placement.directories.collections, "/a/b/c/cs1")
        .await
        .unwrap()
        .unwrap();
    assert!(c_ref.has_reference("/a/n"));
}

#[tokio::test]
async fn parameter_validation_changes_under_dependents() {
    let e = env().await;
    let mut param = param_doc("int-param", "/", 1, 10, 5);
    e.service
        .save_parameter_schema(&e.ctx, &mut param, None, false)
        .await
        .unwrap();
    let mut coll = collection_doc("cs1", "/", "int-param", 8);
    e.service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap();

    // Narrowing the range under a live dependent is refused by default.
    let mut narrowed = param_doc("int-param", "/", 1, 6, 5);
    let err = e
        .service
        .save_parameter_schema(&e.ctx, &mut narrowed, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SchemaConflict(_)));

    // ignoreSpecChange still revalidates dependents: cs1's default 8 does
    // not fit [1, 6].
    let mut narrowed = param_doc("int-param", "/", 1, 6, 5);
    let err = e
        .service
        .save_parameter_schema(&e.ctx, &mut narrowed, None, true)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SchemaConflict(_)));

    // A widening change passes with the flag and keeps inbound refs.
    let mut widened = param_doc("int-param", "/", 1, 20, 5);
    let placement = e
        .service
        .save_parameter_schema(&e.ctx, &mut widened, None, true)
        .await
        .unwrap();
    let p_ref = e
        .store
        .get_ref(placement.directories.parameters, "/int-param")
        .await
        .unwrap()
        .unwrap();
    assert!(p_ref.has_reference("/cs1"));
}

#[tokio::test]
async fn shadowing_rejects_by_default_and_remaps_behind_the_flag() {
    // Default configuration: introducing /a/b/n between /a/n and its
    // dependent at /a/b/c is a conflict.
    let e = env().await;
    let mut root = param_doc("n", "/a", 1, 100, 50);
    e.service
        .save_parameter_schema(&e.ctx, &mut root, None, false)
        .await
        .unwrap();
    let mut coll = collection_doc("cs1", "/a/b/c", "n", 50);
    e.service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap();

    let mut between = param_doc("n", "/a/b", 1, 100, 50);
    let err = e
        .service
        .save_parameter_schema(&e.ctx, &mut between, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SchemaConflict(_)));

    // With remap enabled the dependent moves to the closer schema in one
    // step, symmetric on both rows.
    let e = env_with(CanopyConfig {
        remap_attribute_schema_references: true,
        ..CanopyConfig::default()
    })
    .await;
    let mut root = param_doc("n", "/a", 1, 100, 50);
    let root_placement = e
        .service
        .save_parameter_schema(&e.ctx, &mut root, None, false)
        .await
        .unwrap();
    let mut coll = collection_doc("cs1", "/a/b/c", "n", 50);
    e.service
        .save_collection_schema(&e.ctx, &mut coll, None)
        .await
        .unwrap();

    let mut between = param_doc("n", "/a/b", 1, 100, 50);
    let between_placement = e
        .service
        .save_parameter_schema(&e.ctx, &mut between, None, false)
        .await
        .unwrap();

    let new_ref = e
        .store
        .get_ref(between_placement.directories.parameters, "/a/b/n")
        .await
        .unwrap()
        .unwrap();
    assert!(new_ref.has_reference("/a/b/c/cs1"));
    let old_ref = e
        .store
        .get_ref(root_placement.directories.parameters, "/a/n")
        .await
        .unwrap()
        .unwrap();
    assert!(!old_ref.has_reference("/a/b/c/cs1"));
    let c_ref = e
        .store
        .get_ref(between_placement.directories.collections, "/a/b/c/cs1")
        .await
        .unwrap()
        .unwrap();
    assert!(c_ref.has_reference("/a/b/n"));
    assert!(!c_ref.has_reference("/a/n"));

    // A remap that would break a dependent default is refused even with
    // the flag on.
    let mut tight = param_doc("n", "/a/b/c", 1, 10, 5);
    let err = e
        .service
        .save_parameter_schema(&e.ctx, &mut tight, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::SchemaConflict(_)));
}

#[tokio::test]
async fn identical_resaves_conflict() {
    let e = env().await;
    let mut param = param_doc("int-param", "/", 1, 10, 5);
    e.service
        .save_parameter_schema(&e.ctx, &mut param, None, false)
        .await
        .unwrap();
    let mut same = param_doc("int-param", "/", 1, 10, 5);
    let err = e
        .service
        .save_parameter_schema(&e.ctx, &mut same, None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::EqualToExistingObject));
    assert_eq!(err.http_status(), 409);
}

#[tokio::test]
async fn resource_groups_and_skillsets_round_trip() {
    let e = env().await;
    let mut rg = ObjectDocument::parse(
        Kind::ResourceGroup,
        &json!({
            "kind": "ResourceGroup",
            "metadata": {"name": "limits", "catalog": "prod"},
            "spec": {
                "resources": {
                    "cpu": {"schema": {"type": "integer", "minimum": 1}, "value": 4}
                }
            }
        }),
    )
    .unwrap();
    let rg_placement = e
        .service
        .save_resource_group(&e.ctx, &mut rg, None)
        .await
        .unwrap();
    let loaded = e
        .service
        .get_document(&e.ctx, Kind::ResourceGroup, &rg_placement)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.spec["resources"]["cpu"]["value"], 4);

    let mut ss = ObjectDocument::parse(
        Kind::SkillSet,
        &json!({
            "kind": "SkillSet",
            "metadata": {"name": "ops", "catalog": "prod"},
            "spec": {
                "skills": {
                    "deploy": {"source": "oci://skills/deploy:1", "capabilities": ["net"]}
                }
            }
        }),
    )
    .unwrap();
    let ss_placement = e.service.save_skill_set(&e.ctx, &mut ss, None).await.unwrap();
    assert!(e
        .service
        .delete_plain(&e.ctx, Kind::SkillSet, &ss_placement)
        .await
        .unwrap());
    assert!(e
        .service
        .delete_plain(&e.ctx, Kind::ResourceGroup, &rg_placement)
        .await
        .unwrap());
    // Plain deletes are idempotent.
    assert!(!e
        .service
        .delete_plain(&e.ctx, Kind::ResourceGroup, &rg_placement)
        .await
        .unwrap());
}
