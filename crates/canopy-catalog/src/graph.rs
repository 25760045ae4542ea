//! Reference-graph maintenance: every save and delete path.
//!
//! Collection schemas reference parameter schemas by name; the resolved
//! dependency edges are kept symmetrically: the collection's ref row lists
//! the parameter paths it depends on, each parameter's ref row lists the
//! collection paths depending on it. Value collections hang off collection
//! schemas the same way. All writes for one save travel in a single
//! [`SavePlan`] so the graph never goes half-updated.
//!
//! Because a ref row's `references` list mixes outbound and inbound names
//! (a collection row carries both its parameter dependencies and the value
//! collections bound to it), classification at delete time uses the
//! symmetry invariant: a name is an outbound parameter edge iff the
//! parameter row points back at us.

use std::collections::BTreeSet;

use tracing::{debug, info};

use canopy_schema::{
    CollectionSchemaSpec, ObjectDocument, ParameterSchemaSpec, ResourceGroupSpec, SkillSetSpec,
    ValueCollectionSpec,
};
use canopy_store_core::paths::{is_parent_or_same, parent_dir};
use canopy_store_core::plan::{BackRefUpdate, DeletePlan, SavePlan};
use canopy_store_core::{CatalogObject, ObjectHash, ObjectRef};
use canopy_types::{CatalogError, Kind, RequestContext, SchemaMetadata};

use crate::canonical::Placement;
use crate::{resolver, CatalogService};

impl CatalogService {
    //─────────────────────────────
    //  Loading helpers
    //─────────────────────────────

    /// Load and parse the stored document behind a hash.
    pub async fn load_document(
        &self,
        ctx: &RequestContext,
        kind: Kind,
        hash: &ObjectHash,
    ) -> Result<ObjectDocument, CatalogError> {
        ctx.check_deadline()?;
        let obj = self
            .objects()
            .get_object(ctx.tenant_id, hash)
            .await?
            .ok_or_else(|| {
                CatalogError::ObjectNotFound(canopy_store_core::hash_hex(hash))
            })?;
        let raw: serde_json::Value = serde_json::from_slice(&obj.data)
            .map_err(|e| CatalogError::internal("stored object is not valid JSON", e))?;
        ObjectDocument::parse(kind, &raw)
    }

    async fn load_parameter_spec(
        &self,
        ctx: &RequestContext,
        hash: &ObjectHash,
    ) -> Result<ParameterSchemaSpec, CatalogError> {
        let doc = self.load_document(ctx, Kind::ParameterSchema, hash).await?;
        ParameterSchemaSpec::parse(&doc.spec)
    }

    async fn load_collection_spec(
        &self,
        ctx: &RequestContext,
        hash: &ObjectHash,
    ) -> Result<CollectionSchemaSpec, CatalogError> {
        let doc = self.load_document(ctx, Kind::CollectionSchema, hash).await?;
        CollectionSchemaSpec::parse(&doc.spec)
    }

    /// Fetch the stored document addressed by the request context, if any.
    pub async fn get_document(
        &self,
        ctx: &RequestContext,
        kind: Kind,
        placement: &Placement,
    ) -> Result<Option<ObjectDocument>, CatalogError> {
        let dir = placement.directories.directory_for(kind)?;
        let Some(r) = self.objects().get_ref(dir, &placement.storage_path()).await? else {
            return Ok(None);
        };
        let mut doc = self.load_document(ctx, kind, &r.hash).await?;
        // The blob carries only name and description; placement fields
        // come back from the resolved context.
        let description = doc.metadata.description.clone();
        doc.metadata = SchemaMetadata {
            description,
            ..placement.meta.clone()
        };
        Ok(Some(doc))
    }

    //─────────────────────────────
    //  Parameter schemas
    //─────────────────────────────

    /// Save a parameter schema.
    ///
    /// Re-saving a parameter whose validation changed while dependents
    /// exist is refused with `SchemaConflict` unless `ignore_spec_change`
    /// is set *and* every dependent's defaults still validate. Introducing
    /// a parameter between an ancestor of the same name and that
    /// ancestor's dependents is refused unless the remap option is on, in
    /// which case the dependents move to the closer schema inside the same
    /// transaction.
    pub async fn save_parameter_schema(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
        override_meta: Option<&SchemaMetadata>,
        ignore_spec_change: bool,
    ) -> Result<Placement, CatalogError> {
        let spec = ParameterSchemaSpec::parse(&doc.spec)?;
        let placement = self.canonicalize(ctx, doc, override_meta).await?;
        let parameters = placement.directories.parameters;
        let collections = placement.directories.collections;
        let path = placement.storage_path();
        let object = CatalogObject::new(
            Kind::ParameterSchema,
            doc.api_version.clone(),
            doc.storage_bytes()?,
        );

        ctx.check_deadline()?;
        let existing = self.objects().get_ref(parameters, &path).await?;

        let mut references: Vec<String> = Vec::new();
        let mut add_back_refs: Vec<BackRefUpdate> = Vec::new();
        let mut remove_back_refs: Vec<BackRefUpdate> = Vec::new();

        match &existing {
            Some(current) => {
                if current.hash == object.hash {
                    return Err(CatalogError::EqualToExistingObject);
                }
                // Inbound collection references survive the re-save.
                references = current.reference_names();
                if !references.is_empty() {
                    let old_spec = self.load_parameter_spec(ctx, &current.hash).await?;
                    if spec.validation_differs(&old_spec) {
                        if !ignore_spec_change {
                            return Err(CatalogError::SchemaConflict(format!(
                                "parameter {path} has {} dependent collection(s); \
                                 validation changes require ignoreSpecChange",
                                references.len()
                            )));
                        }
                        self.revalidate_dependents(
                            ctx,
                            &placement,
                            &placement.meta.name,
                            &spec,
                            &references,
                        )
                        .await?;
                    }
                }
            }
            None if self.config().hierarchical_schemas => {
                // A new path may land between an ancestor schema of the
                // same name and dependents inside this subtree.
                if let Some((ancestor_path, ancestor_ref)) = self
                    .objects()
                    .find_closest(parameters, &placement.meta.name, &placement.storage_dir())
                    .await?
                {
                    let subtree = placement.storage_dir();
                    let affected: Vec<String> = ancestor_ref
                        .reference_names()
                        .into_iter()
                        .filter(|cpath| {
                            parent_dir(cpath)
                                .map(|cd| is_parent_or_same(&subtree, cd))
                                .unwrap_or(false)
                        })
                        .collect();
                    if !affected.is_empty() {
                        if !self.config().remap_attribute_schema_references {
                            return Err(CatalogError::SchemaConflict(format!(
                                "saving {path} would shadow {ancestor_path} for {} \
                                 dependent collection(s)",
                                affected.len()
                            )));
                        }
                        self.revalidate_dependents(
                            ctx,
                            &placement,
                            &placement.meta.name,
                            &spec,
                            &affected,
                        )
                        .await?;
                        debug!(
                            from = %ancestor_path,
                            to = %path,
                            count = affected.len(),
                            "remapping dependents to the closer schema"
                        );
                        for cpath in &affected {
                            remove_back_refs.push(BackRefUpdate {
                                directory: parameters,
                                path: ancestor_path.clone(),
                                reference: cpath.clone(),
                            });
                            // The collection's outbound edge moves too.
                            remove_back_refs.push(BackRefUpdate {
                                directory: collections,
                                path: cpath.clone(),
                                reference: ancestor_path.clone(),
                            });
                            add_back_refs.push(BackRefUpdate {
                                directory: collections,
                                path: cpath.clone(),
                                reference: path.clone(),
                            });
                        }
                        references = affected;
                    }
                }
            }
            None => {}
        }

        let object_ref = ObjectRef::with_references(path.clone(), object.hash, references);
        self.objects()
            .commit_save(
                ctx.tenant_id,
                SavePlan {
                    directory: parameters,
                    object,
                    object_ref,
                    add_back_refs,
                    remove_back_refs,
                },
            )
            .await?;
        info!(%path, "saved parameter schema");
        Ok(placement)
    }

    /// Re-check every dependent collection's defaults against a changed
    /// parameter schema.
    async fn revalidate_dependents(
        &self,
        ctx: &RequestContext,
        placement: &Placement,
        param_name: &str,
        new_spec: &ParameterSchemaSpec,
        dependents: &[String],
    ) -> Result<(), CatalogError> {
        for cpath in dependents {
            ctx.check_deadline()?;
            let cref = self
                .objects()
                .get_ref(placement.directories.collections, cpath)
                .await?
                .ok_or_else(|| CatalogError::ObjectNotFound(cpath.clone()))?;
            let cspec = self.load_collection_spec(ctx, &cref.hash).await?;
            for (pname, entry) in cspec.parameters_using(param_name) {
                if let Some(default) = &entry.default {
                    new_spec.validate_value(pname, default).map_err(|e| {
                        CatalogError::SchemaConflict(format!(
                            "dependent {cpath} no longer validates: {e}"
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Delete a parameter schema; refused while inbound references exist.
    pub async fn delete_parameter_schema(
        &self,
        ctx: &RequestContext,
        placement: &Placement,
    ) -> Result<bool, CatalogError> {
        ctx.check_deadline()?;
        let parameters = placement.directories.parameters;
        let path = placement.storage_path();
        let Some(r) = self.objects().get_ref(parameters, &path).await? else {
            return Ok(false);
        };
        if !r.references.is_empty() {
            return Err(CatalogError::UnableToDeleteParameterWithReferences(format!(
                "{path} is referenced by {} collection(s)",
                r.references.len()
            )));
        }
        self.objects()
            .commit_delete(
                ctx.tenant_id,
                DeletePlan {
                    directory: parameters,
                    path: path.clone(),
                    remove_back_refs: Vec::new(),
                },
            )
            .await?;
        info!(%path, "deleted parameter schema");
        Ok(true)
    }

    //─────────────────────────────
    //  Collection schemas
    //─────────────────────────────

    /// Save a collection schema: resolve every referenced parameter,
    /// validate defaults against the resolved schemas, then write the
    /// object and the symmetric reference delta in one plan.
    pub async fn save_collection_schema(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
        override_meta: Option<&SchemaMetadata>,
    ) -> Result<Placement, CatalogError> {
        let spec = CollectionSchemaSpec::parse(&doc.spec)?;
        let placement = self.canonicalize(ctx, doc, override_meta).await?;
        let parameters = placement.directories.parameters;
        let collections = placement.directories.collections;
        let path = placement.storage_path();
        let object = CatalogObject::new(
            Kind::CollectionSchema,
            doc.api_version.clone(),
            doc.storage_bytes()?,
        );

        // Resolve dependencies and validate the defaults they carry.
        let mut new_outbound: BTreeSet<String> = BTreeSet::new();
        for schema_name in spec.referenced_schemas() {
            ctx.check_deadline()?;
            let (param_path, param_ref) = resolver::resolve(
                self.objects().as_ref(),
                parameters,
                &schema_name,
                &placement.storage_dir(),
                self.config().hierarchical_schemas,
            )
            .await?
            .ok_or_else(|| CatalogError::UnknownParameter(schema_name.clone()))?;
            let param_spec = self.load_parameter_spec(ctx, &param_ref.hash).await?;
            for (pname, entry) in spec.parameters_using(&schema_name) {
                if let Some(default) = &entry.default {
                    param_spec.validate_value(pname, default)?;
                }
            }
            new_outbound.insert(param_path);
        }

        let existing = self.objects().get_ref(collections, &path).await?;
        if let Some(current) = &existing {
            if current.hash == object.hash {
                return Err(CatalogError::EqualToExistingObject);
            }
        }
        let (old_outbound, inbound_values) = match &existing {
            Some(current) => self.classify_collection_refs(ctx, placement.directories.parameters, &path, current).await?,
            None => (Vec::new(), Vec::new()),
        };

        let old_set: BTreeSet<String> = old_outbound.into_iter().collect();
        let added: Vec<&String> = new_outbound.difference(&old_set).collect();
        let removed: Vec<&String> = old_set.difference(&new_outbound).collect();
        debug!(%path, added = added.len(), removed = removed.len(), "collection reference delta");

        let add_back_refs = added
            .iter()
            .map(|p| BackRefUpdate {
                directory: parameters,
                path: (*p).clone(),
                reference: path.clone(),
            })
            .collect();
        let remove_back_refs = removed
            .iter()
            .map(|p| BackRefUpdate {
                directory: parameters,
                path: (*p).clone(),
                reference: path.clone(),
            })
            .collect();

        // The row keeps outbound parameter edges plus the value
        // collections already bound to it.
        let mut references: Vec<String> = new_outbound.into_iter().collect();
        references.extend(inbound_values);
        let object_ref = ObjectRef::with_references(path.clone(), object.hash, references);

        self.objects()
            .commit_save(
                ctx.tenant_id,
                SavePlan {
                    directory: collections,
                    object,
                    object_ref,
                    add_back_refs,
                    remove_back_refs,
                },
            )
            .await?;
        info!(%path, "saved collection schema");
        Ok(placement)
    }

    /// Split a collection row's references into outbound parameter edges
    /// and inbound value-collection edges, using the symmetry invariant.
    async fn classify_collection_refs(
        &self,
        ctx: &RequestContext,
        parameters: canopy_types::DirectoryId,
        collection_path: &str,
        current: &ObjectRef,
    ) -> Result<(Vec<String>, Vec<String>), CatalogError> {
        let mut outbound = Vec::new();
        let mut inbound = Vec::new();
        for name in current.reference_names() {
            ctx.check_deadline()?;
            let is_param = self
                .objects()
                .get_ref(parameters, &name)
                .await?
                .map(|r| r.has_reference(collection_path))
                .unwrap_or(false);
            if is_param {
                outbound.push(name);
            } else {
                inbound.push(name);
            }
        }
        Ok((outbound, inbound))
    }

    /// Delete a collection schema; refused while value collections are
    /// bound to it. Outbound parameter edges are cleaned up symmetrically.
    pub async fn delete_collection_schema(
        &self,
        ctx: &RequestContext,
        placement: &Placement,
    ) -> Result<bool, CatalogError> {
        ctx.check_deadline()?;
        let collections = placement.directories.collections;
        let parameters = placement.directories.parameters;
        let path = placement.storage_path();
        let Some(current) = self.objects().get_ref(collections, &path).await? else {
            return Ok(false);
        };
        let (outbound, inbound) = self
            .classify_collection_refs(ctx, parameters, &path, &current)
            .await?;
        if !inbound.is_empty() {
            return Err(CatalogError::UnableToDeleteCollectionWithReferences(format!(
                "{path} is referenced by {} value collection(s)",
                inbound.len()
            )));
        }
        let remove_back_refs = outbound
            .into_iter()
            .map(|p| BackRefUpdate {
                directory: parameters,
                path: p,
                reference: path.clone(),
            })
            .collect();
        self.objects()
            .commit_delete(
                ctx.tenant_id,
                DeletePlan {
                    directory: collections,
                    path: path.clone(),
                    remove_back_refs,
                },
            )
            .await?;
        info!(%path, "deleted collection schema");
        Ok(true)
    }

    //─────────────────────────────
    //  Value collections
    //─────────────────────────────

    /// Save a value collection. The schema binding is immutable once
    /// saved; values validate against the bound collection schema and the
    /// parameter schemas it references.
    pub async fn save_value_collection(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
        override_meta: Option<&SchemaMetadata>,
    ) -> Result<Placement, CatalogError> {
        let spec = ValueCollectionSpec::parse(&doc.spec)?;
        let placement = self.canonicalize(ctx, doc, override_meta).await?;
        let values = placement.directories.values;
        let collections = placement.directories.collections;
        let parameters = placement.directories.parameters;
        let path = placement.storage_path();
        let object = CatalogObject::new(
            Kind::ValueCollection,
            doc.api_version.clone(),
            doc.storage_bytes()?,
        );

        let (cs_path, cs_ref) = resolver::resolve(
            self.objects().as_ref(),
            collections,
            &spec.schema,
            &placement.storage_dir(),
            self.config().hierarchical_schemas,
        )
        .await?
        .ok_or_else(|| {
            CatalogError::ObjectNotFound(format!("collection schema {}", spec.schema))
        })?;
        let cs_spec = self.load_collection_spec(ctx, &cs_ref.hash).await?;

        if let Some(current) = self.objects().get_ref(values, &path).await? {
            if current.hash == object.hash {
                return Err(CatalogError::EqualToExistingObject);
            }
            let old_doc = self.load_document(ctx, Kind::ValueCollection, &current.hash).await?;
            let old_spec = ValueCollectionSpec::parse(&old_doc.spec)?;
            if old_spec.schema != spec.schema {
                return Err(CatalogError::SchemaOfCollectionNotMutable(format!(
                    "{path} is bound to {}",
                    old_spec.schema
                )));
            }
        }

        // Unknown parameters and inline-typed values check locally; values
        // for schema-referencing parameters check against the resolved
        // parameter schema, relative to the collection's own location.
        spec.validate_against(&cs_spec)?;
        let cs_dir = parent_dir(&cs_path).unwrap_or("/").to_string();
        for (name, value) in &spec.values {
            let entry = &cs_spec.parameters[name];
            if let Some(schema_name) = &entry.schema {
                ctx.check_deadline()?;
                let (_, param_ref) = resolver::resolve(
                    self.objects().as_ref(),
                    parameters,
                    schema_name,
                    &cs_dir,
                    self.config().hierarchical_schemas,
                )
                .await?
                .ok_or_else(|| CatalogError::UnknownParameter(schema_name.clone()))?;
                let param_spec = self.load_parameter_spec(ctx, &param_ref.hash).await?;
                param_spec.validate_value(name, value)?;
            }
        }

        let object_ref = ObjectRef::with_references(path.clone(), object.hash, [cs_path.clone()]);
        self.objects()
            .commit_save(
                ctx.tenant_id,
                SavePlan {
                    directory: values,
                    object,
                    object_ref,
                    add_back_refs: vec![BackRefUpdate {
                        directory: collections,
                        path: cs_path,
                        reference: path.clone(),
                    }],
                    remove_back_refs: Vec::new(),
                },
            )
            .await?;
        info!(%path, "saved value collection");
        Ok(placement)
    }

    /// Delete a value collection, releasing its hold on the collection
    /// schema.
    pub async fn delete_value_collection(
        &self,
        ctx: &RequestContext,
        placement: &Placement,
    ) -> Result<bool, CatalogError> {
        ctx.check_deadline()?;
        let values = placement.directories.values;
        let collections = placement.directories.collections;
        let path = placement.storage_path();
        let Some(current) = self.objects().get_ref(values, &path).await? else {
            return Ok(false);
        };
        let remove_back_refs = current
            .reference_names()
            .into_iter()
            .map(|cs_path| BackRefUpdate {
                directory: collections,
                path: cs_path,
                reference: path.clone(),
            })
            .collect();
        self.objects()
            .commit_delete(
                ctx.tenant_id,
                DeletePlan {
                    directory: values,
                    path: path.clone(),
                    remove_back_refs,
                },
            )
            .await?;
        info!(%path, "deleted value collection");
        Ok(true)
    }

    //─────────────────────────────
    //  Resource groups & skillsets
    //─────────────────────────────

    /// Save a resource group. Validation compiles every embedded schema
    /// and checks every value; no cross-object references are involved.
    pub async fn save_resource_group(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
        override_meta: Option<&SchemaMetadata>,
    ) -> Result<Placement, CatalogError> {
        ResourceGroupSpec::parse(&doc.spec)?;
        let placement = self.canonicalize(ctx, doc, override_meta).await?;
        self.save_plain(ctx, Kind::ResourceGroup, doc, &placement).await?;
        Ok(placement)
    }

    /// Save a skillset after structural validation.
    pub async fn save_skill_set(
        &self,
        ctx: &RequestContext,
        doc: &mut ObjectDocument,
        override_meta: Option<&SchemaMetadata>,
    ) -> Result<Placement, CatalogError> {
        SkillSetSpec::parse(&doc.spec)?;
        let placement = self.canonicalize(ctx, doc, override_meta).await?;
        self.save_plain(ctx, Kind::SkillSet, doc, &placement).await?;
        Ok(placement)
    }

    async fn save_plain(
        &self,
        ctx: &RequestContext,
        kind: Kind,
        doc: &ObjectDocument,
        placement: &Placement,
    ) -> Result<(), CatalogError> {
        let dir = placement.directories.directory_for(kind)?;
        let path = placement.storage_path();
        let object = CatalogObject::new(kind, doc.api_version.clone(), doc.storage_bytes()?);
        ctx.check_deadline()?;
        if let Some(current) = self.objects().get_ref(dir, &path).await? {
            if current.hash == object.hash {
                return Err(CatalogError::EqualToExistingObject);
            }
        }
        let object_ref = ObjectRef::new(path.clone(), object.hash);
        self.objects()
            .commit_save(ctx.tenant_id, SavePlan::simple(dir, object, object_ref))
            .await?;
        info!(%path, %kind, "saved object");
        Ok(())
    }

    /// Delete a resource group or skillset; no reference bookkeeping.
    pub async fn delete_plain(
        &self,
        ctx: &RequestContext,
        kind: Kind,
        placement: &Placement,
    ) -> Result<bool, CatalogError> {
        ctx.check_deadline()?;
        let dir = placement.directories.directory_for(kind)?;
        let path = placement.storage_path();
        if self.objects().get_ref(dir, &path).await?.is_none() {
            return Ok(false);
        }
        self.objects()
            .commit_delete(
                ctx.tenant_id,
                DeletePlan {
                    directory: dir,
                    path: path.clone(),
                    remove_back_refs: Vec::new(),
                },
            )
            .await?;
        info!(%path, %kind, "deleted object");
        Ok(true)
    }
}
