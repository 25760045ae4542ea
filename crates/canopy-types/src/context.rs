//! Per-request context.
//!
//! Each worker task carries one [`RequestContext`] providing tenant, project
//! and placement identity plus an optional deadline. Every database call
//! checks the deadline first; exceeded deadlines abort the operation before
//! any partial write outside a transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::CatalogError;
use crate::{ProjectId, TenantId, WorkspaceId};

/// Identity and scope for a single in-flight request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning project within the tenant.
    pub project_id: ProjectId,
    /// Catalog name addressed by the request, when any.
    pub catalog: Option<String>,
    /// Variant name addressed by the request, when any.
    pub variant: Option<String>,
    /// Namespace addressed by the request, when any.
    pub namespace: Option<String>,
    /// Workspace addressed by the request; wins over variant directories.
    pub workspace: Option<WorkspaceId>,
    /// Object name from the request path, when any.
    pub object_name: Option<String>,
    /// Object placement path from the request, when any.
    pub object_path: Option<String>,
    /// Parsed query parameters.
    pub query: HashMap<String, String>,
    /// Absolute deadline for the request.
    pub deadline: Option<DateTime<Utc>>,
}

impl RequestContext {
    /// A context carrying only tenant and project identity.
    pub fn new(tenant_id: TenantId, project_id: ProjectId) -> Self {
        Self {
            tenant_id,
            project_id,
            catalog: None,
            variant: None,
            namespace: None,
            workspace: None,
            object_name: None,
            object_path: None,
            query: HashMap::new(),
            deadline: None,
        }
    }

    /// Scope the context to a catalog.
    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Scope the context to a variant.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Scope the context to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Scope the context to a workspace overlay.
    pub fn with_workspace(mut self, workspace: WorkspaceId) -> Self {
        self.workspace = Some(workspace);
        self
    }

    /// Attach an absolute deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Truthy query parameter lookup (`?force=true` style flags).
    pub fn query_flag(&self, key: &str) -> bool {
        matches!(
            self.query.get(key).map(String::as_str),
            Some("true") | Some("1") | Some("yes")
        )
    }

    /// Abort with a timeout error once the deadline has passed.
    pub fn check_deadline(&self) -> Result<(), CatalogError> {
        match self.deadline {
            Some(d) if Utc::now() >= d => Err(CatalogError::timed_out()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn deadline_enforcement() {
        let ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(ctx.check_deadline().is_ok());

        let past = ctx.clone().with_deadline(Utc::now() - Duration::seconds(1));
        assert!(past.check_deadline().is_err());

        let future = ctx.with_deadline(Utc::now() + Duration::seconds(60));
        assert!(future.check_deadline().is_ok());
    }

    #[test]
    fn query_flags() {
        let mut ctx = RequestContext::new(Uuid::new_v4(), Uuid::new_v4());
        ctx.query.insert("ignoreSpecChange".to_string(), "true".to_string());
        assert!(ctx.query_flag("ignoreSpecChange"));
        assert!(!ctx.query_flag("missing"));
    }
}
