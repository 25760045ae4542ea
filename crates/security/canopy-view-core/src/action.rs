//! Actions: `<level>.<op>` strings over the catalog hierarchy.
//!
//! Admin ops imply every non-admin op at or below their level; the
//! workspace and namespace axes are siblings, so neither implies the
//! other.

use serde::{Deserialize, Serialize};

use canopy_types::CatalogError;

/// Hierarchy level an action or target segment addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    /// Catalog level (position 0 in target URIs).
    Catalog,
    /// Variant level (position 1).
    Variant,
    /// Workspace level (position 2, optional).
    Workspace,
    /// Namespace level (position 2 or 3, depending on workspace presence).
    Namespace,
}

impl HierarchyLevel {
    /// The `kind-key` token for this level in a target URI.
    pub fn key(&self) -> &'static str {
        match self {
            HierarchyLevel::Catalog => "catalogs",
            HierarchyLevel::Variant => "variants",
            HierarchyLevel::Workspace => "workspaces",
            HierarchyLevel::Namespace => "namespaces",
        }
    }

    /// Parse a `kind-key` token.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "catalogs" => Some(HierarchyLevel::Catalog),
            "variants" => Some(HierarchyLevel::Variant),
            "workspaces" => Some(HierarchyLevel::Workspace),
            "namespaces" => Some(HierarchyLevel::Namespace),
            _ => None,
        }
    }

    /// The action-name prefix for this level (`catalog` in `catalog.list`).
    pub fn action_prefix(&self) -> &'static str {
        match self {
            HierarchyLevel::Catalog => "catalog",
            HierarchyLevel::Variant => "variant",
            HierarchyLevel::Workspace => "workspace",
            HierarchyLevel::Namespace => "namespace",
        }
    }

    /// Whether an admin grant at `self` covers non-admin actions at
    /// `other`. Catalog covers everything, variant covers both sibling
    /// axes below it, workspace and namespace cover only themselves.
    pub fn covers(&self, other: HierarchyLevel) -> bool {
        match self {
            HierarchyLevel::Catalog => true,
            HierarchyLevel::Variant => other != HierarchyLevel::Catalog,
            HierarchyLevel::Workspace => other == HierarchyLevel::Workspace,
            HierarchyLevel::Namespace => other == HierarchyLevel::Namespace,
        }
    }
}

/// Operation half of an action string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOp {
    /// Enumerate children.
    List,
    /// Read a single object.
    Read,
    /// Create a new object.
    Create,
    /// Update an existing object.
    Update,
    /// Delete an object.
    Delete,
    /// Implies every non-admin op at or below the level.
    Admin,
}

impl ActionOp {
    fn as_str(&self) -> &'static str {
        match self {
            ActionOp::List => "list",
            ActionOp::Read => "read",
            ActionOp::Create => "create",
            ActionOp::Update => "update",
            ActionOp::Delete => "delete",
            ActionOp::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "list" => Some(ActionOp::List),
            "read" => Some(ActionOp::Read),
            "create" => Some(ActionOp::Create),
            "update" => Some(ActionOp::Update),
            "delete" => Some(ActionOp::Delete),
            "admin" => Some(ActionOp::Admin),
            _ => None,
        }
    }
}

/// A parsed action such as `variant.list` or `catalog.admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    /// Hierarchy level the action addresses.
    pub level: HierarchyLevel,
    /// Operation performed at that level.
    pub op: ActionOp,
}

impl Action {
    /// Parse the canonical `level.op` form.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        let (level_str, op_str) = s
            .split_once('.')
            .ok_or_else(|| CatalogError::ValidationError(format!("malformed action {s:?}")))?;
        let level = match level_str {
            "catalog" => HierarchyLevel::Catalog,
            "variant" => HierarchyLevel::Variant,
            "workspace" => HierarchyLevel::Workspace,
            "namespace" => HierarchyLevel::Namespace,
            _ => {
                return Err(CatalogError::ValidationError(format!(
                    "unknown action level {level_str:?}"
                )))
            }
        };
        let op = ActionOp::parse(op_str)
            .ok_or_else(|| CatalogError::ValidationError(format!("unknown action op {op_str:?}")))?;
        Ok(Action { level, op })
    }

    /// Whether this is an admin-suffixed action.
    pub fn is_admin(&self) -> bool {
        self.op == ActionOp::Admin
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.level.action_prefix(), self.op.as_str())
    }
}
