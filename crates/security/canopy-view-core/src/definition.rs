//! Wire model of a view: scope plus intent/actions/targets rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use canopy_types::metadata::validate_name;
use canopy_types::CatalogError;

use crate::evaluator::ViewRuleSet;

/// Whether a rule grants or revokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    /// The rule grants its actions on its targets.
    Allow,
    /// The rule revokes its actions on its targets; deny overrides allow.
    Deny,
}

/// The hierarchy slice a view applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ViewScope {
    /// Catalog the view is scoped to.
    pub catalog: String,
    /// Optional variant narrowing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Optional namespace narrowing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One rule: `(intent, actions, targets)` in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewRule {
    /// Allow or Deny.
    pub intent: Intent,
    /// Action strings (`variant.list`, `catalog.admin`, …).
    pub actions: Vec<String>,
    /// Target URI strings.
    pub targets: Vec<String>,
}

/// A complete view definition as it travels over the wire and sits in the
/// `views.rules` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewDefinition {
    /// Scope of the view.
    pub scope: ViewScope,
    /// Ordered rules.
    #[serde(default)]
    pub rules: Vec<ViewRule>,
}

impl ViewDefinition {
    /// Parse and validate a raw JSON definition. Validation compiles every
    /// action and target so malformed rules never reach persistence.
    pub fn parse(raw: &Value) -> Result<Self, CatalogError> {
        let def: ViewDefinition = serde_json::from_value(raw.clone())
            .map_err(|e| CatalogError::InvalidSchema(format!("view definition: {e}")))?;
        validate_name(&def.scope.catalog)?;
        if let Some(v) = &def.scope.variant {
            validate_name(v)?;
        }
        if let Some(ns) = &def.scope.namespace {
            validate_name(ns)?;
        }
        def.compile()?;
        Ok(def)
    }

    /// Compile the rules for evaluation, deduplicating within each rule.
    pub fn compile(&self) -> Result<ViewRuleSet, CatalogError> {
        ViewRuleSet::compile(&self.rules)
    }

    /// The definition as a JSON value, the shape the view store persists.
    pub fn to_value(&self) -> Result<Value, CatalogError> {
        serde_json::to_value(self)
            .map_err(|e| CatalogError::internal("failed to serialize view definition", e))
    }
}
