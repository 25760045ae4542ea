//! Derived-view containment: a candidate view must be strictly contained
//! in its parent before a token can be minted against it.
//!
//! Every `(action, target)` pair carried by the child's `Allow` rules must
//! be allowed by the parent, admin expansion included. Deny rules in the
//! child are always permitted (narrowing is free). The check runs before
//! any persistence, so a refused derivation writes nothing.

use tracing::debug;

use canopy_types::CatalogError;

use crate::definition::{Intent, ViewDefinition};

/// Validate that `child` is contained in `parent`.
pub fn validate_derived(
    parent: &ViewDefinition,
    child: &ViewDefinition,
) -> Result<(), CatalogError> {
    validate_scope(parent, child)?;

    let parent_rules = parent.compile()?;
    let child_rules = child.compile()?;

    for rule in child_rules.rules().iter().filter(|r| r.intent == Intent::Allow) {
        for action in &rule.actions {
            for target in &rule.targets {
                if !parent_rules.is_action_allowed(*action, target) {
                    debug!(%action, %target, "derived view exceeds parent grant");
                    return Err(CatalogError::UnableToCreateView(format!(
                        "derived view requests {action} on {target}, which the parent does not allow"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Scope containment: same catalog; variant and namespace equal to or a
/// narrowing of the parent's (a child may pin a field the parent leaves
/// open, never widen one the parent pins).
fn validate_scope(parent: &ViewDefinition, child: &ViewDefinition) -> Result<(), CatalogError> {
    if parent.scope.catalog != child.scope.catalog {
        return Err(CatalogError::UnableToCreateView(format!(
            "derived view catalog {:?} differs from parent catalog {:?}",
            child.scope.catalog, parent.scope.catalog
        )));
    }
    check_narrowing("variant", &parent.scope.variant, &child.scope.variant)?;
    check_narrowing("namespace", &parent.scope.namespace, &child.scope.namespace)?;
    Ok(())
}

fn check_narrowing(
    field: &str,
    parent: &Option<String>,
    child: &Option<String>,
) -> Result<(), CatalogError> {
    match (parent, child) {
        (None, _) => Ok(()),
        (Some(p), Some(c)) if p == c => Ok(()),
        (Some(p), _) => Err(CatalogError::UnableToCreateView(format!(
            "derived view widens {field} scope beyond parent {p:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(value: serde_json::Value) -> ViewDefinition {
        ViewDefinition::parse(&value).unwrap()
    }

    fn parent_with(actions: &[&str], target: &str) -> ViewDefinition {
        def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Allow", "actions": actions, "targets": [target]}
            ]
        }))
    }

    #[test]
    fn contained_child_passes() {
        let parent = parent_with(&["catalog.list", "variant.list"], "res://catalogs/tc");
        let child = def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Allow", "actions": ["catalog.list"], "targets": ["res://catalogs/tc"]}
            ]
        }));
        assert!(validate_derived(&parent, &child).is_ok());
    }

    #[test]
    fn exceeding_child_is_refused() {
        // Parent only lists; child wants admin.
        let parent = parent_with(&["catalog.list"], "res://catalogs/tc");
        let child = def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Allow", "actions": ["catalog.admin"], "targets": ["res://catalogs/tc"]}
            ]
        }));
        let err = validate_derived(&parent, &child).unwrap_err();
        assert!(matches!(err, CatalogError::UnableToCreateView(_)));
    }

    #[test]
    fn child_denies_are_free() {
        let parent = parent_with(&["catalog.list"], "res://catalogs/tc");
        let child = def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Deny", "actions": ["catalog.admin"],
                 "targets": ["res://catalogs/tc"]}
            ]
        }));
        assert!(validate_derived(&parent, &child).is_ok());
    }

    #[test]
    fn admin_parent_contains_non_admin_children() {
        let parent = parent_with(&["variant.admin"], "res://catalogs/tc/variants/v");
        let child = def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Allow", "actions": ["variant.list", "namespace.read"],
                 "targets": ["res://catalogs/tc/variants/v/namespaces/ns"]}
            ]
        }));
        assert!(validate_derived(&parent, &child).is_ok());

        // An admin action in the child needs a literal admin grant upstream.
        let admin_child = def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Allow", "actions": ["variant.admin"],
                 "targets": ["res://catalogs/tc/variants/v"]}
            ]
        }));
        assert!(validate_derived(&parent, &admin_child).is_ok());

        let deeper_admin = def(json!({
            "scope": {"catalog": "tc"},
            "rules": [
                {"intent": "Allow", "actions": ["workspace.admin"],
                 "targets": ["res://catalogs/tc/variants/v/workspaces/w"]}
            ]
        }));
        assert!(validate_derived(&parent, &deeper_admin).is_err());
    }

    #[test]
    fn scope_must_narrow_never_widen() {
        let parent = def(json!({
            "scope": {"catalog": "tc", "variant": "v1"}
        }));
        let same = def(json!({"scope": {"catalog": "tc", "variant": "v1"}}));
        assert!(validate_derived(&parent, &same).is_ok());

        let widened = def(json!({"scope": {"catalog": "tc"}}));
        assert!(validate_derived(&parent, &widened).is_err());

        let other_catalog = def(json!({"scope": {"catalog": "other"}}));
        assert!(validate_derived(&parent, &other_catalog).is_err());

        let open_parent = def(json!({"scope": {"catalog": "tc"}}));
        let narrowed = def(json!({"scope": {"catalog": "tc", "variant": "v9"}}));
        assert!(validate_derived(&open_parent, &narrowed).is_ok());
    }
}
