//! Rule evaluation: `is_action_allowed(action, target)`.
//!
//! Evaluation runs three passes over a compiled rule set:
//!
//! 1. **Direct**: an `Allow` rule carrying the action literally, with a
//!    rule-target matching the target exactly (wildcards allowed).
//! 2. **Admin expansion**: an `Allow` rule carrying an admin action whose
//!    level equals the deepest key of a rule-target that is parent-or-same
//!    of the target grants every non-admin action at or below that level.
//! 3. **Deny**: any `Deny` rule matching by the same predicates forces the
//!    result to `false`, regardless of allows.
//!
//! An empty rule set denies everything.

use tracing::trace;

use crate::action::Action;
use crate::definition::{Intent, ViewRule};
use crate::target::TargetUri;
use canopy_types::CatalogError;

/// One rule compiled to typed actions and targets, deduplicated in
/// insertion order.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Allow or Deny.
    pub intent: Intent,
    /// Deduplicated actions.
    pub actions: Vec<Action>,
    /// Deduplicated targets.
    pub targets: Vec<TargetUri>,
}

impl CompiledRule {
    fn compile(rule: &ViewRule) -> Result<Self, CatalogError> {
        let mut actions: Vec<Action> = Vec::with_capacity(rule.actions.len());
        for raw in &rule.actions {
            let action = Action::parse(raw)?;
            if !actions.contains(&action) {
                actions.push(action);
            }
        }
        let mut targets: Vec<TargetUri> = Vec::with_capacity(rule.targets.len());
        for raw in &rule.targets {
            let target = TargetUri::parse(raw)?;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(CompiledRule {
            intent: rule.intent,
            actions,
            targets,
        })
    }

    /// Whether this rule matches `(action, target)` directly or through
    /// admin expansion.
    pub fn matches(&self, action: Action, target: &TargetUri) -> bool {
        // Direct pass: literal action, exact target.
        if self.actions.contains(&action)
            && self.targets.iter().any(|rt| rt.matches_exact(target))
        {
            return true;
        }
        // Admin expansion: only non-admin actions are granted this way.
        if action.is_admin() {
            return false;
        }
        self.actions.iter().filter(|a| a.is_admin()).any(|admin| {
            admin.level.covers(action.level)
                && self.targets.iter().any(|rt| {
                    rt.deepest_level() == admin.level && rt.is_parent_or_same_of(target)
                })
        })
    }
}

/// A compiled view: the unit `is_action_allowed` evaluates against.
#[derive(Debug, Clone, Default)]
pub struct ViewRuleSet {
    rules: Vec<CompiledRule>,
}

impl ViewRuleSet {
    /// Compile wire-form rules, deduplicating actions and targets within
    /// each rule while preserving insertion order.
    pub fn compile(rules: &[ViewRule]) -> Result<Self, CatalogError> {
        let compiled = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ViewRuleSet { rules: compiled })
    }

    /// The compiled rules.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Evaluate one `(action, target)` pair. Deny overrides allow; an
    /// empty rule set denies.
    pub fn is_action_allowed(&self, action: Action, target: &TargetUri) -> bool {
        let allowed = self
            .rules
            .iter()
            .filter(|r| r.intent == Intent::Allow)
            .any(|r| r.matches(action, target));
        if !allowed {
            trace!(%action, %target, "no allow rule matched");
            return false;
        }
        let denied = self
            .rules
            .iter()
            .filter(|r| r.intent == Intent::Deny)
            .any(|r| r.matches(action, target));
        if denied {
            trace!(%action, %target, "deny rule overrides allow");
        }
        !denied
    }

    /// String-typed convenience wrapper; parse failures surface as errors
    /// rather than silent denies.
    pub fn allows(&self, action: &str, target: &str) -> Result<bool, CatalogError> {
        let action = Action::parse(action)?;
        let target = TargetUri::parse(target)?;
        Ok(self.is_action_allowed(action, &target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ViewRule;

    fn rule(intent: Intent, actions: &[&str], targets: &[&str]) -> ViewRule {
        ViewRule {
            intent,
            actions: actions.iter().map(|s| s.to_string()).collect(),
            targets: targets.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn ruleset(rules: &[ViewRule]) -> ViewRuleSet {
        ViewRuleSet::compile(rules).unwrap()
    }

    #[test]
    fn empty_rule_set_denies() {
        let rs = ViewRuleSet::default();
        assert!(!rs.allows("catalog.list", "res://catalogs/c").unwrap());
    }

    #[test]
    fn direct_allow() {
        let rs = ruleset(&[rule(
            Intent::Allow,
            &["variant.list"],
            &["res://catalogs/c/variants/v"],
        )]);
        assert!(rs.allows("variant.list", "res://catalogs/c/variants/v").unwrap());
        assert!(!rs.allows("variant.list", "res://catalogs/c/variants/w").unwrap());
        assert!(!rs.allows("variant.delete", "res://catalogs/c/variants/v").unwrap());
    }

    #[test]
    fn deny_overrides_allow() {
        // Scenario from the service contract: variant.admin over all
        // variants, variant.list denied on one of them.
        let rs = ruleset(&[
            rule(Intent::Allow, &["variant.admin"], &["res://catalogs/c/variants/*"]),
            rule(
                Intent::Deny,
                &["variant.list"],
                &["res://catalogs/c/variants/blocked"],
            ),
        ]);
        assert!(!rs
            .allows("variant.list", "res://catalogs/c/variants/blocked")
            .unwrap());
        assert!(rs
            .allows("variant.list", "res://catalogs/c/variants/other")
            .unwrap());
    }

    #[test]
    fn admin_implies_non_admin_at_and_below() {
        let rs = ruleset(&[rule(
            Intent::Allow,
            &["catalog.admin"],
            &["res://catalogs/c"],
        )]);
        assert!(rs.allows("catalog.list", "res://catalogs/c").unwrap());
        assert!(rs.allows("variant.delete", "res://catalogs/c/variants/v").unwrap());
        assert!(rs
            .allows("namespace.read", "res://catalogs/c/variants/v/namespaces/n")
            .unwrap());
        // Admin actions are never minted by expansion.
        assert!(!rs.allows("variant.admin", "res://catalogs/c/variants/v").unwrap());
        // Other catalogs stay closed.
        assert!(!rs.allows("catalog.list", "res://catalogs/other").unwrap());
    }

    #[test]
    fn admin_level_must_match_rule_target_depth() {
        // variant.admin attached to a catalog-depth target expands nothing.
        let rs = ruleset(&[rule(
            Intent::Allow,
            &["variant.admin"],
            &["res://catalogs/c"],
        )]);
        assert!(!rs.allows("variant.list", "res://catalogs/c/variants/v").unwrap());
        // The literal action still matches exactly at the right depth.
        let rs = ruleset(&[rule(
            Intent::Allow,
            &["variant.admin"],
            &["res://catalogs/c/variants/v"],
        )]);
        assert!(rs.allows("variant.admin", "res://catalogs/c/variants/v").unwrap());
        assert!(rs.allows("variant.list", "res://catalogs/c/variants/v").unwrap());
        assert!(rs
            .allows(
                "workspace.update",
                "res://catalogs/c/variants/v/workspaces/w"
            )
            .unwrap());
        assert!(!rs.allows("catalog.list", "res://catalogs/c").unwrap());
    }

    #[test]
    fn wildcard_prefix_matches() {
        let rs = ruleset(&[rule(
            Intent::Allow,
            &["variant.list"],
            &["res://catalogs/*/variants/v"],
        )]);
        assert!(rs.allows("variant.list", "res://catalogs/c/variants/v").unwrap());
        assert!(rs.allows("variant.list", "res://catalogs/d/variants/v").unwrap());
        assert!(!rs.allows("variant.list", "res://catalogs/c/variants/x").unwrap());
    }

    #[test]
    fn deny_through_admin_expansion() {
        let rs = ruleset(&[
            rule(Intent::Allow, &["variant.list"], &["res://catalogs/c/variants/v"]),
            rule(Intent::Deny, &["variant.admin"], &["res://catalogs/c/variants/v"]),
        ]);
        // The deny's admin expansion covers variant.list on that target.
        assert!(!rs.allows("variant.list", "res://catalogs/c/variants/v").unwrap());
    }

    #[test]
    fn dedup_preserves_first_occurrence() {
        let compiled = ViewRuleSet::compile(&[rule(
            Intent::Allow,
            &["variant.list", "variant.read", "variant.list"],
            &[
                "res://catalogs/c/variants/v",
                "res://catalogs/c/variants/v",
            ],
        )])
        .unwrap();
        let r = &compiled.rules()[0];
        assert_eq!(r.actions.len(), 2);
        assert_eq!(r.actions[0].to_string(), "variant.list");
        assert_eq!(r.targets.len(), 1);
    }

    #[test]
    fn malformed_input_is_an_error_not_a_deny() {
        let rs = ViewRuleSet::default();
        assert!(rs.allows("bogus", "res://catalogs/c").is_err());
        assert!(rs.allows("catalog.list", "http://x").is_err());
    }
}
