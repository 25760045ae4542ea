//! Target URIs: the structured `res://…` identifiers access-control rules
//! range over.
//!
//! Grammar:
//!
//! ```text
//! target  := "res://" prefix ("/" resource-kind "/" sub)?
//! prefix  := segment ("/" segment)*
//! segment := kind-key "/" (name | "*")
//! ```
//!
//! Positional constraints: `catalogs` at position 0, `variants` at 1,
//! `workspaces` at 2 or omitted, `namespaces` at 2 or 3 depending on
//! workspace presence; duplicate kind-keys are forbidden. `*` is permitted
//! in any single segment or as a trailing wildcard of the resource tail.

use canopy_types::metadata::validate_name;
use canopy_types::CatalogError;

use crate::action::HierarchyLevel;

/// URI scheme prefix.
pub const SCHEME: &str = "res://";

/// Wildcard token.
pub const WILDCARD: &str = "*";

/// The optional `/<resource-kind>/<sub>` tail of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTail {
    /// Resource kind segment (e.g. `collections`).
    pub kind: String,
    /// Sub-path below the kind; `*` segments and a trailing `*` allowed.
    pub path: String,
}

/// A parsed target URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUri {
    /// Structured hierarchy prefix, outermost first.
    pub segments: Vec<(HierarchyLevel, String)>,
    /// Optional resource tail.
    pub resource: Option<ResourceTail>,
}

fn validate_segment_value(value: &str) -> Result<(), CatalogError> {
    if value == WILDCARD {
        return Ok(());
    }
    validate_name(value)
}

impl TargetUri {
    /// Parse a `res://` target, enforcing the positional grammar.
    pub fn parse(raw: &str) -> Result<Self, CatalogError> {
        let rest = raw.strip_prefix(SCHEME).ok_or_else(|| {
            CatalogError::ValidationError(format!("target {raw:?} must start with {SCHEME}"))
        })?;
        let tokens: Vec<&str> = rest.split('/').collect();
        if tokens.iter().any(|t| t.is_empty()) {
            return Err(CatalogError::ValidationError(format!(
                "target {raw:?} contains empty segments"
            )));
        }

        let mut segments = Vec::new();
        let mut idx = 0;
        while idx + 1 < tokens.len() {
            let Some(level) = HierarchyLevel::from_key(tokens[idx]) else {
                break;
            };
            if segments.iter().any(|(l, _)| *l == level) {
                return Err(CatalogError::ValidationError(format!(
                    "target {raw:?} repeats kind-key {:?}",
                    tokens[idx]
                )));
            }
            let position_ok = match level {
                HierarchyLevel::Catalog => segments.is_empty(),
                HierarchyLevel::Variant => {
                    matches!(segments.last(), Some((HierarchyLevel::Catalog, _)))
                }
                HierarchyLevel::Workspace => {
                    matches!(segments.last(), Some((HierarchyLevel::Variant, _)))
                }
                HierarchyLevel::Namespace => matches!(
                    segments.last(),
                    Some((HierarchyLevel::Variant, _)) | Some((HierarchyLevel::Workspace, _))
                ),
            };
            if !position_ok {
                return Err(CatalogError::ValidationError(format!(
                    "target {raw:?}: {:?} is out of position",
                    tokens[idx]
                )));
            }
            let value = tokens[idx + 1];
            validate_segment_value(value)?;
            segments.push((level, value.to_string()));
            idx += 2;
        }
        if segments.is_empty() {
            return Err(CatalogError::ValidationError(format!(
                "target {raw:?} must address a catalog"
            )));
        }

        let resource = if idx < tokens.len() {
            let kind = tokens[idx];
            if HierarchyLevel::from_key(kind).is_some() {
                // A kind-key in tail position means the prefix grammar was
                // violated upstream (e.g. namespaces before variants).
                return Err(CatalogError::ValidationError(format!(
                    "target {raw:?}: {kind:?} is out of position"
                )));
            }
            let sub = &tokens[idx + 1..];
            if sub.is_empty() {
                return Err(CatalogError::ValidationError(format!(
                    "target {raw:?}: resource kind {kind:?} requires a sub-path"
                )));
            }
            for (i, seg) in sub.iter().enumerate() {
                if *seg == WILDCARD {
                    continue;
                }
                // Inner segments are labels; the final one may carry a
                // trailing wildcard only as a bare `*`.
                validate_name(seg).map_err(|_| {
                    CatalogError::ValidationError(format!(
                        "target {raw:?}: bad resource segment {seg:?} at {i}"
                    ))
                })?;
            }
            Some(ResourceTail {
                kind: kind.to_string(),
                path: sub.join("/"),
            })
        } else {
            None
        };

        Ok(TargetUri { segments, resource })
    }

    /// Level of the deepest structured segment.
    pub fn deepest_level(&self) -> HierarchyLevel {
        self.segments
            .last()
            .map(|(l, _)| *l)
            .expect("parser guarantees a non-empty prefix")
    }

    /// Exact structural match: identical prefix length, key-by-key and
    /// position-by-position agreement with `*` in `self` matching any
    /// single value, and tail agreement.
    pub fn matches_exact(&self, target: &TargetUri) -> bool {
        if self.segments.len() != target.segments.len() {
            return false;
        }
        if !self.prefix_matches(target) {
            return false;
        }
        match (&self.resource, &target.resource) {
            (None, None) => true,
            (Some(rule), Some(tgt)) => tail_matches(rule, tgt),
            _ => false,
        }
    }

    /// Parent-or-same match used by admin expansion: every segment of
    /// `self` matches the corresponding segment of `target`, which may
    /// extend deeper; a tail on `self` constrains the target's tail, a
    /// tail-free `self` covers any tail.
    pub fn is_parent_or_same_of(&self, target: &TargetUri) -> bool {
        if self.segments.len() > target.segments.len() {
            return false;
        }
        if !self.prefix_matches(target) {
            return false;
        }
        match (&self.resource, &target.resource) {
            (None, _) => true,
            (Some(rule), Some(tgt)) => tail_matches(rule, tgt),
            (Some(_), None) => false,
        }
    }

    fn prefix_matches(&self, target: &TargetUri) -> bool {
        self.segments
            .iter()
            .zip(target.segments.iter())
            .all(|((rl, rv), (tl, tv))| rl == tl && (rv == WILDCARD || rv == tv))
    }
}

impl std::fmt::Display for TargetUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(SCHEME)?;
        for (i, (level, value)) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}/{}", level.key(), value)?;
        }
        if let Some(tail) = &self.resource {
            write!(f, "/{}/{}", tail.kind, tail.path)?;
        }
        Ok(())
    }
}

/// Tail comparison: kinds agree (or rule wildcards), then segment-wise
/// sub-path comparison where a final `*` in the rule matches any remaining
/// suffix.
fn tail_matches(rule: &ResourceTail, target: &ResourceTail) -> bool {
    if rule.kind != WILDCARD && rule.kind != target.kind {
        return false;
    }
    let rule_segs: Vec<&str> = rule.path.split('/').collect();
    let tgt_segs: Vec<&str> = target.path.split('/').collect();
    let trailing_wildcard = rule_segs.last() == Some(&WILDCARD);
    if trailing_wildcard {
        let head = &rule_segs[..rule_segs.len() - 1];
        if head.len() > tgt_segs.len() {
            return false;
        }
        head.iter()
            .zip(tgt_segs.iter())
            .all(|(r, t)| *r == WILDCARD || r == t)
    } else {
        rule_segs.len() == tgt_segs.len()
            && rule_segs
                .iter()
                .zip(tgt_segs.iter())
                .all(|(r, t)| *r == WILDCARD || r == t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TargetUri {
        TargetUri::parse(s).unwrap()
    }

    #[test]
    fn parse_and_display_round_trip() {
        for s in [
            "res://catalogs/c1",
            "res://catalogs/c1/variants/v1",
            "res://catalogs/c1/variants/v1/workspaces/w1",
            "res://catalogs/c1/variants/v1/namespaces/ns1",
            "res://catalogs/c1/variants/v1/workspaces/w1/namespaces/ns1",
            "res://catalogs/*/variants/v1",
            "res://catalogs/c1/variants/v1/collections/foo/bar",
            "res://catalogs/c1/variants/v1/collections/foo/*",
        ] {
            assert_eq!(t(s).to_string(), s);
        }
    }

    #[test]
    fn positional_grammar_is_enforced() {
        assert!(TargetUri::parse("res://variants/v1").is_err());
        assert!(TargetUri::parse("res://catalogs/c1/workspaces/w1").is_err());
        assert!(TargetUri::parse("res://catalogs/c1/namespaces/n/variants/v").is_err());
        assert!(TargetUri::parse("res://catalogs/c1/catalogs/c2").is_err());
        assert!(TargetUri::parse("res://catalogs").is_err());
        assert!(TargetUri::parse("res://catalogs/c1//x").is_err());
        assert!(TargetUri::parse("catalogs/c1").is_err());
        // Tail without a sub-path is malformed.
        assert!(TargetUri::parse("res://catalogs/c1/collections").is_err());
    }

    #[test]
    fn wildcard_prefix_match() {
        let rule = t("res://catalogs/*/variants/v");
        let target = t("res://catalogs/c/variants/v");
        assert!(rule.matches_exact(&target));
        assert!(!rule.matches_exact(&t("res://catalogs/c/variants/other")));
    }

    #[test]
    fn exact_match_requires_equal_depth() {
        let rule = t("res://catalogs/c");
        assert!(!rule.matches_exact(&t("res://catalogs/c/variants/v")));
        assert!(rule.is_parent_or_same_of(&t("res://catalogs/c/variants/v")));
        assert!(rule.is_parent_or_same_of(&t("res://catalogs/c")));
        assert!(!t("res://catalogs/c/variants/v").is_parent_or_same_of(&t("res://catalogs/c")));
    }

    #[test]
    fn tails_constrain_matches() {
        let rule = t("res://catalogs/c/variants/v/collections/apps/*");
        assert!(rule.matches_exact(&t("res://catalogs/c/variants/v/collections/apps/web")));
        assert!(rule.matches_exact(&t("res://catalogs/c/variants/v/collections/apps")));
        assert!(!rule.matches_exact(&t("res://catalogs/c/variants/v/collections/other/web")));
        assert!(!rule.matches_exact(&t("res://catalogs/c/variants/v")));

        let exact = t("res://catalogs/c/variants/v/collections/apps/web");
        assert!(exact.matches_exact(&t("res://catalogs/c/variants/v/collections/apps/web")));
        assert!(!exact.matches_exact(&t("res://catalogs/c/variants/v/collections/apps/web/x")));
    }

    #[test]
    fn parent_or_same_covers_deeper_tails() {
        let rule = t("res://catalogs/c/variants/v");
        assert!(rule.is_parent_or_same_of(&t(
            "res://catalogs/c/variants/v/collections/apps/web"
        )));
        assert!(rule.is_parent_or_same_of(&t(
            "res://catalogs/c/variants/v/namespaces/ns1"
        )));
        assert!(!rule.is_parent_or_same_of(&t("res://catalogs/c/variants/other")));
    }

    #[test]
    fn deepest_level_tracks_last_segment() {
        assert_eq!(t("res://catalogs/c").deepest_level(), HierarchyLevel::Catalog);
        assert_eq!(
            t("res://catalogs/c/variants/v").deepest_level(),
            HierarchyLevel::Variant
        );
        assert_eq!(
            t("res://catalogs/c/variants/v/namespaces/n").deepest_level(),
            HierarchyLevel::Namespace
        );
        // A resource tail does not change the structured depth.
        assert_eq!(
            t("res://catalogs/c/variants/v/collections/x/y").deepest_level(),
            HierarchyLevel::Variant
        );
    }
}
