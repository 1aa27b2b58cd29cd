//! Trigger and domain matching
//!
//! Decides which resources apply to a unit under review. Every reason a
//! resource applies is recorded, and output order always follows input order.

use crate::frontmatter::ResourceMetadata;
use crucible_types::{Domain, DomainContext, ResourceRef};
use serde::Serialize;
use std::str::FromStr;

/// Reason recorded for `always_run: true`
pub const ALWAYS_RUN: &str = "always_run";

/// Prefix of the reason recorded for a domain rule
pub const DOMAIN_PREFIX: &str = "domain:";

/// A resource that applies, with every reason it applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    /// The matched resource
    pub resource: ResourceRef,
    /// Reasons, in rule order: `always_run`, `domain:<d>`, then triggers in declared order
    pub matched_triggers: Vec<String>,
}

/// Every reason `metadata` applies to `context`; empty means no match
pub fn match_reasons(metadata: &ResourceMetadata, context: &DomainContext) -> Vec<String> {
    let mut reasons = Vec::new();

    if metadata.always_run {
        reasons.push(ALWAYS_RUN.to_string());
    }

    if metadata
        .always_run_for_domains
        .iter()
        .any(|d| names_domain(d, context.domain))
    {
        reasons.push(format!("{DOMAIN_PREFIX}{}", context.domain));
    }

    reasons.extend(
        metadata
            .triggers
            .iter()
            .filter(|trigger| context.has_tag(trigger))
            .cloned(),
    );

    reasons
}

/// Whether a declared domain name refers to `domain`
///
/// Case and `-`/`_` spelling are ignored. Unrecognized names match nothing.
fn names_domain(name: &str, domain: Domain) -> bool {
    let parsed = Domain::from_str(name).unwrap_or(Domain::Unknown);
    parsed == domain && (parsed != Domain::Unknown || name.trim().eq_ignore_ascii_case("unknown"))
}

/// Match resources against a context, keeping input order
pub fn match_resources<'a, I>(resources: I, context: &DomainContext) -> Vec<MatchResult>
where
    I: IntoIterator<Item = (&'a ResourceRef, &'a ResourceMetadata)>,
{
    resources
        .into_iter()
        .filter_map(|(resource, metadata)| {
            let matched_triggers = match_reasons(metadata, context);
            (!matched_triggers.is_empty()).then(|| MatchResult {
                resource: resource.clone(),
                matched_triggers,
            })
        })
        .collect()
}

/// Knowledge to activate: requested names first, then each matched skill's links
///
/// Duplicates are dropped, keeping the first occurrence.
pub fn expand_knowledge<'a, R, L>(requested: R, linked: L) -> Vec<String>
where
    R: IntoIterator<Item = &'a str>,
    L: IntoIterator<Item = &'a ResourceMetadata>,
{
    let mut out: Vec<String> = Vec::new();
    let linked_names = linked
        .into_iter()
        .flat_map(|meta| meta.linked_knowledge.iter().map(String::as_str));

    for name in requested.into_iter().chain(linked_names) {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}
