//! Pre-write review of specs and design documents
//!
//! A document is matched to a template (named, or detected from its content).
//! The template contributes a checklist, linked knowledge and the assertion
//! sets to run; only assertions scoped `prewrite` or `all` take part.

use crate::report::SemanticStats;
use chrono::{DateTime, Utc};
use crucible_skills::cascade::{list_all, resolve, CascadeRoots};
use crucible_skills::frontmatter::read_resource;
use crucible_skills::{MatchResult, ResourceMetadata};
use crucible_types::{Degraded, Finding, ResourceKind, ResourceRef, Severity, SeveritySummary};
use serde::Serialize;
use serde_yaml::Value;
use std::fmt::Write;
use uuid::Uuid;

/// Tag skills declare to apply during pre-write review
pub const PREWRITE_TAG: &str = "prewrite";

/// Content cues for one template
pub struct TemplateHeuristic {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

/// Detection order; the first template with enough hits wins
pub const TEMPLATE_HEURISTICS: [TemplateHeuristic; 5] = [
    TemplateHeuristic {
        name: "prd",
        keywords: &["product requirements", "user stories", "success metrics", "## problem statement"],
    },
    TemplateHeuristic {
        name: "tdd",
        keywords: &["technical design", "architecture", "data model", "api contracts", "## detailed design"],
    },
    TemplateHeuristic {
        name: "rfc",
        keywords: &["request for comments", "## motivation", "## rationale", "## drawbacks"],
    },
    TemplateHeuristic {
        name: "adr",
        keywords: &["architecture decision record", "## status", "## decision", "## consequences"],
    },
    TemplateHeuristic {
        name: "security-review",
        keywords: &["security review", "threat model", "## assets", "## threats"],
    },
];

/// Keyword hits needed to pick a template
const MIN_HITS: usize = 2;

/// Guess a template from a document
///
/// A `name:` in the document's own header wins when it names a known
/// template; otherwise keyword hits decide.
pub fn detect_template(text: &str) -> Option<&'static str> {
    if let Some(rest) = text.strip_prefix("---") {
        let declared = rest
            .lines()
            .skip(1)
            .take_while(|line| line.trim() != "---")
            .find_map(|line| line.trim().strip_prefix("name:"))
            .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase());
        if let Some(declared) = declared {
            if let Some(known) = TEMPLATE_HEURISTICS.iter().find(|h| h.name == declared) {
                return Some(known.name);
            }
        }
    }

    let lower = text.to_lowercase();
    TEMPLATE_HEURISTICS
        .iter()
        .find(|h| h.keywords.iter().filter(|k| lower.contains(*k)).count() >= MIN_HITS)
        .map(|h| h.name)
}

/// A resolved pre-write template
#[derive(Debug, Clone, Serialize)]
pub struct PrewriteTemplate {
    pub resource: ResourceRef,
    pub metadata: ResourceMetadata,
    /// Items for the author to confirm by hand
    pub checklist: Vec<String>,
    /// Assertion sets to run; empty runs every pre-write assertion
    pub assertion_sets: Vec<String>,
}

/// Result of looking up a template
#[derive(Debug)]
pub enum TemplateLookup {
    Found(Box<PrewriteTemplate>),
    /// Not present at any tier; carries the names that are
    Missing { available: Vec<String> },
}

impl PrewriteTemplate {
    /// Resolve `name` through the cascade and read its header
    pub fn load(name: &str, roots: &CascadeRoots) -> crate::Result<TemplateLookup> {
        let Some(resource) = resolve(ResourceKind::Template, name, roots)? else {
            let available = list_all(ResourceKind::Template, roots)?
                .into_iter()
                .map(|entry| template_name(&entry.resource.name).to_string())
                .collect();
            return Ok(TemplateLookup::Missing { available });
        };

        let metadata = read_resource(&resource)?;
        let checklist = extra_list(&metadata, "checklist");
        let assertion_sets = extra_list(&metadata, "assertions");
        Ok(TemplateLookup::Found(Box::new(Self {
            resource,
            metadata,
            checklist,
            assertion_sets,
        })))
    }

    /// Template name without its extension
    pub fn name(&self) -> &str {
        template_name(&self.resource.name)
    }
}

fn template_name(file_name: &str) -> &str {
    file_name.strip_suffix(".md").unwrap_or(file_name)
}

/// String or list-of-strings header key the shared parser leaves uninterpreted
fn extra_list(metadata: &ResourceMetadata, key: &str) -> Vec<String> {
    match metadata.extra.get(key) {
        Some(Value::String(item)) => vec![item.clone()],
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Outcome of a pre-write review
#[derive(Debug, Clone, Serialize)]
pub struct PrewriteReport {
    pub id: Uuid,
    pub reviewed_at: DateTime<Utc>,
    pub path: String,
    /// Template applied, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Whether the template was detected rather than named
    pub detected: bool,
    pub checklist: Vec<String>,
    pub skills: Vec<MatchResult>,
    pub knowledge: Vec<String>,
    pub findings: Vec<Finding>,
    pub threshold: Severity,
    pub summary: SeveritySummary,
    pub passed: bool,
    pub degraded: Vec<Degraded>,
    pub semantic: SemanticStats,
}

impl PrewriteReport {
    /// Empty, passing report for `path`
    pub fn new(path: impl Into<String>, threshold: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            reviewed_at: Utc::now(),
            path: path.into(),
            template: None,
            detected: false,
            checklist: Vec::new(),
            skills: Vec::new(),
            knowledge: Vec::new(),
            findings: Vec::new(),
            threshold,
            summary: SeveritySummary::default(),
            passed: true,
            degraded: Vec::new(),
            semantic: SemanticStats::default(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let _ = writeln!(out, "# Pre-Write Review: {verdict}\n");
        let _ = writeln!(out, "File: `{}`", self.path);
        match &self.template {
            Some(template) if self.detected => {
                let _ = writeln!(out, "Template: {template} (detected)");
            }
            Some(template) => {
                let _ = writeln!(out, "Template: {template}");
            }
            None => {
                let _ = writeln!(out, "Template: none");
            }
        }
        let _ = writeln!(
            out,
            "{} finding(s), {} suppressed, threshold {}\n",
            self.summary.total_active(),
            self.summary.suppressed,
            self.threshold
        );

        let active: Vec<&Finding> = self.findings.iter().filter(|f| f.is_active()).collect();
        if !active.is_empty() {
            let _ = writeln!(out, "## Findings\n");
            for severity in Severity::DESCENDING {
                for finding in active.iter().filter(|f| f.severity == severity) {
                    let _ = writeln!(
                        out,
                        "- **{}** `{}` line {}: {}",
                        finding.severity.as_str().to_uppercase(),
                        finding.assertion_id,
                        finding.location.line,
                        finding.message
                    );
                    if let Some(explanation) = &finding.explanation {
                        let _ = writeln!(out, "  - {explanation}");
                    }
                }
            }
            out.push('\n');
        }

        if !self.checklist.is_empty() {
            let _ = writeln!(out, "## Checklist\n");
            for item in &self.checklist {
                let _ = writeln!(out, "- [ ] {item}");
            }
            out.push('\n');
        }

        if !self.skills.is_empty() {
            let names: Vec<&str> = self.skills.iter().map(|m| m.resource.name.as_str()).collect();
            let _ = writeln!(out, "Skills: {}", names.join(", "));
        }
        if !self.knowledge.is_empty() {
            let _ = writeln!(out, "Knowledge: {}", self.knowledge.join(", "));
        }
        if self.semantic.run > 0 || !self.semantic.skipped.is_empty() {
            let _ = writeln!(
                out,
                "Semantic: {} run, {} skipped, {} tokens planned",
                self.semantic.run,
                self.semantic.skipped.len(),
                self.semantic.tokens_planned
            );
        }

        if !self.degraded.is_empty() {
            let _ = writeln!(out, "\n## Degraded\n");
            for d in &self.degraded {
                let _ = writeln!(out, "- {:?} `{}`: {}", d.kind, d.item, d.reason);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::{FindingOrigin, Location, Tier};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_from_header_name() {
        let doc = "---\nname: 'ADR'\nstatus: draft\n---\n# Pick a queue\n";
        assert_eq!(detect_template(doc), Some("adr"));

        let unknown = "---\nname: roadmap\n---\nplain\n";
        assert_eq!(detect_template(unknown), None);
    }

    #[test]
    fn test_detect_from_keywords() {
        let prd = "# Checkout\n\n## Problem Statement\nUsers abandon carts.\n\n## User Stories\n...";
        assert_eq!(detect_template(prd), Some("prd"));

        let threat = "# Security Review\n\n## Assets\n- tokens\n";
        assert_eq!(detect_template(threat), Some("security-review"));

        assert_eq!(detect_template("## Motivation\nonly one cue"), None);
    }

    #[test]
    fn test_load_template_reads_checklist_and_sets() {
        let tmp = TempDir::new().unwrap();
        let roots = CascadeRoots::new(
            tmp.path().join("project"),
            tmp.path().join("user"),
            tmp.path().join("bundled"),
        );
        fs::create_dir_all(roots.bundled.join("templates")).unwrap();
        fs::write(
            roots.bundled.join("templates/prd.md"),
            "---\nname: PRD\nchecklist:\n  - Success metrics are measurable\n  - Rollout plan exists\nknowledge: [PRODUCT.md]\nassertions: specs\n---\n# Template\n",
        )
        .unwrap();

        let TemplateLookup::Found(template) = PrewriteTemplate::load("prd", &roots).unwrap() else {
            panic!("template should resolve");
        };
        assert_eq!(template.name(), "prd");
        assert_eq!(template.resource.tier, Some(Tier::Bundled));
        assert_eq!(template.checklist.len(), 2);
        assert_eq!(template.assertion_sets, vec!["specs"]);
        assert_eq!(template.metadata.linked_knowledge, vec!["PRODUCT.md"]);

        match PrewriteTemplate::load("rfc", &roots).unwrap() {
            TemplateLookup::Missing { available } => assert_eq!(available, vec!["prd"]),
            TemplateLookup::Found(_) => panic!("rfc does not exist"),
        }
    }

    #[test]
    fn test_markdown() {
        let mut report = PrewriteReport::new("docs/prd.md", Severity::High);
        report.template = Some("prd".into());
        report.detected = true;
        report.checklist = vec!["Rollout plan exists".into()];
        report.findings = vec![Finding::new(
            "has-metrics",
            "No success metrics",
            Severity::High,
            Location::new("docs/prd.md", 1),
            FindingOrigin::Semantic,
        )];
        report.summary = SeveritySummary::from_findings(&report.findings);
        report.passed = false;

        let md = report.to_markdown();
        assert!(md.starts_with("# Pre-Write Review: FAILED"));
        assert!(md.contains("Template: prd (detected)"));
        assert!(md.contains("- **HIGH** `has-metrics` line 1: No success metrics"));
        assert!(md.contains("- [ ] Rollout plan exists"));
    }
}
