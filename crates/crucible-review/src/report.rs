//! Review report and its renderings

use chrono::{DateTime, Utc};
use crucible_enforcement::compliance::SkippedAssertion;
use crucible_skills::MatchResult;
use crucible_types::{Degraded, DomainContext, Finding, Severity, SeveritySummary};
use serde::Serialize;
use std::fmt::Write;
use uuid::Uuid;

/// What was applied to one file and how it fared
#[derive(Debug, Clone, Serialize)]
pub struct FileReview {
    pub path: String,
    pub context: DomainContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub skills: Vec<MatchResult>,
    /// Knowledge files activated for this file
    pub knowledge: Vec<String>,
    pub assertion_sets: Vec<MatchResult>,
    pub threshold: Severity,
    pub summary: SeveritySummary,
    pub passed: bool,
}

/// Semantic assertion accounting across the review
#[derive(Debug, Clone, Default, Serialize)]
pub struct SemanticStats {
    pub tokens_planned: usize,
    /// Requests that returned a verdict
    pub run: usize,
    pub skipped: Vec<SkippedAssertion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewReport {
    pub id: Uuid,
    pub reviewed_at: DateTime<Utc>,
    pub files: Vec<FileReview>,
    pub findings: Vec<Finding>,
    pub summary: SeveritySummary,
    pub passed: bool,
    pub degraded: Vec<Degraded>,
    pub semantic: SemanticStats,
}

impl ReviewReport {
    /// Empty, passing report
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            reviewed_at: Utc::now(),
            files: Vec::new(),
            findings: Vec::new(),
            summary: SeveritySummary::default(),
            passed: true,
            degraded: Vec::new(),
            semantic: SemanticStats::default(),
        }
    }

    /// Active findings, most severe first, then by location
    pub fn active_findings(&self) -> Vec<&Finding> {
        let mut active: Vec<&Finding> = self.findings.iter().filter(|f| f.is_active()).collect();
        active.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.location.path.cmp(&b.location.path))
                .then_with(|| a.location.line.cmp(&b.location.line))
        });
        active
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let _ = writeln!(out, "# Crucible Review: {verdict}\n");
        let _ = writeln!(
            out,
            "{} file(s) reviewed, {} finding(s), {} suppressed\n",
            self.files.len(),
            self.summary.total_active(),
            self.summary.suppressed
        );

        let _ = writeln!(out, "| Severity | Count |\n|---|---|");
        for severity in Severity::DESCENDING {
            let _ = writeln!(out, "| {} | {} |", severity, self.summary.count(severity));
        }
        out.push('\n');

        let active = self.active_findings();
        if !active.is_empty() {
            let _ = writeln!(out, "## Findings\n");
            for finding in active {
                let _ = writeln!(
                    out,
                    "- **{}** `{}` {} ({}): {}",
                    finding.severity.as_str().to_uppercase(),
                    finding.assertion_id,
                    finding.location,
                    finding.origin,
                    finding.message
                );
                if let Some(explanation) = &finding.explanation {
                    let _ = writeln!(out, "  - {explanation}");
                }
            }
            out.push('\n');
        }

        if !self.files.is_empty() {
            let _ = writeln!(out, "## Files\n");
            for file in &self.files {
                let skills: Vec<&str> = file.skills.iter().map(|m| m.resource.name.as_str()).collect();
                let _ = writeln!(
                    out,
                    "- `{}` [{}] threshold {} {}",
                    file.path,
                    file.context.domain,
                    file.threshold,
                    if file.passed { "pass" } else { "fail" }
                );
                if !skills.is_empty() {
                    let _ = writeln!(out, "  - skills: {}", skills.join(", "));
                }
                if !file.knowledge.is_empty() {
                    let _ = writeln!(out, "  - knowledge: {}", file.knowledge.join(", "));
                }
            }
            out.push('\n');
        }

        if self.semantic.run > 0 || !self.semantic.skipped.is_empty() {
            let _ = writeln!(
                out,
                "Semantic: {} run, {} skipped, {} tokens planned\n",
                self.semantic.run,
                self.semantic.skipped.len(),
                self.semantic.tokens_planned
            );
        }

        if !self.degraded.is_empty() {
            let _ = writeln!(out, "## Degraded\n");
            for d in &self.degraded {
                let _ = writeln!(out, "- {:?} `{}`: {}", d.kind, d.item, d.reason);
            }
        }

        out
    }
}

impl Default for ReviewReport {
    fn default() -> Self {
        Self::new()
    }
}
