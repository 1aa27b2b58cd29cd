//! Finding aggregation and pass/fail
//!
//! Merges findings from pattern, semantic and external-tool origins. Two
//! findings from different origins at the same path and line with the same
//! normalized message are treated as one issue. This is a heuristic.

use crucible_types::{Finding, Severity, SeveritySummary};
use std::collections::HashMap;

/// Lowercased message with whitespace collapsed and trailing punctuation dropped
pub fn normalize_message(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', ';', ':'])
        .to_lowercase()
}

/// Collapse cross-origin duplicates, keeping the first position and the highest severity
///
/// Findings from the same origin are never merged, nor are a suppressed and an
/// active finding.
pub fn deduplicate(findings: Vec<Finding>) -> Vec<Finding> {
    let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());
    let mut by_key: HashMap<(String, usize, String, bool), Vec<usize>> = HashMap::new();

    for finding in findings {
        let key = (
            finding.location.path.clone(),
            finding.location.line,
            normalize_message(&finding.message),
            finding.suppressed,
        );
        let slots = by_key.entry(key).or_default();

        let duplicate = slots
            .iter()
            .copied()
            .find(|&i| kept[i].origin != finding.origin);

        match duplicate {
            Some(i) => {
                if finding.severity > kept[i].severity {
                    kept[i].severity = finding.severity;
                }
            }
            None => {
                slots.push(kept.len());
                kept.push(finding);
            }
        }
    }

    kept
}

/// Severity counts plus pass/fail against `threshold`
///
/// Fails iff an active finding is at or above `threshold`. Suppressed findings
/// are counted separately and never fail.
pub fn summarize(findings: &[Finding], threshold: Severity) -> (SeveritySummary, bool) {
    let summary = SeveritySummary::from_findings(findings);
    let pass = summary.at_or_above(threshold) == 0;
    (summary, pass)
}
