use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a finding was raised: file path plus 1-based line and optional column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl Location {
    pub fn new(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
            column: None,
        }
    }

    pub fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(col) => write!(f, "{}:{}:{}", self.path, self.line, col),
            None => write!(f, "{}:{}", self.path, self.line),
        }
    }
}

/// Which analyzer produced a finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingOrigin {
    Pattern,
    Semantic,
    /// External static-analysis tool (semgrep, ruff, slither, ...)
    Tool { name: String },
}

impl fmt::Display for FindingOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => f.write_str("pattern"),
            Self::Semantic => f.write_str("semantic"),
            Self::Tool { name } => f.write_str(name),
        }
    }
}

/// One concrete violation instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub assertion_id: String,
    pub message: String,
    pub severity: Severity,
    pub location: Location,
    pub origin: FindingOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub suppressed: bool,
    /// The inline directive that suppressed this finding, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppressed_by: Option<String>,
}

impl Finding {
    pub fn new(
        assertion_id: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        location: Location,
        origin: FindingOrigin,
    ) -> Self {
        Self {
            assertion_id: assertion_id.into(),
            message: message.into(),
            severity,
            location,
            origin,
            matched_text: None,
            explanation: None,
            suppressed: false,
            suppressed_by: None,
        }
    }

    pub fn with_matched_text(mut self, text: impl Into<String>) -> Self {
        self.matched_text = Some(text.into());
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn suppressed_by(mut self, directive: impl Into<String>) -> Self {
        self.suppressed = true;
        self.suppressed_by = Some(directive.into());
        self
    }

    pub fn is_active(&self) -> bool {
        !self.suppressed
    }
}

/// Non-suppressed finding counts per severity, plus the suppressed total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub suppressed: usize,
}

impl SeveritySummary {
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            summary.record(finding);
        }
        summary
    }

    pub fn record(&mut self, finding: &Finding) {
        if finding.suppressed {
            self.suppressed += 1;
            return;
        }
        *self.slot(finding.severity) += 1;
    }

    pub fn count(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }

    /// Active findings at or above `threshold`.
    pub fn at_or_above(&self, threshold: Severity) -> usize {
        Severity::DESCENDING
            .iter()
            .filter(|s| **s >= threshold)
            .map(|s| self.count(*s))
            .sum()
    }

    pub fn total_active(&self) -> usize {
        self.at_or_above(Severity::Info)
    }

    pub fn merge(&mut self, other: &SeveritySummary) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
        self.info += other.info;
        self.suppressed += other.suppressed;
    }

    fn slot(&mut self, severity: Severity) -> &mut usize {
        match severity {
            Severity::Critical => &mut self.critical,
            Severity::High => &mut self.high,
            Severity::Medium => &mut self.medium,
            Severity::Low => &mut self.low,
            Severity::Info => &mut self.info,
        }
    }
}

/// Category of a per-item failure that degraded a review without aborting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedKind {
    Parse,
    RuleDefinition,
    Capability,
    Timeout,
    Cancelled,
    Io,
}

/// A resource, assertion, or file that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degraded {
    pub kind: DegradedKind,
    pub item: String,
    pub reason: String,
}

impl Degraded {
    pub fn new(kind: DegradedKind, item: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            item: item.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding::new(
            "rule",
            "message",
            severity,
            Location::new("a.py", 1),
            FindingOrigin::Pattern,
        )
    }

    #[test]
    fn test_summary_skips_suppressed() {
        let findings = vec![
            finding(Severity::Critical),
            finding(Severity::High).suppressed_by("crucible-ignore"),
            finding(Severity::Low),
        ];
        let summary = SeveritySummary::from_findings(&findings);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.high, 0);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.at_or_above(Severity::High), 1);
        assert_eq!(summary.total_active(), 2);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new("src/a.py", 3).to_string(), "src/a.py:3");
        assert_eq!(
            Location::new("src/a.py", 3).with_column(7).to_string(),
            "src/a.py:3:7"
        );
    }
}
