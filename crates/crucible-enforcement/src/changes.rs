//! Changed-line filtering
//!
//! When reviewing a diff, only findings on added lines are reported. An
//! optional margin widens each added range to include surrounding context.

use crucible_types::Finding;
use serde::{Deserialize, Serialize};

/// Inclusive, 1-based range of lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Range of `count` lines starting at `start`
    pub fn new(start: usize, count: usize) -> Self {
        Self {
            start,
            end: start + count.saturating_sub(1),
        }
    }

    /// Whether `line` falls within the range widened by `margin` on each side
    pub fn contains(&self, line: usize, margin: usize) -> bool {
        line + margin >= self.start && line <= self.end + margin
    }
}

/// A file touched by a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path relative to the repository root
    pub path: String,
    /// Added line ranges in the new version
    pub added: Vec<LineRange>,
}

impl ChangedFile {
    /// Whether `line` is inside an added range
    pub fn touches(&self, line: usize, margin: usize) -> bool {
        self.added.iter().any(|r| r.contains(line, margin))
    }
}

/// Keep only findings on changed lines
///
/// Findings in files absent from `changes` are dropped.
pub fn filter_to_changes(findings: Vec<Finding>, changes: &[ChangedFile], margin: usize) -> Vec<Finding> {
    findings
        .into_iter()
        .filter(|f| {
            changes
                .iter()
                .find(|c| c.path == f.location.path)
                .is_some_and(|c| c.touches(f.location.line, margin))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::{FindingOrigin, Location, Severity};

    fn at(path: &str, line: usize) -> Finding {
        Finding::new("r", "m", Severity::High, Location::new(path, line), FindingOrigin::Pattern)
    }

    #[test]
    fn test_filter_to_added_lines() {
        let changes = vec![ChangedFile {
            path: "src/a.py".into(),
            added: vec![LineRange::new(10, 3)],
        }];
        let findings = vec![at("src/a.py", 9), at("src/a.py", 10), at("src/a.py", 12), at("src/b.py", 10)];

        let strict = filter_to_changes(findings.clone(), &changes, 0);
        assert_eq!(strict.iter().map(|f| f.location.line).collect::<Vec<_>>(), vec![10, 12]);

        let widened = filter_to_changes(findings, &changes, 1);
        assert_eq!(widened.len(), 3);
    }

    #[test]
    fn test_line_range() {
        let r = LineRange::new(5, 1);
        assert_eq!(r.end, 5);
        assert!(r.contains(5, 0));
        assert!(!r.contains(6, 0));
        assert!(r.contains(8, 3));
    }
}
