use crucible_types::{Domain, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[review]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    /// Lowest severity that fails a review
    pub fail_on: Severity,
    /// Keep findings this many lines around changed ranges in git mode
    pub include_context: bool,
    pub context_lines: usize,
    /// Extra ignore patterns on top of `.crucibleignore`
    pub exclude: Vec<String>,
    /// Timeout for git subprocesses, in seconds
    pub git_timeout_secs: u64,
    /// Per-domain overrides, keyed by domain name (`backend`, `smart_contract`, ...)
    #[serde(skip)]
    pub domains: BTreeMap<String, DomainSettings>,
    #[serde(skip)]
    pub semantic: SemanticSettings,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            fail_on: Severity::High,
            include_context: false,
            context_lines: 3,
            exclude: Vec::new(),
            git_timeout_secs: 30,
            domains: BTreeMap::new(),
            semantic: SemanticSettings::default(),
        }
    }
}

impl ReviewSettings {
    /// Threshold for a domain: its override if configured, else `fail_on`
    pub fn threshold_for(&self, domain: Domain) -> Severity {
        self.domains
            .get(domain.as_str())
            .and_then(|d| d.fail_on)
            .unwrap_or(self.fail_on)
    }

    /// Force one threshold for every domain
    pub fn override_threshold(&mut self, threshold: Severity) {
        self.fail_on = threshold;
        self.domains.values_mut().for_each(|d| d.fail_on = None);
    }

    /// Margin for the changed-line filter
    pub fn margin(&self) -> usize {
        if self.include_context {
            self.context_lines
        } else {
            0
        }
    }
}

/// `[domains.<name>]` configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    pub fail_on: Option<Severity>,
}

/// `[semantic]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticSettings {
    pub enabled: bool,
    /// Estimated tokens for one review invocation, shared by all of its files
    pub token_budget: usize,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            token_budget: 50_000,
            timeout_secs: 60,
            concurrency: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_threshold_override() {
        let mut settings = ReviewSettings::default();
        settings.domains.insert(
            "smart_contract".into(),
            DomainSettings {
                fail_on: Some(Severity::Low),
            },
        );
        settings.domains.insert("frontend".into(), DomainSettings::default());

        assert_eq!(settings.threshold_for(Domain::SmartContract), Severity::Low);
        assert_eq!(settings.threshold_for(Domain::Frontend), Severity::High);
        assert_eq!(settings.threshold_for(Domain::Unknown), Severity::High);

        settings.override_threshold(Severity::Critical);
        assert_eq!(settings.threshold_for(Domain::SmartContract), Severity::Critical);
    }

    #[test]
    fn test_margin() {
        let mut settings = ReviewSettings::default();
        assert_eq!(settings.margin(), 0);
        settings.include_context = true;
        assert_eq!(settings.margin(), 3);
    }
}
