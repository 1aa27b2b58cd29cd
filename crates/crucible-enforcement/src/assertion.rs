//! Assertion definitions
//!
//! An assertion is one enforceable rule: a regex (pattern kind) or a
//! natural-language compliance question (semantic kind). Definitions are
//! read from the `assertions:` list of an assertion-set file.

use crate::error::RuleDefinitionError;
use crucible_types::{ParseLevelError, Priority, Severity};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an assertion is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    /// Regex over source text
    Pattern,
    /// Compliance question answered by a reasoning capability
    Semantic,
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => f.write_str("pattern"),
            Self::Semantic => f.write_str("semantic"),
        }
    }
}

/// Which review flow an assertion belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Reviews of existing code
    #[default]
    Code,
    /// Reviews of specs and design documents before code is written
    Prewrite,
    /// Both
    All,
}

impl Scope {
    /// Whether the assertion runs during code review
    pub fn includes_code(&self) -> bool {
        matches!(self, Self::Code | Self::All)
    }

    /// Whether the assertion runs during pre-write review
    pub fn includes_prewrite(&self) -> bool {
        matches!(self, Self::Prewrite | Self::All)
    }
}

/// One enforceable rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionDefinition {
    pub id: String,
    pub kind: AssertionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_prompt: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub priority: Priority,
    /// Lowercase language tags; empty applies to every language
    pub languages: Vec<String>,
    pub path_include: Vec<String>,
    pub path_exclude: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
    pub scope: Scope,
}

impl AssertionDefinition {
    /// Pattern assertion with default applicability
    pub fn pattern(id: impl Into<String>, pattern: impl Into<String>, severity: Severity) -> Self {
        let id = id.into();
        Self {
            message: id.clone(),
            id,
            kind: AssertionKind::Pattern,
            pattern: Some(pattern.into()),
            compliance_prompt: None,
            severity,
            priority: Priority::default(),
            languages: Vec::new(),
            path_include: Vec::new(),
            path_exclude: Vec::new(),
            model_hint: None,
            scope: Scope::default(),
        }
    }

    /// Semantic assertion with default applicability
    pub fn semantic(id: impl Into<String>, prompt: impl Into<String>, priority: Priority) -> Self {
        let id = id.into();
        Self {
            message: id.clone(),
            id,
            kind: AssertionKind::Semantic,
            pattern: None,
            compliance_prompt: Some(prompt.into()),
            severity: Severity::Medium,
            priority,
            languages: Vec::new(),
            path_include: Vec::new(),
            path_exclude: Vec::new(),
            model_hint: None,
            scope: Scope::default(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.languages = languages
            .into_iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .collect();
        self
    }

    pub fn with_paths(mut self, include: &[&str], exclude: &[&str]) -> Self {
        self.path_include = include.iter().map(|s| s.to_string()).collect();
        self.path_exclude = exclude.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_model_hint(mut self, hint: impl Into<String>) -> Self {
        self.model_hint = Some(hint.into());
        self
    }

    /// Whether `language` passes the language filter
    pub fn applies_to_language(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }

    /// Check that required fields are present and patterns compile
    pub fn validate(&self) -> Result<(), RuleDefinitionError> {
        match self.kind {
            AssertionKind::Pattern => {
                let pattern = self
                    .pattern
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| RuleDefinitionError::MissingPattern {
                        id: self.id.clone(),
                    })?;
                Regex::new(pattern).map_err(|source| RuleDefinitionError::InvalidPattern {
                    id: self.id.clone(),
                    source,
                })?;
            }
            AssertionKind::Semantic => {
                if self
                    .compliance_prompt
                    .as_deref()
                    .map_or(true, |p| p.trim().is_empty())
                {
                    return Err(RuleDefinitionError::MissingCompliance {
                        id: self.id.clone(),
                    });
                }
            }
        }

        for glob in self.path_include.iter().chain(&self.path_exclude) {
            glob::Pattern::new(glob).map_err(|source| RuleDefinitionError::InvalidGlob {
                id: self.id.clone(),
                glob: glob.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Entry as written in an assertion-set file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawAssertion {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    pattern: Option<String>,
    compliance: Option<String>,
    message: Option<String>,
    severity: Option<String>,
    priority: Option<String>,
    languages: Vec<String>,
    applicability: RawApplicability,
    model: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApplicability {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl RawAssertion {
    /// Convert and validate an entry at `index` within its file
    pub(crate) fn into_definition(self, index: usize) -> Result<AssertionDefinition, RuleDefinitionError> {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(RuleDefinitionError::MissingId { index })?;

        let kind = match self.kind.as_deref().map(|k| k.trim().to_ascii_lowercase()) {
            Some(k) if k == "pattern" || k == "regex" => AssertionKind::Pattern,
            Some(k) if k == "llm" || k == "semantic" || k == "compliance" => AssertionKind::Semantic,
            Some(k) => return Err(RuleDefinitionError::UnknownKind { id, kind: k }),
            None if self.compliance.is_some() && self.pattern.is_none() => AssertionKind::Semantic,
            None => AssertionKind::Pattern,
        };

        let level_err = |source: ParseLevelError| RuleDefinitionError::InvalidLevel {
            id: id.clone(),
            source,
        };
        let severity = match self.severity.as_deref() {
            Some(s) => s.parse::<Severity>().map_err(level_err)?,
            None => Severity::Medium,
        };
        let priority = match self.priority.as_deref() {
            Some(p) => p.parse::<Priority>().map_err(level_err)?,
            None => Priority::default(),
        };
        let scope = match self.scope.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
            None => Scope::Code,
            Some(s) if s == "code" => Scope::Code,
            Some(s) if s == "prewrite" => Scope::Prewrite,
            Some(s) if s == "all" => Scope::All,
            Some(s) => {
                return Err(level_err(ParseLevelError {
                    kind: "scope",
                    value: s,
                }))
            }
        };

        let message = self
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| id.clone());

        let definition = AssertionDefinition {
            id,
            kind,
            pattern: self.pattern,
            compliance_prompt: self.compliance,
            message,
            severity,
            priority,
            languages: self
                .languages
                .iter()
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
            path_include: self.applicability.include,
            path_exclude: self.applicability.exclude,
            model_hint: self.model,
            scope,
        };
        definition.validate()?;
        Ok(definition)
    }
}
