//! Pattern assertion engine
//!
//! Evaluates regex assertions over in-memory text. No file I/O happens here;
//! the caller supplies the text, its path and its language tag.

use crate::assertion::{AssertionDefinition, AssertionKind};
use crate::error::RuleDefinitionError;
use crucible_types::{Degraded, DegradedKind, Finding, FindingOrigin, Location};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use tracing::{debug, warn};

/// Inline suppression marker
pub const SUPPRESSION_MARKER: &str = "crucible-ignore";

/// A parsed `crucible-ignore[: id, ...]` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppression {
    /// Targeted ids; empty suppresses every assertion on the line
    pub ids: Vec<String>,
    /// Directive as written
    pub directive: String,
}

impl Suppression {
    /// Find the directive on a single line
    ///
    /// The first occurrence of the marker that ends at a word boundary counts;
    /// longer words such as `crucible-ignored` are passed over.
    pub fn parse(line: &str) -> Option<Self> {
        let (start, after) = line.match_indices(SUPPRESSION_MARKER).find_map(|(start, marker)| {
            let after = &line[start + marker.len()..];
            let continues_word = after
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-');
            (!continues_word).then_some((start, after))
        })?;

        let Some(list) = after.trim_start().strip_prefix(':') else {
            return Some(Self::bare());
        };

        let mut ids = Vec::new();
        let mut rest = list;
        loop {
            let candidate = rest.trim_start();
            let len = candidate
                .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.')))
                .unwrap_or(candidate.len());
            if len == 0 {
                break;
            }
            ids.push(candidate[..len].to_string());
            rest = &candidate[len..];
            match rest.trim_start().strip_prefix(',') {
                Some(next) => rest = next,
                None => break,
            }
        }

        if ids.is_empty() {
            return Some(Self::bare());
        }

        let end = line.len() - rest.len();
        let directive = line[start..end].trim_end().trim_end_matches(',').to_string();
        Some(Self { ids, directive })
    }

    fn bare() -> Self {
        Self {
            ids: Vec::new(),
            directive: SUPPRESSION_MARKER.to_string(),
        }
    }

    /// Whether this directive covers `assertion_id`
    pub fn covers(&self, assertion_id: &str) -> bool {
        self.ids.is_empty() || self.ids.iter().any(|id| id == assertion_id)
    }
}

struct CompiledRule {
    definition: AssertionDefinition,
    regex: Regex,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl CompiledRule {
    fn compile(definition: &AssertionDefinition) -> Result<Self, RuleDefinitionError> {
        let source = definition
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RuleDefinitionError::MissingPattern {
                id: definition.id.clone(),
            })?;
        let regex = Regex::new(source).map_err(|source| RuleDefinitionError::InvalidPattern {
            id: definition.id.clone(),
            source,
        })?;

        let compile_globs = |globs: &[String]| {
            globs
                .iter()
                .map(|g| {
                    Pattern::new(g).map_err(|source| RuleDefinitionError::InvalidGlob {
                        id: definition.id.clone(),
                        glob: g.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            include: compile_globs(&definition.path_include)?,
            exclude: compile_globs(&definition.path_exclude)?,
            regex,
            definition: definition.clone(),
        })
    }

    /// Language filter, then include, then exclude (exclude always wins)
    fn applies(&self, path: &str, language: &str) -> bool {
        if !self.definition.applies_to_language(language) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| path_matches(p, path)) {
            return false;
        }
        !self.exclude.iter().any(|p| path_matches(p, path))
    }
}

/// Compiled pattern assertions, ready to evaluate many files
pub struct PatternEngine {
    rules: Vec<CompiledRule>,
}

impl PatternEngine {
    /// Compile every pattern-kind assertion
    ///
    /// Semantic assertions are ignored. An assertion that fails to compile is
    /// returned as degraded and the rest are kept.
    pub fn new(assertions: &[AssertionDefinition]) -> (Self, Vec<Degraded>) {
        let mut rules = Vec::new();
        let mut degraded = Vec::new();

        for definition in assertions.iter().filter(|a| a.kind == AssertionKind::Pattern) {
            match CompiledRule::compile(definition) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    warn!("Skipping assertion '{}': {}", definition.id, e);
                    degraded.push(Degraded::new(
                        DegradedKind::RuleDefinition,
                        definition.id.clone(),
                        e.to_string(),
                    ));
                }
            }
        }

        debug!("Compiled {} pattern assertion(s)", rules.len());
        (Self { rules }, degraded)
    }

    /// Number of compiled rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules compiled
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate all applicable rules against `text`
    ///
    /// Findings are ordered by rule, then by position in the text.
    pub fn evaluate(&self, text: &str, path: &str, language: &str) -> Vec<Finding> {
        let path = normalize_path(path);
        let index = LineIndex::new(text);
        let mut findings = Vec::new();

        for rule in self.rules.iter().filter(|r| r.applies(&path, language)) {
            for m in rule.regex.find_iter(text) {
                if m.as_str().is_empty() {
                    continue;
                }
                let (line, column) = index.position(text, m.start());
                let location = Location::new(path.clone(), line).with_column(column);
                let finding = Finding::new(
                    &rule.definition.id,
                    &rule.definition.message,
                    rule.definition.severity,
                    location,
                    FindingOrigin::Pattern,
                )
                .with_matched_text(m.as_str());

                let suppression = Suppression::parse(index.line_text(text, line))
                    .filter(|s| s.covers(&rule.definition.id));
                findings.push(match suppression {
                    Some(s) => finding.suppressed_by(s.directive),
                    None => finding,
                });
            }
        }

        findings
    }
}

/// One-shot evaluation of a list of definitions
pub fn evaluate(
    text: &str,
    path: &str,
    language: &str,
    assertions: &[AssertionDefinition],
) -> (Vec<Finding>, Vec<Degraded>) {
    let (engine, degraded) = PatternEngine::new(assertions);
    (engine.evaluate(text, path, language), degraded)
}

/// Byte offsets of every line start
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    /// 1-based line and character column of a byte offset
    fn position(&self, text: &str, offset: usize) -> (usize, usize) {
        let line_idx = self.starts.partition_point(|&s| s <= offset) - 1;
        let column = text[self.starts[line_idx]..offset].chars().count() + 1;
        (line_idx + 1, column)
    }

    fn line_text<'t>(&self, text: &'t str, line: usize) -> &'t str {
        let start = self.starts[line - 1];
        let end = self
            .starts
            .get(line)
            .map_or(text.len(), |next| next - 1);
        &text[start..end]
    }
}

/// Language and path filters for a definition that is not compiled into an engine
///
/// Used to narrow semantic assertions. Globs that fail to compile never match.
pub fn applies_to_file(definition: &AssertionDefinition, path: &str, language: &str) -> bool {
    if !definition.applies_to_language(language) {
        return false;
    }
    let path = normalize_path(path);
    let hits = |globs: &[String]| {
        globs
            .iter()
            .filter_map(|g| Pattern::new(g).ok())
            .any(|p| path_matches(&p, &path))
    };
    (definition.path_include.is_empty() || hits(&definition.path_include)) && !hits(&definition.path_exclude)
}

fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").map(str::to_string).unwrap_or(path)
}

/// Globs without a `/` also match the file name alone
fn path_matches(pattern: &Pattern, path: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    if pattern.matches_with(path, options) {
        return true;
    }
    if !pattern.as_str().contains('/') {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        return pattern.matches_with(file_name, options);
    }
    false
}
