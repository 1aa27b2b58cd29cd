//! Error types for assertion loading and evaluation

use crucible_skills::CascadeError;
use std::time::Duration;
use thiserror::Error;

/// A single assertion that cannot be evaluated
///
/// Scoped to that assertion; the rest of its batch still loads and runs.
#[derive(Debug, Error)]
pub enum RuleDefinitionError {
    /// Entry has no `id`
    #[error("assertion #{index} has no id")]
    MissingId {
        /// Position in its file, 0-based
        index: usize,
    },

    /// Entry could not be deserialized
    #[error("assertion #{index} is malformed: {source}")]
    Malformed {
        /// Position in its file, 0-based
        index: usize,
        /// Underlying error
        source: serde_yaml::Error,
    },

    /// Unknown `type`
    #[error("assertion '{id}' has unknown type '{kind}'")]
    UnknownKind {
        /// Assertion id
        id: String,
        /// Offending value
        kind: String,
    },

    /// Pattern assertion without a pattern
    #[error("pattern assertion '{id}' has no 'pattern'")]
    MissingPattern {
        /// Assertion id
        id: String,
    },

    /// Semantic assertion without a compliance prompt
    #[error("semantic assertion '{id}' has no 'compliance' prompt")]
    MissingCompliance {
        /// Assertion id
        id: String,
    },

    /// Regex failed to compile
    #[error("assertion '{id}' has an invalid pattern: {source}")]
    InvalidPattern {
        /// Assertion id
        id: String,
        /// Underlying error
        source: regex::Error,
    },

    /// Include or exclude glob failed to compile
    #[error("assertion '{id}' has an invalid glob '{glob}': {source}")]
    InvalidGlob {
        /// Assertion id
        id: String,
        /// Offending glob
        glob: String,
        /// Underlying error
        source: glob::PatternError,
    },

    /// Severity, priority or scope is not recognized
    #[error("assertion '{id}': {source}")]
    InvalidLevel {
        /// Assertion id
        id: String,
        /// Underlying error
        source: crucible_types::ParseLevelError,
    },
}

impl RuleDefinitionError {
    /// Assertion id when known, otherwise a positional label
    pub fn item(&self) -> String {
        match self {
            Self::MissingId { index } | Self::Malformed { index, .. } => format!("#{index}"),
            Self::UnknownKind { id, .. }
            | Self::MissingPattern { id }
            | Self::MissingCompliance { id }
            | Self::InvalidPattern { id, .. }
            | Self::InvalidGlob { id, .. }
            | Self::InvalidLevel { id, .. } => id.clone(),
        }
    }
}

/// Structural failures of the assertion loader
#[derive(Debug, Error)]
pub enum AssertionLoadError {
    /// Explicit file list was empty
    #[error("no assertion files given")]
    NoFiles,

    /// Cascade could not be searched at all
    #[error(transparent)]
    Cascade(#[from] CascadeError),
}

/// Failures of the external reasoning capability for one request
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// No capability is configured or reachable
    #[error("reasoning capability unavailable: {0}")]
    Unavailable(String),

    /// Response could not be read as a verdict
    #[error("malformed verdict: {0}")]
    Malformed(String),

    /// Request exceeded its deadline
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Caller cancelled before the request completed
    #[error("cancelled")]
    Cancelled,

    /// Transport or API error
    #[error("request failed: {0}")]
    Request(String),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, AssertionLoadError>;
