//! Error types for resource resolution and parsing

use crucible_types::ResourceKind;
use std::path::PathBuf;
use thiserror::Error;

/// Cascade resolution errors
///
/// A resource that exists at no tier is not an error: lookups return `None`.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// None of the three roots exists as a directory
    #[error(
        "no resource roots exist (project: {}, user: {}, bundled: {})",
        .project.display(),
        .user.display(),
        .bundled.display()
    )]
    NoRoots {
        /// Project root that was checked
        project: PathBuf,
        /// User root that was checked
        user: PathBuf,
        /// Bundled root that was checked
        bundled: PathBuf,
    },

    /// Resource name cannot be mapped to a file location
    #[error("invalid {kind} name '{name}': {reason}")]
    InvalidName {
        /// Resource kind
        kind: ResourceKind,
        /// Offending name
        name: String,
        /// Why the name was rejected
        reason: &'static str,
    },

    /// No copy exists to initialize from
    #[error("{kind} '{name}' not found at user or bundled tier")]
    NotFound {
        /// Resource kind
        kind: ResourceKind,
        /// Resource name
        name: String,
    },

    /// Project copy exists and overwriting was not requested
    #[error("{} already exists (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),

    /// Filesystem error while scanning or copying
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

/// Frontmatter parse errors
#[derive(Debug, Error)]
pub enum FrontmatterError {
    /// Opening delimiter without a closing one
    #[error("frontmatter opened with '---' but never closed")]
    Unclosed,

    /// Header is not valid YAML
    #[error("invalid YAML in frontmatter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Header parsed, but is not a key-value mapping
    #[error("frontmatter must be a mapping of keys to values")]
    NotAMapping,

    /// A list field contains nested structure
    #[error("'{key}' must be a flat list of scalars")]
    NonScalarList {
        /// Field name
        key: String,
    },

    /// A known field has the wrong type
    #[error("'{key}' must be {expected}")]
    InvalidField {
        /// Field name
        key: String,
        /// Expected shape
        expected: &'static str,
    },
}

/// Errors loading a single resolved resource file
#[derive(Debug, Error)]
pub enum ResourceError {
    /// File could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File has malformed frontmatter
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: FrontmatterError,
    },

    /// Reference was never resolved to a path
    #[error("{0} has no resolved path")]
    Unresolved(String),
}
