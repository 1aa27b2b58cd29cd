//! Review pipeline errors

use crucible_enforcement::AssertionLoadError;
use crucible_skills::{CascadeError, ResourceError};
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a review outright
///
/// Anything scoped to one file, skill or assertion is reported as degraded
/// in the report instead.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("template '{name}' not found (available: {available})")]
    UnknownTemplate { name: String, available: String },

    #[error(transparent)]
    Assertions(#[from] AssertionLoadError),

    #[error("git command `{command}` timed out after {timeout_secs}s")]
    GitTimeout { command: String, timeout_secs: u64 },

    #[error("git command `{command}` failed: {stderr}")]
    GitFailed { command: String, stderr: String },

    #[error("{} is not a crucible hook; use --force to replace it", .0.display())]
    ForeignHook(PathBuf),

    #[error("path does not exist: {}", .0.display())]
    MissingPath(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
