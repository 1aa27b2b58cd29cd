//! Error types for the crucible MCP server

use thiserror::Error;

/// Failures of a single tool call
///
/// Degraded items (a missing knowledge file, a bad rule) are not errors; they
/// are reported inside a successful result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool registered under this name
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    /// Arguments missing, mistyped or pointing at nothing
    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        /// Tool name
        tool: String,
        /// What was wrong
        reason: String,
    },

    /// The call could not be completed at all
    #[error("Tool '{tool}' failed: {reason}")]
    Failed {
        /// Tool name
        tool: String,
        /// Failure reason
        reason: String,
    },
}

impl ToolError {
    /// Shorthand for [`ToolError::InvalidArguments`]
    pub fn invalid(tool: &str, reason: impl ToString) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`ToolError::Failed`]
    pub fn failed(tool: &str, reason: impl ToString) -> Self {
        Self::Failed {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum MCPError {
    /// Handshake with the client failed
    #[error("Failed to initialize MCP session: {0}")]
    Initialize(String),

    /// The session task ended abnormally
    #[error("MCP session ended abnormally: {0}")]
    Session(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, MCPError>;
