//! Crucible MCP Server Library
//!
//! Serves crucible's review tools to coding agents over the Model Context
//! Protocol (stdio transport).
//!
//! ## Features
//!
//! - Seven tools: review, skills, knowledge, assertions, pattern and semantic
//!   checks, domain detection
//! - Tool calls share one loaded [`crucible_review::Reviewer`]
//! - Degraded items are returned inside successful results
//! - Zero unsafe code

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod error;
pub mod registry;
pub mod server;
pub mod tools;

pub use error::{MCPError, ToolError};
pub use registry::{tool_definition, ReviewTool, ToolRegistry};
pub use server::CrucibleServer;
pub use tools::{create_default_tools, ToolContext};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{create_default_tools, CrucibleServer, ReviewTool, ToolContext, ToolRegistry};
}
