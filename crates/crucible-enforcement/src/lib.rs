//! Crucible enforcement engine
//!
//! Loads assertion sets through the resource cascade, evaluates pattern
//! assertions over source text, schedules semantic assertions under a token
//! budget, and reduces everything to a severity summary with a pass/fail
//! verdict.

#![deny(unsafe_code, dead_code, unused_imports, unused_variables)]

pub mod assertion;
pub mod changes;
pub mod compliance;
pub mod error;
pub mod loader;
pub mod patterns;
pub mod summary;

pub use assertion::{AssertionDefinition, AssertionKind, Scope};
pub use changes::{filter_to_changes, ChangedFile, LineRange};
pub use compliance::{
    estimate_tokens, parse_verdict, plan, select_and_run, ComplianceRequest, ExecuteOptions,
    ReasoningCapability, SemanticPlan, SemanticReport, Verdict,
};
pub use error::{AssertionLoadError, CapabilityError, RuleDefinitionError};
pub use loader::{AssertionCatalog, LoadedAssertion};
pub use patterns::{applies_to_file, PatternEngine, Suppression, SUPPRESSION_MARKER};
pub use summary::{deduplicate, summarize};
