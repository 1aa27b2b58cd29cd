//! Crucible resource layer
//!
//! Skills, knowledge files, assertion sets, templates and ignore files are all
//! customizable resources looked up through a three-tier cascade.
//!
//! ## Features
//!
//! - Deterministic resolution: project overrides user overrides bundled
//! - YAML frontmatter parsing with unknown keys preserved for round-tripping
//! - Trigger and domain matching that records every reason a resource applies
//! - Skill discovery and knowledge loading with per-item degradation
//!
//! ## Flow
//!
//! 1. [`cascade`] finds the active copy of each resource
//! 2. [`frontmatter`] turns it into [`ResourceMetadata`]
//! 3. [`matcher`] narrows resources to those relevant for a [`DomainContext`]
//!
//! [`DomainContext`]: crucible_types::DomainContext

#![deny(unsafe_code, dead_code, unused_imports, unused_variables, missing_docs)]

pub mod cascade;
pub mod error;
pub mod frontmatter;
pub mod knowledge;
pub mod matcher;
pub mod registry;
pub mod skill;

pub use cascade::{CascadeEntry, CascadeRoots, InitOutcome, InstallOutcome, ShadowedCopy, TierStatus};
pub use error::{CascadeError, FrontmatterError, ResourceError};
pub use frontmatter::ResourceMetadata;
pub use knowledge::{load_knowledge, KnowledgeBundle, KnowledgeEntry};
pub use matcher::{match_resources, MatchResult};
pub use registry::SkillsRegistry;
pub use skill::Skill;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CascadeRoots, MatchResult, ResourceMetadata, Skill, SkillsRegistry,
    };
}
