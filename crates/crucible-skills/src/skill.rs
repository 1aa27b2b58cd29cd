//! Skill definition
//!
//! A skill is a folder containing SKILL.md with YAML frontmatter. The folder
//! name is the skill's identity; a `name` key in the header is display-only.

use crate::error::ResourceError;
use crate::frontmatter::{read_resource, ResourceMetadata};
use crucible_types::ResourceRef;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::warn;

/// Maximum recommended name length
const MAX_NAME_LENGTH: usize = 64;
/// Maximum recommended description length
const MAX_DESCRIPTION_LENGTH: usize = 1024;

static NAME_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("Invalid skill name regex"));

/// A resolved skill with its parsed header and body
#[derive(Debug, Clone, Serialize)]
pub struct Skill {
    /// Where the skill was resolved
    pub resource: ResourceRef,
    /// Parsed frontmatter and body
    pub metadata: ResourceMetadata,
}

impl Skill {
    /// Load a resolved skill reference from disk
    pub fn load(resource: ResourceRef) -> Result<Self, ResourceError> {
        let metadata = read_resource(&resource)?;
        let skill = Self { resource, metadata };
        skill.warn_on_style();
        Ok(skill)
    }

    /// Skill identity (directory name)
    pub fn name(&self) -> &str {
        &self.resource.name
    }

    /// Skill description, empty when the header has none
    pub fn description(&self) -> &str {
        self.metadata.description.as_deref().unwrap_or("")
    }

    /// Guidance text after the header
    pub fn body(&self) -> &str {
        &self.metadata.body
    }

    /// Naming conventions are advisory; violations are logged, not rejected
    fn warn_on_style(&self) {
        let name = self.name();
        if name.len() > MAX_NAME_LENGTH {
            warn!(
                "Skill name '{}' exceeds {} characters (was {})",
                name,
                MAX_NAME_LENGTH,
                name.len()
            );
        }
        if !NAME_STYLE.is_match(name) {
            warn!(
                "Skill name '{}' should contain only lowercase letters, numbers, and hyphens",
                name
            );
        }
        if self.description().len() > MAX_DESCRIPTION_LENGTH {
            warn!(
                "Skill '{}' description exceeds {} characters (was {})",
                name,
                MAX_DESCRIPTION_LENGTH,
                self.description().len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::{ResourceKind, Tier};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_skill() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("SKILL.md");
        fs::write(
            &path,
            r#"---
name: code-reviewer
description: Reviews code for best practices and security.
triggers: [review]
---

# Code Reviewer

This skill helps review code.
"#,
        )
        .unwrap();

        let resource = ResourceRef::resolved(ResourceKind::Skill, "code-reviewer", &path, Tier::Project);
        let skill = Skill::load(resource).unwrap();
        assert_eq!(skill.name(), "code-reviewer");
        assert_eq!(skill.description(), "Reviews code for best practices and security.");
        assert_eq!(skill.metadata.triggers, vec!["review"]);
        assert!(skill.body().contains("# Code Reviewer"));
    }

    #[test]
    fn test_name_style() {
        assert!(NAME_STYLE.is_match("security-expert"));
        assert!(NAME_STYLE.is_match("erc20"));
        assert!(!NAME_STYLE.is_match("Security_Expert"));
        assert!(!NAME_STYLE.is_match(""));
    }

    #[test]
    fn test_load_unresolved_fails() {
        let resource = ResourceRef::unresolved(ResourceKind::Skill, "ghost");
        assert!(matches!(
            Skill::load(resource),
            Err(ResourceError::Unresolved(_))
        ));
    }

    #[test]
    fn test_load_malformed_frontmatter_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("SKILL.md");
        fs::write(&path, "---\ntriggers: [a\n").unwrap();
        let resource = ResourceRef::resolved(ResourceKind::Skill, "broken", &path, Tier::User);
        assert!(matches!(
            Skill::load(resource),
            Err(ResourceError::Parse { .. })
        ));
    }
}
