//! Skills registry
//!
//! Resolves every skill across the cascade, parses each one, and answers
//! "which skills apply to this file". A skill that fails to parse is recorded
//! as degraded and the rest still load.

use crate::cascade::{list_all, CascadeRoots, ShadowedCopy};
use crate::error::CascadeError;
use crate::matcher::{expand_knowledge, match_resources, MatchResult};
use crate::skill::Skill;
use crucible_types::{Degraded, DegradedKind, DomainContext, ResourceKind};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// All skills visible through a set of cascade roots
#[derive(Debug, Clone)]
pub struct SkillsRegistry {
    roots: CascadeRoots,
    /// Keyed by name so iteration order is stable
    skills: BTreeMap<String, Skill>,
    shadowed: BTreeMap<String, Vec<ShadowedCopy>>,
    degraded: Vec<Degraded>,
}

impl SkillsRegistry {
    /// Create an empty registry over the given roots
    pub fn new(roots: CascadeRoots) -> Self {
        Self {
            roots,
            skills: BTreeMap::new(),
            shadowed: BTreeMap::new(),
            degraded: Vec::new(),
        }
    }

    /// Resolve and parse every skill at every tier
    pub fn discover(&mut self) -> Result<(), CascadeError> {
        info!("Starting skills discovery");
        self.skills.clear();
        self.shadowed.clear();
        self.degraded.clear();

        for entry in list_all(ResourceKind::Skill, &self.roots)? {
            let name = entry.resource.name.clone();
            match Skill::load(entry.resource) {
                Ok(skill) => {
                    debug!("Discovered skill: {} ({:?})", name, skill.resource.tier);
                    self.skills.insert(name.clone(), skill);
                    if !entry.shadowed.is_empty() {
                        self.shadowed.insert(name, entry.shadowed);
                    }
                }
                Err(e) => {
                    warn!("Skipping skill '{}': {}", name, e);
                    self.degraded
                        .push(Degraded::new(DegradedKind::Parse, format!("skill:{name}"), e.to_string()));
                }
            }
        }

        info!(
            "Discovered {} skills ({} degraded)",
            self.skills.len(),
            self.degraded.len()
        );
        Ok(())
    }

    /// Roots this registry was built from
    pub fn roots(&self) -> &CascadeRoots {
        &self.roots
    }

    /// Get a skill by name
    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// All skills in name order
    pub fn skills(&self) -> impl Iterator<Item = &Skill> {
        self.skills.values()
    }

    /// Lower-tier copies hidden by the active copy of a skill
    pub fn shadowed(&self, name: &str) -> &[ShadowedCopy] {
        self.shadowed.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Skills that failed to load
    pub fn degraded(&self) -> &[Degraded] {
        &self.degraded
    }

    /// Get number of skills
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Skills applicable to a context, in name order
    pub fn applicable(&self, context: &DomainContext) -> Vec<MatchResult> {
        match_resources(
            self.skills.values().map(|s| (&s.resource, &s.metadata)),
            context,
        )
    }

    /// Knowledge to load: `requested` first, then links of every matched skill
    pub fn linked_knowledge(&self, matches: &[MatchResult], requested: &[String]) -> Vec<String> {
        let linked = matches
            .iter()
            .filter_map(|m| self.skills.get(&m.resource.name))
            .map(|s| &s.metadata);
        expand_knowledge(requested.iter().map(String::as_str), linked)
    }

    /// Concise skills list for embedding in tool descriptions
    pub fn generate_skills_list(&self) -> String {
        if self.skills.is_empty() {
            return "No skills available".to_string();
        }

        self.skills
            .values()
            .map(|skill| match skill.description() {
                "" => skill.name().to_string(),
                description => format!("{}: {}", skill.name(), description),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::{Domain, Tier};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn roots(tmp: &TempDir) -> CascadeRoots {
        let roots = CascadeRoots::new(
            tmp.path().join("project"),
            tmp.path().join("user"),
            tmp.path().join("bundled"),
        );
        for (_, root) in roots.iter() {
            fs::create_dir_all(root).unwrap();
        }
        roots
    }

    fn write_skill(root: &Path, name: &str, content: &str) {
        let dir = root.join("skills").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), content).unwrap();
    }

    #[test]
    fn test_registry_empty() {
        let tmp = TempDir::new().unwrap();
        let mut registry = SkillsRegistry::new(roots(&tmp));
        registry.discover().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.generate_skills_list(), "No skills available");
    }

    #[test]
    fn test_discover_applies_cascade_and_records_degraded() {
        let tmp = TempDir::new().unwrap();
        let roots = roots(&tmp);
        write_skill(
            &roots.bundled,
            "security-engineer",
            "---\ndescription: Bundled\nalways_run: true\n---\nbundled",
        );
        write_skill(
            &roots.project,
            "security-engineer",
            "---\ndescription: Project\nalways_run: true\nknowledge: [SECURITY.md]\n---\nproject",
        );
        write_skill(
            &roots.user,
            "backend-engineer",
            "---\ntriggers: [python, api]\nknowledge: [API.md, SECURITY.md]\n---\n",
        );
        write_skill(&roots.bundled, "broken", "---\ntriggers: [a\n---\n");

        let mut registry = SkillsRegistry::new(roots);
        registry.discover().unwrap();

        assert_eq!(registry.len(), 2);
        let security = registry.get("security-engineer").unwrap();
        assert_eq!(security.resource.tier, Some(Tier::Project));
        assert_eq!(security.description(), "Project");
        assert_eq!(registry.shadowed("security-engineer").len(), 1);
        assert_eq!(registry.degraded().len(), 1);
        assert_eq!(registry.degraded()[0].item, "skill:broken");

        let ctx = DomainContext::new(Domain::Backend, ["python"]);
        let matches = registry.applicable(&ctx);
        let names: Vec<_> = matches.iter().map(|m| m.resource.name.as_str()).collect();
        assert_eq!(names, vec!["backend-engineer", "security-engineer"]);
        assert_eq!(matches[0].matched_triggers, vec!["python"]);

        let knowledge = registry.linked_knowledge(&matches, &["TESTING.md".to_string()]);
        assert_eq!(knowledge, vec!["TESTING.md", "API.md", "SECURITY.md"]);
    }
}
