//! Assertion-set loading and merging
//!
//! Every assertion-set file at every tier is read. Definitions are merged per
//! id: the first definition seen in Project, User, Bundled order (files in
//! name order within a tier) wins outright, and later ones are recorded as
//! shadowed. A file that fails to parse, or an entry that fails validation,
//! is reported as degraded without stopping the rest.

use crate::assertion::{AssertionDefinition, RawAssertion};
use crate::error::{AssertionLoadError, Result};
use crucible_skills::cascade::{list_tier, CascadeRoots};
use crucible_skills::frontmatter::{from_mapping, ResourceMetadata};
use crucible_skills::matcher::{match_reasons, MatchResult, ALWAYS_RUN};
use crucible_types::{Degraded, DegradedKind, DomainContext, ResourceKind, ResourceRef, Tier};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One assertion-set file with its header
#[derive(Debug, Clone, Serialize)]
pub struct AssertionSet {
    pub resource: ResourceRef,
    pub metadata: ResourceMetadata,
}

/// A definition hidden by a same-id definition loaded earlier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowedDefinition {
    pub tier: Option<Tier>,
    pub path: PathBuf,
}

/// A merged assertion and the set it came from
#[derive(Debug, Clone, Serialize)]
pub struct LoadedAssertion {
    pub definition: AssertionDefinition,
    /// Index into [`AssertionCatalog::sets`]
    pub set: usize,
    pub shadowed: Vec<ShadowedDefinition>,
}

/// Merged assertions from a batch of files
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssertionCatalog {
    pub sets: Vec<AssertionSet>,
    /// Merged definitions in first-seen order
    pub assertions: Vec<LoadedAssertion>,
    pub degraded: Vec<Degraded>,
}

impl AssertionCatalog {
    /// Load every assertion set visible through the cascade
    pub fn load(roots: &CascadeRoots) -> Result<Self> {
        roots.ensure_any_exists()?;
        let mut catalog = Self::default();
        let mut index = HashMap::new();

        for tier in Tier::ORDER {
            for resource in list_tier(ResourceKind::AssertionSet, roots, tier)? {
                catalog.add_file(resource, &mut index);
            }
        }

        info!(
            "Loaded {} assertion(s) from {} set(s), {} degraded",
            catalog.assertions.len(),
            catalog.sets.len(),
            catalog.degraded.len()
        );
        Ok(catalog)
    }

    /// Load an explicit list of files, merged in the order given
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Err(AssertionLoadError::NoFiles);
        }
        let mut catalog = Self::default();
        let mut index = HashMap::new();

        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let resource = ResourceRef {
                kind: ResourceKind::AssertionSet,
                name,
                path: Some(path.to_path_buf()),
                tier: None,
            };
            catalog.add_file(resource, &mut index);
        }
        Ok(catalog)
    }

    /// Look up a merged definition by id
    pub fn get(&self, id: &str) -> Option<&LoadedAssertion> {
        self.assertions.iter().find(|a| a.definition.id == id)
    }

    /// Sets that apply to a context, in load order
    ///
    /// A set that declares no triggers or always-run flags applies everywhere.
    pub fn applicable_sets(&self, context: &DomainContext) -> Vec<MatchResult> {
        self.sets
            .iter()
            .filter_map(|set| {
                let reasons = if set.metadata.has_match_rules() {
                    match_reasons(&set.metadata, context)
                } else {
                    vec![ALWAYS_RUN.to_string()]
                };
                (!reasons.is_empty()).then(|| MatchResult {
                    resource: set.resource.clone(),
                    matched_triggers: reasons,
                })
            })
            .collect()
    }

    /// Code-review definitions whose set applies to a context
    pub fn applicable(&self, context: &DomainContext) -> Vec<AssertionDefinition> {
        let active: Vec<bool> = self
            .sets
            .iter()
            .map(|set| {
                !set.metadata.has_match_rules() || !match_reasons(&set.metadata, context).is_empty()
            })
            .collect();

        self.assertions
            .iter()
            .filter(|a| active.get(a.set).copied().unwrap_or(false))
            .filter(|a| a.definition.scope.includes_code())
            .map(|a| a.definition.clone())
            .collect()
    }

    /// Pre-write definitions, optionally limited to the named sets
    ///
    /// Set triggers are not consulted; documents have no domain. Names match
    /// with or without the `.yaml` extension.
    pub fn prewrite<S: AsRef<str>>(&self, set_names: &[S]) -> Vec<AssertionDefinition> {
        let wanted = |set: &AssertionSet| {
            set_names.is_empty()
                || set_names.iter().any(|name| {
                    let name = name.as_ref().trim();
                    set.resource.name == name
                        || Path::new(&set.resource.name).file_stem().is_some_and(|stem| stem == name)
                })
        };
        let active: Vec<bool> = self.sets.iter().map(wanted).collect();

        self.assertions
            .iter()
            .filter(|a| active.get(a.set).copied().unwrap_or(false))
            .filter(|a| a.definition.scope.includes_prewrite())
            .map(|a| a.definition.clone())
            .collect()
    }

    /// All merged definitions
    pub fn definitions(&self) -> impl Iterator<Item = &AssertionDefinition> {
        self.assertions.iter().map(|a| &a.definition)
    }

    fn add_file(&mut self, resource: ResourceRef, index: &mut HashMap<String, usize>) {
        let Some(path) = resource.path.clone() else {
            return;
        };
        let item = path.display().to_string();

        let (metadata, entries) = match read_set(&path) {
            Ok(parsed) => parsed,
            Err(degraded) => {
                warn!("Skipping assertion set {}: {}", item, degraded.reason);
                self.degraded.push(degraded);
                return;
            }
        };

        let set_index = self.sets.len();
        let tier = resource.tier;
        self.sets.push(AssertionSet { resource, metadata });

        for (position, entry) in entries.into_iter().enumerate() {
            let definition = match serde_yaml::from_value::<RawAssertion>(entry) {
                Ok(raw) => raw.into_definition(position),
                Err(source) => Err(crate::error::RuleDefinitionError::Malformed {
                    index: position,
                    source,
                }),
            };

            let definition = match definition {
                Ok(d) => d,
                Err(e) => {
                    warn!("Invalid assertion in {}: {}", item, e);
                    self.degraded.push(Degraded::new(
                        DegradedKind::RuleDefinition,
                        format!("{}:{}", item, e.item()),
                        e.to_string(),
                    ));
                    continue;
                }
            };

            match index.get(&definition.id) {
                Some(&existing) => {
                    debug!(
                        "Assertion '{}' in {} shadowed by earlier definition",
                        definition.id, item
                    );
                    self.assertions[existing].shadowed.push(ShadowedDefinition {
                        tier,
                        path: path.clone(),
                    });
                }
                None => {
                    index.insert(definition.id.clone(), self.assertions.len());
                    self.assertions.push(LoadedAssertion {
                        definition,
                        set: set_index,
                        shadowed: Vec::new(),
                    });
                }
            }
        }
    }
}

/// Parse one file into header metadata and raw entries
fn read_set(path: &Path) -> std::result::Result<(ResourceMetadata, Vec<Value>), Degraded> {
    let item = path.display().to_string();
    let raw = fs::read_to_string(path)
        .map_err(|e| Degraded::new(DegradedKind::Io, item.clone(), e.to_string()))?;

    let parse_err = |reason: String| Degraded::new(DegradedKind::Parse, item.clone(), reason);

    let mut document = match serde_yaml::from_str::<Value>(&raw).map_err(|e| parse_err(e.to_string()))? {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => return Err(parse_err("assertion set must be a mapping".to_string())),
    };

    let entries = match document.remove("assertions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items,
        Some(_) => return Err(parse_err("'assertions' must be a list".to_string())),
    };

    let metadata = from_mapping(&document).map_err(|e| parse_err(e.to_string()))?;
    Ok((metadata, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::Domain;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, CascadeRoots) {
        let tmp = TempDir::new().unwrap();
        let roots = CascadeRoots::new(
            tmp.path().join("project"),
            tmp.path().join("user"),
            tmp.path().join("bundled"),
        );
        for (_, root) in roots.iter() {
            fs::create_dir_all(root.join("assertions")).unwrap();
        }
        (tmp, roots)
    }

    #[test]
    fn test_project_definition_shadows_bundled() {
        let (_tmp, roots) = fixture();
        fs::write(
            roots.project.join("assertions/security.yaml"),
            "assertions:\n  - id: no-eval\n    pattern: 'eval\\('\n    severity: critical\n",
        )
        .unwrap();
        fs::write(
            roots.bundled.join("assertions/security.yaml"),
            "assertions:\n  - id: no-eval\n    pattern: 'exec\\('\n  - id: no-pickle\n    pattern: 'pickle\\.loads'\n",
        )
        .unwrap();

        let catalog = AssertionCatalog::load(&roots).unwrap();
        assert_eq!(catalog.assertions.len(), 2);

        let merged = catalog.get("no-eval").unwrap();
        assert_eq!(merged.definition.pattern.as_deref(), Some("eval\\("));
        assert_eq!(merged.shadowed.len(), 1);
        assert_eq!(merged.shadowed[0].tier, Some(Tier::Bundled));
        assert_eq!(catalog.sets[merged.set].resource.tier, Some(Tier::Project));
    }

    #[test]
    fn test_bad_entries_degrade_individually() {
        let (_tmp, roots) = fixture();
        fs::write(
            roots.bundled.join("assertions/mixed.yaml"),
            "assertions:\n  - id: ok\n    pattern: 'x'\n  - id: broken\n    pattern: '(x'\n  - id: sem\n    type: llm\n",
        )
        .unwrap();
        fs::write(roots.bundled.join("assertions/garbage.yaml"), "assertions: [unclosed").unwrap();

        let catalog = AssertionCatalog::load(&roots).unwrap();
        assert_eq!(catalog.assertions.len(), 1);
        assert_eq!(catalog.degraded.len(), 3);
        assert!(catalog
            .degraded
            .iter()
            .any(|d| d.kind == DegradedKind::Parse && d.item.ends_with("garbage.yaml")));
    }

    #[test]
    fn test_set_header_narrows_applicability() {
        let (_tmp, roots) = fixture();
        fs::write(
            roots.bundled.join("assertions/solidity.yaml"),
            "name: solidity\ntriggers: [solidity]\nassertions:\n  - id: tx-origin\n    pattern: 'tx\\.origin'\n",
        )
        .unwrap();
        fs::write(
            roots.bundled.join("assertions/general.yaml"),
            "assertions:\n  - id: no-todo\n    pattern: 'TODO'\n  - id: spec-check\n    compliance: Design matches spec\n    scope: prewrite\n",
        )
        .unwrap();

        let catalog = AssertionCatalog::load(&roots).unwrap();

        let backend = DomainContext::new(Domain::Backend, ["python"]);
        let ids: Vec<_> = catalog.applicable(&backend).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["no-todo"]);

        let contract = DomainContext::new(Domain::SmartContract, ["solidity"]);
        let ids: Vec<_> = catalog.applicable(&contract).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["no-todo", "tx-origin"]);

        let sets = catalog.applicable_sets(&contract);
        assert_eq!(sets[0].matched_triggers, vec![ALWAYS_RUN]);
        assert_eq!(sets[1].matched_triggers, vec!["solidity"]);
    }

    #[test]
    fn test_prewrite_selection() {
        let (_tmp, roots) = fixture();
        fs::write(
            roots.bundled.join("assertions/specs.yaml"),
            "triggers: [solidity]\nassertions:\n  - id: has-scope\n    compliance: Scope is stated\n    scope: prewrite\n  - id: no-tbd\n    pattern: 'TBD'\n    scope: all\n  - id: no-eval\n    pattern: 'eval\\('\n",
        )
        .unwrap();
        fs::write(
            roots.bundled.join("assertions/security.yaml"),
            "assertions:\n  - id: threat-model\n    compliance: Threats are listed\n    scope: prewrite\n",
        )
        .unwrap();

        let catalog = AssertionCatalog::load(&roots).unwrap();
        let none: [&str; 0] = [];
        let ids: Vec<_> = catalog.prewrite(&none).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["threat-model", "has-scope", "no-tbd"]);

        let ids: Vec<_> = catalog.prewrite(&["specs"]).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["has-scope", "no-tbd"]);
        let ids: Vec<_> = catalog.prewrite(&["security.yaml"]).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["threat-model"]);
        assert!(catalog.prewrite(&["missing"]).is_empty());

        let backend = DomainContext::new(Domain::Backend, ["python"]);
        let ids: Vec<_> = catalog.applicable(&backend).into_iter().map(|d| d.id).collect();
        assert!(!ids.contains(&"has-scope".to_string()));
    }

    #[test]
    fn test_load_files_requires_files() {
        let empty: [PathBuf; 0] = [];
        assert!(matches!(
            AssertionCatalog::load_files(&empty),
            Err(AssertionLoadError::NoFiles)
        ));
    }
}
