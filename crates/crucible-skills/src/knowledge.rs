//! Knowledge loading
//!
//! Resolves a list of knowledge names through the cascade and reads each one.
//! Missing names are reported separately from files that failed to read.

use crate::cascade::{resolve, CascadeRoots};
use crate::error::CascadeError;
use crate::frontmatter::read_resource;
use crucible_types::{Degraded, DegradedKind, ResourceKind, ResourceRef};
use serde::Serialize;
use tracing::{debug, warn};

/// One loaded knowledge file
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeEntry {
    /// Where the file was resolved
    pub resource: ResourceRef,
    /// File body with any frontmatter removed
    pub content: String,
}

/// Result of loading a set of knowledge names
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeBundle {
    /// Loaded files, in request order
    pub entries: Vec<KnowledgeEntry>,
    /// Names that exist at no tier
    pub missing: Vec<String>,
    /// Names that resolved but could not be read or parsed
    pub degraded: Vec<Degraded>,
}

impl KnowledgeBundle {
    /// Concatenate all entries under `## <name>` headings
    pub fn to_markdown(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("## {}\n\n{}", e.resource.name, e.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Load knowledge files by name
///
/// Only [`CascadeError::NoRoots`] aborts; every per-name problem is collected.
pub fn load_knowledge<S: AsRef<str>>(
    names: &[S],
    roots: &CascadeRoots,
) -> Result<KnowledgeBundle, CascadeError> {
    roots.ensure_any_exists()?;
    let mut bundle = KnowledgeBundle::default();

    for name in names {
        let name = name.as_ref();
        let resource = match resolve(ResourceKind::Knowledge, name, roots) {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                debug!("Knowledge '{}' not found", name);
                bundle.missing.push(name.to_string());
                continue;
            }
            Err(e) => {
                bundle
                    .degraded
                    .push(Degraded::new(DegradedKind::Io, format!("knowledge:{name}"), e.to_string()));
                continue;
            }
        };

        match read_resource(&resource) {
            Ok(meta) => bundle.entries.push(KnowledgeEntry {
                resource,
                content: meta.body,
            }),
            Err(e) => {
                warn!("Failed to load knowledge '{}': {}", name, e);
                bundle
                    .degraded
                    .push(Degraded::new(DegradedKind::Parse, format!("knowledge:{name}"), e.to_string()));
            }
        }
    }

    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::Tier;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_knowledge_collects_missing_and_degraded() {
        let tmp = TempDir::new().unwrap();
        let roots = CascadeRoots::new(
            tmp.path().join("project"),
            tmp.path().join("user"),
            tmp.path().join("bundled"),
        );
        fs::create_dir_all(roots.bundled.join("knowledge")).unwrap();
        fs::create_dir_all(roots.project.join("knowledge")).unwrap();
        fs::write(roots.bundled.join("knowledge/SECURITY.md"), "# Security\nValidate input.").unwrap();
        fs::write(roots.project.join("knowledge/TESTING.md"), "---\ntopic: tests\n---\nWrite tests.").unwrap();
        fs::write(roots.project.join("knowledge/BROKEN.md"), "---\nnever closed").unwrap();

        let bundle = load_knowledge(&["SECURITY.md", "TESTING", "NOPE", "BROKEN"], &roots).unwrap();

        assert_eq!(bundle.entries.len(), 2);
        assert_eq!(bundle.entries[0].resource.tier, Some(Tier::Bundled));
        assert_eq!(bundle.entries[1].content, "Write tests.");
        assert_eq!(bundle.missing, vec!["NOPE"]);
        assert_eq!(bundle.degraded.len(), 1);
        assert!(bundle.to_markdown().starts_with("## SECURITY.md\n\n# Security"));
    }
}
