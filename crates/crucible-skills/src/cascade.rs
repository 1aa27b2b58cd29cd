//! Three-tier resource cascade
//!
//! Every customizable resource is looked up in three roots, in fixed order:
//! project (`.crucible/`), user (`~/.claude/crucible/`), bundled defaults.
//! The first root holding the expected file wins. Resolution is a pure
//! function of the roots passed in and the current filesystem state.

use crate::error::CascadeError;
use crucible_types::{ResourceKind, ResourceRef, Tier};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of a skill inside its directory
pub const SKILL_FILE: &str = "SKILL.md";
/// Default ignore-file name
pub const IGNORE_FILE: &str = ".crucibleignore";

/// The three ordered search roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeRoots {
    /// Project-local root, highest priority
    pub project: PathBuf,
    /// User-global root
    pub user: PathBuf,
    /// Bundled defaults, lowest priority
    pub bundled: PathBuf,
}

impl CascadeRoots {
    /// Create roots from explicit directories
    pub fn new(
        project: impl Into<PathBuf>,
        user: impl Into<PathBuf>,
        bundled: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project: project.into(),
            user: user.into(),
            bundled: bundled.into(),
        }
    }

    /// Root directory for a tier
    pub fn root(&self, tier: Tier) -> &Path {
        match tier {
            Tier::Project => &self.project,
            Tier::User => &self.user,
            Tier::Bundled => &self.bundled,
        }
    }

    /// Roots in priority order
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &Path)> {
        Tier::ORDER.into_iter().map(move |tier| (tier, self.root(tier)))
    }

    /// Fail with [`CascadeError::NoRoots`] unless at least one root is a directory
    pub fn ensure_any_exists(&self) -> Result<(), CascadeError> {
        if self.iter().any(|(_, root)| root.is_dir()) {
            Ok(())
        } else {
            Err(CascadeError::NoRoots {
                project: self.project.clone(),
                user: self.user.clone(),
                bundled: self.bundled.clone(),
            })
        }
    }
}

/// A resolved resource plus the lower-tier copies it overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeEntry {
    /// Highest-priority copy
    pub resource: ResourceRef,
    /// Overridden copies, in priority order
    pub shadowed: Vec<ShadowedCopy>,
}

/// A lower-tier copy hidden by a higher-tier one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowedCopy {
    /// Tier of the hidden copy
    pub tier: Tier,
    /// Path of the hidden copy
    pub path: PathBuf,
}

/// Presence of a resource at one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    /// Tier inspected
    pub tier: Tier,
    /// Expected location at this tier
    pub path: PathBuf,
    /// Whether a file exists there
    pub exists: bool,
    /// Whether this copy is the one `resolve` returns
    pub active: bool,
}

/// Result of copying a resource into the project tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    /// Tier copied from
    pub source_tier: Tier,
    /// Path copied from
    pub source: PathBuf,
    /// Path written in the project root
    pub destination: PathBuf,
}

/// One bundled resource considered for installation into the user root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    /// Resource name
    pub name: String,
    /// Path in the user root
    pub destination: PathBuf,
    /// False when an existing user copy was kept
    pub installed: bool,
}

/// Normalize a resource name (extension defaults per kind)
pub fn normalize_name(kind: ResourceKind, name: &str) -> Result<String, CascadeError> {
    let trimmed = name.trim();
    let invalid = |reason| CascadeError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("name is empty"));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(invalid("name must not contain path separators"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(invalid("name must not be a relative path component"));
    }

    let default_ext = match kind {
        ResourceKind::Knowledge | ResourceKind::Template => Some("md"),
        ResourceKind::AssertionSet => Some("yaml"),
        ResourceKind::Skill | ResourceKind::Ignore => None,
    };

    match default_ext {
        Some(ext) if Path::new(trimmed).extension().is_none() => Ok(format!("{trimmed}.{ext}")),
        _ => Ok(trimmed.to_string()),
    }
}

/// Location of a resource relative to a root
pub fn relative_path(kind: ResourceKind, normalized_name: &str) -> PathBuf {
    match kind {
        ResourceKind::Skill => Path::new("skills").join(normalized_name).join(SKILL_FILE),
        ResourceKind::Knowledge => Path::new("knowledge").join(normalized_name),
        ResourceKind::AssertionSet => Path::new("assertions").join(normalized_name),
        ResourceKind::Template => Path::new("templates").join(normalized_name),
        ResourceKind::Ignore => PathBuf::from(normalized_name),
    }
}

/// Resolve a resource to its highest-priority copy
///
/// Returns `Ok(None)` when no tier holds the resource. Roots that do not exist
/// are skipped; only "no root exists at all" is an error.
pub fn resolve(
    kind: ResourceKind,
    name: &str,
    roots: &CascadeRoots,
) -> Result<Option<ResourceRef>, CascadeError> {
    roots.ensure_any_exists()?;
    let name = normalize_name(kind, name)?;
    let relative = relative_path(kind, &name);

    for (tier, root) in roots.iter() {
        if !root.is_dir() {
            continue;
        }
        let candidate = root.join(&relative);
        if candidate.is_file() {
            debug!("Resolved {} '{}' at {} tier: {:?}", kind, name, tier, candidate);
            return Ok(Some(ResourceRef::resolved(kind, name, candidate, tier)));
        }
    }

    debug!("{} '{}' not found at any tier", kind, name);
    Ok(None)
}

/// Show where a resource exists at every tier, marking the active copy
pub fn inspect_tiers(
    kind: ResourceKind,
    name: &str,
    roots: &CascadeRoots,
) -> Result<Vec<TierStatus>, CascadeError> {
    let name = normalize_name(kind, name)?;
    let relative = relative_path(kind, &name);
    let mut active_taken = false;

    Ok(roots
        .iter()
        .map(|(tier, root)| {
            let path = root.join(&relative);
            let exists = path.is_file();
            let active = exists && !active_taken;
            active_taken |= exists;
            TierStatus {
                tier,
                path,
                exists,
                active,
            }
        })
        .collect())
}

/// Every resource of `kind` found at any tier, resolved, with shadowed copies
///
/// Output is sorted by name.
pub fn list_all(kind: ResourceKind, roots: &CascadeRoots) -> Result<Vec<CascadeEntry>, CascadeError> {
    roots.ensure_any_exists()?;

    let mut copies: BTreeMap<String, Vec<(Tier, PathBuf)>> = BTreeMap::new();
    for (tier, root) in roots.iter() {
        if !root.is_dir() {
            continue;
        }
        for (name, path) in scan_tier(kind, root)? {
            copies.entry(name).or_default().push((tier, path));
        }
    }

    let entries: Vec<CascadeEntry> = copies
        .into_iter()
        .filter_map(|(name, mut found)| {
            if found.is_empty() {
                return None;
            }
            let (tier, path) = found.remove(0);
            Some(CascadeEntry {
                resource: ResourceRef::resolved(kind, name, path, tier),
                shadowed: found
                    .into_iter()
                    .map(|(tier, path)| ShadowedCopy { tier, path })
                    .collect(),
            })
        })
        .collect();

    debug!("Listed {} {} resource(s)", entries.len(), kind);
    Ok(entries)
}

/// Every copy of `kind` at a single tier, sorted by name
pub fn list_tier(
    kind: ResourceKind,
    roots: &CascadeRoots,
    tier: Tier,
) -> Result<Vec<ResourceRef>, CascadeError> {
    let root = roots.root(tier);
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = scan_tier(kind, root)?;
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found
        .into_iter()
        .map(|(name, path)| ResourceRef::resolved(kind, name, path, tier))
        .collect())
}

/// Copy the highest non-project copy of a resource into the project root
pub fn init_resource(
    kind: ResourceKind,
    name: &str,
    roots: &CascadeRoots,
    force: bool,
) -> Result<InitOutcome, CascadeError> {
    let name = normalize_name(kind, name)?;
    let relative = relative_path(kind, &name);

    let (source_tier, source) = [Tier::User, Tier::Bundled]
        .into_iter()
        .map(|tier| (tier, roots.root(tier).join(&relative)))
        .find(|(_, path)| path.is_file())
        .ok_or_else(|| CascadeError::NotFound {
            kind,
            name: name.clone(),
        })?;

    let destination = roots.project.join(&relative);
    copy_resource(kind, &source, &destination, force)?;

    info!(
        "Initialized {} '{}' from {} tier into {:?}",
        kind, name, source_tier, destination
    );

    Ok(InitOutcome {
        source_tier,
        source,
        destination,
    })
}

/// Copy every bundled resource of `kind` into the user root
///
/// Existing user copies are kept unless `force` is set. Output follows name
/// order.
pub fn install_resources(
    kind: ResourceKind,
    roots: &CascadeRoots,
    force: bool,
) -> Result<Vec<InstallOutcome>, CascadeError> {
    let mut outcomes = Vec::new();
    for resource in list_tier(kind, roots, Tier::Bundled)? {
        let Some(source) = resource.path else {
            continue;
        };
        let destination = roots.user.join(relative_path(kind, &resource.name));
        let installed = match copy_resource(kind, &source, &destination, force) {
            Ok(()) => true,
            Err(CascadeError::AlreadyExists(existing)) => {
                debug!("Keeping existing {} at {:?}", kind, existing);
                false
            }
            Err(e) => return Err(e),
        };
        outcomes.push(InstallOutcome {
            name: resource.name,
            destination,
            installed,
        });
    }

    info!(
        "Installed {} of {} bundled {} resource(s) into {:?}",
        outcomes.iter().filter(|o| o.installed).count(),
        outcomes.len(),
        kind,
        roots.user
    );
    Ok(outcomes)
}

/// Copy a resource file, or a skill's whole directory, to `destination`
fn copy_resource(kind: ResourceKind, source: &Path, destination: &Path, force: bool) -> Result<(), CascadeError> {
    // Skills are directories; copy the whole folder so referenced files come along
    let (copy_from, copy_to) = match kind {
        ResourceKind::Skill => (
            source.parent().unwrap_or(source),
            destination.parent().unwrap_or(destination),
        ),
        _ => (source, destination),
    };

    if copy_to.exists() {
        if !force {
            return Err(CascadeError::AlreadyExists(copy_to.to_path_buf()));
        }
        remove_path(copy_to)?;
    }

    if copy_from.is_dir() {
        copy_dir_all(copy_from, copy_to)
    } else {
        if let Some(parent) = copy_to.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        fs::copy(copy_from, copy_to).map_err(|source| io_err(copy_from, source))?;
        Ok(())
    }
}

/// Scan one root for resources of a kind
fn scan_tier(kind: ResourceKind, root: &Path) -> Result<Vec<(String, PathBuf)>, CascadeError> {
    if kind == ResourceKind::Ignore {
        let path = root.join(IGNORE_FILE);
        return Ok(if path.is_file() {
            vec![(IGNORE_FILE.to_string(), path)]
        } else {
            Vec::new()
        });
    }

    let dir = match kind {
        ResourceKind::Skill => root.join("skills"),
        ResourceKind::Knowledge => root.join("knowledge"),
        ResourceKind::AssertionSet => root.join("assertions"),
        ResourceKind::Template => root.join("templates"),
        ResourceKind::Ignore => root.to_path_buf(),
    };

    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&dir).map_err(|source| io_err(&dir, source))?;
    let mut found = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| io_err(&dir, source))?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        match kind {
            ResourceKind::Skill => {
                let skill_file = path.join(SKILL_FILE);
                if path.is_dir() && skill_file.is_file() {
                    found.push((file_name, skill_file));
                }
            }
            ResourceKind::Knowledge | ResourceKind::Template => {
                if path.is_file() && has_extension(&path, &["md"]) {
                    found.push((file_name, path));
                }
            }
            ResourceKind::AssertionSet => {
                if path.is_file() && has_extension(&path, &["yaml", "yml"]) {
                    found.push((file_name, path));
                }
            }
            ResourceKind::Ignore => {}
        }
    }

    Ok(found)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn copy_dir_all(from: &Path, to: &Path) -> Result<(), CascadeError> {
    fs::create_dir_all(to).map_err(|source| io_err(to, source))?;
    let entries = fs::read_dir(from).map_err(|source| io_err(from, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| io_err(from, source))?;
        let path = entry.path();
        let target = to.join(entry.file_name());
        if path.is_dir() {
            copy_dir_all(&path, &target)?;
        } else {
            fs::copy(&path, &target).map_err(|source| io_err(&path, source))?;
        }
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<(), CascadeError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|source| io_err(path, source))
}

fn io_err(path: &Path, source: std::io::Error) -> CascadeError {
    CascadeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        roots: CascadeRoots,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let roots = CascadeRoots::new(
            tmp.path().join("project"),
            tmp.path().join("user"),
            tmp.path().join("bundled"),
        );
        for (_, root) in roots.iter() {
            fs::create_dir_all(root).unwrap();
        }
        Fixture { _tmp: tmp, roots }
    }

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_bundled_skill() {
        let fx = fixture();
        write(
            fx.roots.bundled.join("skills/security-engineer/SKILL.md"),
            "---\nalways_run: true\n---\n# Security\n",
        );

        let resolved = resolve(ResourceKind::Skill, "security-engineer", &fx.roots)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.tier, Some(Tier::Bundled));
        assert_eq!(
            resolved.path.unwrap(),
            fx.roots.bundled.join("skills/security-engineer/SKILL.md")
        );
    }

    #[test]
    fn test_project_overrides_bundled_until_deleted() {
        let fx = fixture();
        let project = fx.roots.project.join("knowledge/SECURITY.md");
        write(project.clone(), "project copy");
        write(fx.roots.bundled.join("knowledge/SECURITY.md"), "bundled copy");

        let first = resolve(ResourceKind::Knowledge, "SECURITY", &fx.roots)
            .unwrap()
            .unwrap();
        assert_eq!(first.tier, Some(Tier::Project));

        fs::remove_file(project).unwrap();
        let second = resolve(ResourceKind::Knowledge, "SECURITY.md", &fx.roots)
            .unwrap()
            .unwrap();
        assert_eq!(second.tier, Some(Tier::Bundled));
    }

    #[test]
    fn test_missing_resource_is_none() {
        let fx = fixture();
        assert!(resolve(ResourceKind::Template, "prd", &fx.roots)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let fx = fixture();
        fs::remove_dir_all(&fx.roots.user).unwrap();
        write(fx.roots.bundled.join("assertions/security.yaml"), "assertions: []");

        let resolved = resolve(ResourceKind::AssertionSet, "security", &fx.roots)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.tier, Some(Tier::Bundled));
        assert_eq!(resolved.name, "security.yaml");
    }

    #[test]
    fn test_no_roots_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let roots = CascadeRoots::new(tmp.path().join("a"), tmp.path().join("b"), tmp.path().join("c"));
        let err = resolve(ResourceKind::Skill, "x", &roots).unwrap_err();
        assert!(matches!(err, CascadeError::NoRoots { .. }));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let fx = fixture();
        let err = resolve(ResourceKind::Knowledge, "../secrets", &fx.roots).unwrap_err();
        assert!(matches!(err, CascadeError::InvalidName { .. }));
    }

    #[test]
    fn test_list_all_reports_shadowed_copies() {
        let fx = fixture();
        write(fx.roots.project.join("skills/backend/SKILL.md"), "p");
        write(fx.roots.bundled.join("skills/backend/SKILL.md"), "b");
        write(fx.roots.user.join("skills/frontend/SKILL.md"), "u");
        // Directories without SKILL.md are not skills
        fs::create_dir_all(fx.roots.bundled.join("skills/empty")).unwrap();

        let entries = list_all(ResourceKind::Skill, &fx.roots).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.resource.name.as_str()).collect();
        assert_eq!(names, vec!["backend", "frontend"]);

        assert_eq!(entries[0].resource.tier, Some(Tier::Project));
        assert_eq!(entries[0].shadowed.len(), 1);
        assert_eq!(entries[0].shadowed[0].tier, Tier::Bundled);
        assert!(entries[1].shadowed.is_empty());
    }

    #[test]
    fn test_inspect_tiers_marks_active_copy() {
        let fx = fixture();
        write(fx.roots.user.join("templates/prd.md"), "u");
        write(fx.roots.bundled.join("templates/prd.md"), "b");

        let tiers = inspect_tiers(ResourceKind::Template, "prd", &fx.roots).unwrap();
        assert!(!tiers[0].exists);
        assert!(tiers[1].exists && tiers[1].active);
        assert!(tiers[2].exists && !tiers[2].active);
    }

    #[test]
    fn test_init_copies_skill_directory() {
        let fx = fixture();
        write(fx.roots.bundled.join("skills/web3/SKILL.md"), "skill");
        write(fx.roots.bundled.join("skills/web3/reference.md"), "extra");

        let outcome = init_resource(ResourceKind::Skill, "web3", &fx.roots, false).unwrap();
        assert_eq!(outcome.source_tier, Tier::Bundled);
        assert!(fx.roots.project.join("skills/web3/SKILL.md").is_file());
        assert!(fx.roots.project.join("skills/web3/reference.md").is_file());

        let again = init_resource(ResourceKind::Skill, "web3", &fx.roots, false);
        assert!(matches!(again, Err(CascadeError::AlreadyExists(_))));
        assert!(init_resource(ResourceKind::Skill, "web3", &fx.roots, true).is_ok());
    }

    #[test]
    fn test_install_copies_bundled_into_user_tier() {
        let fx = fixture();
        write(fx.roots.bundled.join("skills/auditor/SKILL.md"), "# Auditor\n");
        write(fx.roots.bundled.join("skills/auditor/checks.md"), "extra\n");
        write(fx.roots.bundled.join("skills/reviewer/SKILL.md"), "# Bundled\n");
        write(fx.roots.user.join("skills/reviewer/SKILL.md"), "# Mine\n");

        let outcomes = install_resources(ResourceKind::Skill, &fx.roots, false).unwrap();
        let summary: Vec<_> = outcomes.iter().map(|o| (o.name.as_str(), o.installed)).collect();
        assert_eq!(summary, vec![("auditor", true), ("reviewer", false)]);
        assert!(fx.roots.user.join("skills/auditor/checks.md").is_file());
        assert_eq!(
            fs::read_to_string(fx.roots.user.join("skills/reviewer/SKILL.md")).unwrap(),
            "# Mine\n"
        );

        let forced = install_resources(ResourceKind::Skill, &fx.roots, true).unwrap();
        assert!(forced.iter().all(|o| o.installed));
        assert_eq!(
            fs::read_to_string(fx.roots.user.join("skills/reviewer/SKILL.md")).unwrap(),
            "# Bundled\n"
        );
    }

    #[test]
    fn test_install_knowledge_files() {
        let fx = fixture();
        write(fx.roots.bundled.join("knowledge/SECURITY.md"), "# Security\n");
        write(fx.roots.bundled.join("knowledge/notes.txt"), "skip\n");

        let outcomes = install_resources(ResourceKind::Knowledge, &fx.roots, false).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].destination, fx.roots.user.join("knowledge/SECURITY.md"));
        assert!(outcomes[0].destination.is_file());
    }

    #[test]
    fn test_init_prefers_user_copy() {
        let fx = fixture();
        write(fx.roots.user.join("knowledge/CHECKLIST.md"), "user");
        write(fx.roots.bundled.join("knowledge/CHECKLIST.md"), "bundled");

        let outcome = init_resource(ResourceKind::Knowledge, "CHECKLIST", &fx.roots, false).unwrap();
        assert_eq!(outcome.source_tier, Tier::User);
        let copied = fs::read_to_string(fx.roots.project.join("knowledge/CHECKLIST.md")).unwrap();
        assert_eq!(copied, "user");
    }
}
