//! `.crucibleignore` handling
//!
//! Gitignore syntax, matched with the `ignore` crate. Built-in defaults come
//! first, then the bundled, user and project ignore files, then configured
//! excludes. The last matching line decides, and a file under an ignored
//! directory is ignored with it.

use crucible_skills::cascade::IGNORE_FILE;
use crucible_skills::CascadeRoots;
use crucible_types::{Degraded, DegradedKind, Tier};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Paths never worth reviewing
pub const DEFAULT_PATTERNS: &[&str] = &[
    ".git/",
    ".hg/",
    ".svn/",
    "node_modules/",
    "vendor/",
    "bower_components/",
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    ".venv/",
    "venv/",
    ".tox/",
    ".nox/",
    ".pytest_cache/",
    ".mypy_cache/",
    ".ruff_cache/",
    "*.egg-info/",
    "build/",
    "dist/",
    "out/",
    "target/",
    "_build/",
    ".idea/",
    ".vscode/",
    "*.swp",
    "*.swo",
    "*~",
    ".DS_Store",
    "coverage/",
    ".coverage",
    "htmlcov/",
    ".nyc_output/",
    "*.log",
    "logs/",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "poetry.lock",
    "Cargo.lock",
    "composer.lock",
    "Gemfile.lock",
    ".next/",
    ".nuxt/",
    ".output/",
    ".cache/",
    ".parcel-cache/",
    ".turbo/",
];

/// Compiled ignore rules, matched against paths relative to the project root
#[derive(Debug, Clone)]
pub struct IgnoreSpec {
    matcher: Gitignore,
    /// Sources that contributed rules, lowest priority first
    pub sources: Vec<String>,
}

/// Collects rule lines in priority order before compiling them
struct RulesBuilder {
    builder: GitignoreBuilder,
    sources: Vec<String>,
    degraded: Vec<Degraded>,
}

impl RulesBuilder {
    fn new() -> Self {
        let mut rules = Self {
            builder: GitignoreBuilder::new("."),
            sources: Vec::new(),
            degraded: Vec::new(),
        };
        rules.add_lines(DEFAULT_PATTERNS.iter().copied(), "default", None);
        rules
    }

    fn add_lines<'a>(&mut self, lines: impl Iterator<Item = &'a str>, source: &str, from: Option<&Path>) {
        for (n, line) in lines.enumerate() {
            if let Err(e) = self.builder.add_line(from.map(Path::to_path_buf), line) {
                warn!("Bad ignore pattern at {}:{}: {}", source, n + 1, e);
                self.degraded.push(Degraded::new(
                    DegradedKind::Parse,
                    format!("{}:{}", source, n + 1),
                    e.to_string(),
                ));
            }
        }
        self.sources.push(source.to_string());
    }

    fn add_file(&mut self, path: &Path) {
        let source = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(content) => self.add_lines(content.lines(), &source, Some(path)),
            Err(e) => {
                warn!("Failed to read {}: {}", source, e);
                self.degraded
                    .push(Degraded::new(DegradedKind::Io, source, e.to_string()));
            }
        }
    }

    fn build(mut self) -> (IgnoreSpec, Vec<Degraded>) {
        let matcher = match self.builder.build() {
            Ok(matcher) => matcher,
            Err(e) => {
                self.degraded
                    .push(Degraded::new(DegradedKind::Parse, "ignore", e.to_string()));
                Gitignore::empty()
            }
        };
        debug!(
            "Ignore rules: {} pattern(s) from {}",
            matcher.len(),
            self.sources.join(", ")
        );
        (
            IgnoreSpec {
                matcher,
                sources: self.sources,
            },
            self.degraded,
        )
    }
}

impl IgnoreSpec {
    /// Built-in defaults only
    pub fn defaults() -> Self {
        RulesBuilder::new().build().0
    }

    /// Defaults layered with the bundled, user and project ignore files, then `extra`
    ///
    /// Unreadable files and bad patterns are reported and skipped.
    pub fn load<S: AsRef<str>>(roots: &CascadeRoots, extra: &[S]) -> (Self, Vec<Degraded>) {
        let mut rules = RulesBuilder::new();
        for tier in Tier::ORDER.iter().rev() {
            let path = roots.root(*tier).join(IGNORE_FILE);
            if path.is_file() {
                rules.add_file(&path);
            }
        }
        if !extra.is_empty() {
            rules.add_lines(extra.iter().map(|p| p.as_ref()), "config", None);
        }
        rules.build()
    }

    /// Compile rules from ignore-file text on top of the defaults
    pub fn from_content(content: &str) -> (Self, Vec<Degraded>) {
        let mut rules = RulesBuilder::new();
        rules.add_lines(content.lines(), "inline", None);
        rules.build()
    }

    pub fn len(&self) -> usize {
        self.matcher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matcher.is_empty()
    }

    /// Whether a path relative to the project root is ignored
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let path = normalize(path);
        let path = Path::new(&path);
        // Paths outside the root cannot be matched
        if path.as_os_str().is_empty() || path.has_root() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }

    /// Same as [`is_ignored`](Self::is_ignored), relative to `base`
    pub fn is_ignored_path(&self, path: &Path, base: &Path) -> bool {
        self.is_ignored_under(path, base, path.is_dir())
    }

    fn is_ignored_under(&self, path: &Path, base: &Path, is_dir: bool) -> bool {
        match path.strip_prefix(base) {
            Ok(relative) => self.is_ignored(&relative.to_string_lossy(), is_dir),
            Err(_) => false,
        }
    }

    /// Files under `root` that are not ignored, sorted by path
    ///
    /// Ignored directories are not descended into. Entries that cannot be read
    /// are reported and skipped.
    pub fn walk(&self, root: &Path, base: &Path) -> (Vec<PathBuf>, Vec<Degraded>) {
        let rules = self.clone();
        let filter_base = base.to_path_buf();

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                entry.depth() == 0 || !rules.is_ignored_under(entry.path(), &filter_base, is_dir)
            });

        let mut files = Vec::new();
        let mut degraded = Vec::new();
        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|t| t.is_file()) {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    debug!("Walk error under {}: {}", root.display(), e);
                    degraded.push(Degraded::new(
                        DegradedKind::Io,
                        root.display().to_string(),
                        e.to_string(),
                    ));
                }
            }
        }
        (files, degraded)
    }
}

fn normalize(path: &str) -> String {
    let mut path = path.replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rules(lines: &str) -> IgnoreSpec {
        let (compiled, degraded) = IgnoreSpec::from_content(lines);
        assert!(degraded.is_empty());
        compiled
    }

    #[test]
    fn test_defaults() {
        let defaults = IgnoreSpec::defaults();
        assert!(defaults.is_ignored("node_modules/react/index.js", false));
        assert!(defaults.is_ignored("app/node_modules/x.js", false));
        assert!(defaults.is_ignored("server.log", false));
        assert!(defaults.is_ignored("Cargo.lock", false));
        assert!(defaults.is_ignored("./target/debug/app", false));
        assert!(!defaults.is_ignored("src/main.rs", false));
        assert_eq!(defaults.sources, vec!["default"]);
    }

    #[test]
    fn test_directory_only() {
        let compiled = rules("cache/\n");
        assert!(compiled.is_ignored("cache", true));
        assert!(!compiled.is_ignored("cache", false));
        assert!(compiled.is_ignored("cache/out.js", false));
        assert!(compiled.is_ignored("pkg/cache/out.js", false));
    }

    #[test]
    fn test_negation_last_match_wins() {
        let compiled = rules("*.txt\n!keep.txt\n");
        assert!(compiled.is_ignored("debug.txt", false));
        assert!(!compiled.is_ignored("notes/keep.txt", false));

        let reignored = rules("*.txt\n!keep.txt\nkeep.txt\n");
        assert!(reignored.is_ignored("keep.txt", false));
    }

    #[test]
    fn test_anchored_patterns() {
        let compiled = rules("docs/generated/\nsrc/*.gen.py\n/local.py\n");
        assert!(compiled.is_ignored("docs/generated/api.md", false));
        assert!(compiled.is_ignored("src/models.gen.py", false));
        assert!(!compiled.is_ignored("pkg/src/models.gen.py", false));
        assert!(!compiled.is_ignored("src/models.py", false));
        assert!(compiled.is_ignored("local.py", false));
        assert!(!compiled.is_ignored("pkg/local.py", false));
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let base = IgnoreSpec::defaults().len();
        let compiled = rules("# generated\n\n   \n*.min.js\n");
        assert_eq!(compiled.len(), base + 1);
        assert!(compiled.is_ignored("app.min.js", false));
    }

    #[test]
    fn test_bad_pattern_is_degraded() {
        let (compiled, degraded) = IgnoreSpec::from_content("*.tmp\n[z-a\n");
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].item, "inline:2");
        assert!(compiled.is_ignored("a.tmp", false));
    }

    #[test]
    fn test_load_layers_project_over_defaults() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let bundled = TempDir::new().unwrap();
        fs::write(user.path().join(IGNORE_FILE), "fixtures/\n").unwrap();
        fs::write(project.path().join(IGNORE_FILE), "!Cargo.lock\n").unwrap();

        let roots = CascadeRoots::new(project.path(), user.path(), bundled.path());
        let (loaded, degraded) = IgnoreSpec::load(&roots, &["*.snap"]);

        assert!(degraded.is_empty());
        assert_eq!(loaded.sources.len(), 4);
        assert_eq!(loaded.sources.last().map(String::as_str), Some("config"));
        assert!(!loaded.is_ignored("Cargo.lock", false));
        assert!(loaded.is_ignored("tests/fixtures/bad.py", false));
        assert!(loaded.is_ignored("tests/__snapshots__/a.snap", false));
    }

    #[test]
    fn test_is_ignored_path_relative_to_base() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("dist").join("bundle.js");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "x").unwrap();

        let defaults = IgnoreSpec::defaults();
        assert!(defaults.is_ignored_path(&file, dir.path()));
        assert!(defaults.is_ignored_path(&dir.path().join("dist"), dir.path()));
        assert!(!defaults.is_ignored_path(Path::new("/elsewhere/dist/x.js"), dir.path()));
    }

    #[test]
    fn test_walk_skips_ignored_directories() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("src/nested")).unwrap();
        fs::create_dir_all(base.join("node_modules/pkg")).unwrap();
        fs::write(base.join("src/b.py"), "").unwrap();
        fs::write(base.join("src/a.py"), "").unwrap();
        fs::write(base.join("src/nested/c.py"), "").unwrap();
        fs::write(base.join("src/debug.log"), "").unwrap();
        fs::write(base.join("node_modules/pkg/index.js"), "").unwrap();

        let (files, degraded) = IgnoreSpec::defaults().walk(base, base);
        assert!(degraded.is_empty());
        let relative: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(base).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(relative, vec!["src/a.py", "src/b.py", "src/nested/c.py"]);
    }
}
