//! Git change context
//!
//! Runs `git diff -U0` for the requested mode and reads the added line ranges
//! per file. Deleted files never appear in the result.

use crate::error::{Result, ReviewError};
use crucible_enforcement::{ChangedFile, LineRange};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for git subprocesses
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which changes to review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "target", rename_all = "snake_case")]
pub enum GitMode {
    /// Index against HEAD
    Staged,
    /// Working tree against the index
    Unstaged,
    /// Everything on HEAD since it diverged from this base branch
    Branch(String),
    /// A single commit
    Commit(String),
}

impl GitMode {
    fn diff_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["diff", "-U0", "--no-color", "--no-ext-diff"]
            .into_iter()
            .map(String::from)
            .collect();
        match self {
            Self::Staged => args.push("--cached".into()),
            Self::Unstaged => {}
            Self::Branch(base) => args.push(format!("{base}...HEAD")),
            Self::Commit(rev) => args.push(format!("{rev}^!")),
        }
        args
    }
}

impl std::fmt::Display for GitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Staged => f.write_str("staged"),
            Self::Unstaged => f.write_str("unstaged"),
            Self::Branch(base) => write!(f, "branch {base}...HEAD"),
            Self::Commit(rev) => write!(f, "commit {rev}"),
        }
    }
}

async fn git_command_with_timeout(
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<std::process::Output> {
    let command = format!("git {}", args.join(" "));
    let future = Command::new("git").args(args).current_dir(cwd).output();

    let output = match tokio::time::timeout(timeout, future).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ReviewError::GitTimeout {
                command,
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(ReviewError::GitFailed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Top-level directory of the repository containing `cwd`
pub async fn repo_root(cwd: &Path, timeout: Duration) -> Result<PathBuf> {
    let args = vec!["rev-parse".to_string(), "--show-toplevel".to_string()];
    let output = git_command_with_timeout(&args, cwd, timeout).await?;
    Ok(PathBuf::from(String::from_utf8_lossy(&output.stdout).trim()))
}

/// Files and added line ranges for a git mode, paths relative to the repository root
pub async fn changed_files(repo: &Path, mode: &GitMode, timeout: Duration) -> Result<Vec<ChangedFile>> {
    let output = git_command_with_timeout(&mode.diff_args(), repo, timeout).await?;
    let files = parse_diff(&String::from_utf8_lossy(&output.stdout));
    debug!("{} file(s) changed ({})", files.len(), mode);
    Ok(files)
}

/// Content of a changed file as seen by `mode`
///
/// Staged reviews read the index and commit reviews read the commit; the
/// other modes read the working tree.
pub async fn file_content(repo: &Path, mode: &GitMode, path: &str, timeout: Duration) -> Result<String> {
    let spec = match mode {
        GitMode::Staged => format!(":{path}"),
        GitMode::Commit(rev) => format!("{rev}:{path}"),
        GitMode::Unstaged | GitMode::Branch(_) => {
            return Ok(tokio::fs::read_to_string(repo.join(path)).await?);
        }
    };
    let args = vec!["show".to_string(), spec];
    let output = git_command_with_timeout(&args, repo, timeout).await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse unified diff output with zero context lines
pub fn parse_diff(diff: &str) -> Vec<ChangedFile> {
    let mut files: Vec<ChangedFile> = Vec::new();
    let mut current: Option<ChangedFile> = None;
    // Hunk bodies may contain lines that look like file headers
    let mut in_header = true;

    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            files.extend(current.take());
            in_header = true;
        } else if let Some(target) = line.strip_prefix("+++ ").filter(|_| in_header) {
            files.extend(current.take());
            let target = target.trim().trim_matches('"');
            if target != "/dev/null" {
                let path = target.strip_prefix("b/").unwrap_or(target);
                current = Some(ChangedFile {
                    path: path.to_string(),
                    added: Vec::new(),
                });
            }
        } else if line.starts_with("@@") {
            in_header = false;
            if let (Some(file), Some(range)) = (current.as_mut(), parse_hunk_header(line)) {
                file.added.push(range);
            }
        }
    }
    files.extend(current);
    files
}

/// Added range from `@@ -a,b +c,d @@`; `None` for pure deletions
fn parse_hunk_header(line: &str) -> Option<LineRange> {
    let added = line
        .split_whitespace()
        .find_map(|part| part.strip_prefix('+'))?;
    let (start, count) = match added.split_once(',') {
        Some((start, count)) => (start.parse().ok()?, count.parse().ok()?),
        None => (added.parse().ok()?, 1),
    };
    (count > 0).then(|| LineRange::new(start, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIFF: &str = "\
diff --git a/src/app.py b/src/app.py
index 83db48f..bf2a3c1 100644
--- a/src/app.py
+++ b/src/app.py
@@ -3,0 +4,2 @@ import os
+import pickle
+++ counter
@@ -20 +22 @@ def main():
-    eval(x)
+    run(x)
@@ -30,2 +31,0 @@ def tail():
-    a
-    b
diff --git a/old.py b/old.py
deleted file mode 100644
--- a/old.py
+++ /dev/null
@@ -1,3 +0,0 @@
-x
-y
-z
diff --git a/docs/new.md b/docs/new.md
new file mode 100644
--- /dev/null
+++ b/docs/new.md
@@ -0,0 +1,3 @@
+# Title
+
+Body
";

    #[test]
    fn test_parse_diff() {
        let files = parse_diff(DIFF);
        assert_eq!(files.len(), 2);

        assert_eq!(files[0].path, "src/app.py");
        assert_eq!(files[0].added, vec![LineRange::new(4, 2), LineRange::new(22, 1)]);

        assert_eq!(files[1].path, "docs/new.md");
        assert_eq!(files[1].added, vec![LineRange { start: 1, end: 3 }]);
    }

    #[test]
    fn test_hunk_header() {
        assert_eq!(parse_hunk_header("@@ -1 +1 @@"), Some(LineRange::new(1, 1)));
        assert_eq!(parse_hunk_header("@@ -5,2 +5,0 @@"), None);
        assert_eq!(parse_hunk_header("@@ garbage @@"), None);
    }

    #[test]
    fn test_diff_args() {
        assert!(GitMode::Staged.diff_args().contains(&"--cached".to_string()));
        assert_eq!(
            GitMode::Branch("main".into()).diff_args().last().map(String::as_str),
            Some("main...HEAD")
        );
        assert_eq!(
            GitMode::Commit("abc123".into()).diff_args().last().map(String::as_str),
            Some("abc123^!")
        );
    }

    #[tokio::test]
    async fn test_git_outside_repository_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = changed_files(dir.path(), &GitMode::Unstaged, DEFAULT_GIT_TIMEOUT).await;
        assert!(matches!(
            result,
            Err(ReviewError::GitFailed { .. }) | Err(ReviewError::Io(_))
        ));
    }
}
