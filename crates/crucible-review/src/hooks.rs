//! Git pre-commit hook management
//!
//! The hook is a small shell script that runs `crucible pre-commit` against
//! the staged changes. Only scripts carrying [`HOOK_MARKER`] are treated as
//! ours; anything else in the hook slot is left alone unless forced.

use crate::error::{Result, ReviewError};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Line identifying a hook written by crucible
pub const HOOK_MARKER: &str = "# Crucible pre-commit hook";

/// Script installed as `.git/hooks/pre-commit`
pub const PRE_COMMIT_SCRIPT: &str = r#"#!/bin/sh
# Crucible pre-commit hook
# Reviews staged changes and blocks the commit when findings reach the threshold.

crucible pre-commit "$@"
exit_code=$?

if [ $exit_code -ne 0 ]; then
    echo ""
    echo "Commit blocked by crucible review. Use 'git commit --no-verify' to bypass."
fi

exit $exit_code
"#;

/// What occupies the pre-commit slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    /// Our hook
    Installed,
    /// Some other pre-commit hook
    Foreign,
    Absent,
}

/// Result of an install request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookInstall {
    Written,
    /// Our hook was already there and was left untouched
    AlreadyInstalled,
}

/// Path of the pre-commit hook for a repository root
pub fn hook_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".git").join("hooks").join("pre-commit")
}

pub fn hook_status(repo_root: &Path) -> Result<HookStatus> {
    let path = hook_path(repo_root);
    if !path.exists() {
        return Ok(HookStatus::Absent);
    }
    Ok(if is_crucible_hook(&path)? {
        HookStatus::Installed
    } else {
        HookStatus::Foreign
    })
}

/// Write the pre-commit hook
///
/// A foreign hook is only replaced with `force`; our own hook is rewritten
/// only with `force`.
pub fn install_hook(repo_root: &Path, force: bool) -> Result<HookInstall> {
    let path = hook_path(repo_root);
    match hook_status(repo_root)? {
        HookStatus::Installed if !force => return Ok(HookInstall::AlreadyInstalled),
        HookStatus::Foreign if !force => return Err(ReviewError::ForeignHook(path)),
        _ => {}
    }

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&path, PRE_COMMIT_SCRIPT)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
    }

    info!("Installed pre-commit hook at {}", path.display());
    Ok(HookInstall::Written)
}

/// Remove our pre-commit hook; returns whether anything was removed
pub fn uninstall_hook(repo_root: &Path) -> Result<bool> {
    let path = hook_path(repo_root);
    match hook_status(repo_root)? {
        HookStatus::Absent => Ok(false),
        HookStatus::Foreign => Err(ReviewError::ForeignHook(path)),
        HookStatus::Installed => {
            fs::remove_file(&path)?;
            info!("Removed pre-commit hook at {}", path.display());
            Ok(true)
        }
    }
}

fn is_crucible_hook(path: &Path) -> Result<bool> {
    let content = fs::read_to_string(path)?;
    Ok(content.contains(HOOK_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git/hooks")).unwrap();
        tmp
    }

    #[test]
    fn test_install_and_uninstall() {
        let tmp = repo();
        assert_eq!(hook_status(tmp.path()).unwrap(), HookStatus::Absent);

        assert_eq!(install_hook(tmp.path(), false).unwrap(), HookInstall::Written);
        assert_eq!(hook_status(tmp.path()).unwrap(), HookStatus::Installed);
        let script = fs::read_to_string(hook_path(tmp.path())).unwrap();
        assert!(script.contains("crucible pre-commit"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(hook_path(tmp.path())).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        assert_eq!(install_hook(tmp.path(), false).unwrap(), HookInstall::AlreadyInstalled);

        assert!(uninstall_hook(tmp.path()).unwrap());
        assert_eq!(hook_status(tmp.path()).unwrap(), HookStatus::Absent);
        assert!(!uninstall_hook(tmp.path()).unwrap());
    }

    #[test]
    fn test_foreign_hook_is_left_alone() {
        let tmp = repo();
        fs::write(hook_path(tmp.path()), "#!/bin/sh\nmake lint\n").unwrap();
        assert_eq!(hook_status(tmp.path()).unwrap(), HookStatus::Foreign);

        assert!(matches!(install_hook(tmp.path(), false), Err(ReviewError::ForeignHook(_))));
        assert!(matches!(uninstall_hook(tmp.path()), Err(ReviewError::ForeignHook(_))));
        assert_eq!(
            fs::read_to_string(hook_path(tmp.path())).unwrap(),
            "#!/bin/sh\nmake lint\n"
        );

        assert_eq!(install_hook(tmp.path(), true).unwrap(), HookInstall::Written);
        assert_eq!(hook_status(tmp.path()).unwrap(), HookStatus::Installed);
    }

    #[test]
    fn test_install_creates_hooks_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        install_hook(tmp.path(), false).unwrap();
        assert!(hook_path(tmp.path()).is_file());
    }
}
