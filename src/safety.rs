//! Patch path handling: relative-path cleanup, resolution against the working
//! directory and workspace containment.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("patch path is empty")]
    Empty,

    #[error("patch path must be relative to the project, got absolute path: {0}")]
    Absolute(String),

    #[error("patch path escapes the working directory: {0}")]
    Escapes(String),

    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Clean a caller-supplied path: drop one leading `@`, trim, and reject empty
/// or absolute paths.
pub fn ensure_relative_patch_path(raw: &str) -> Result<String, PathError> {
    let trimmed = raw.trim();
    let cleaned = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if cleaned.is_empty() {
        return Err(PathError::Empty);
    }
    if looks_absolute(cleaned) {
        return Err(PathError::Absolute(cleaned.to_string()));
    }
    Ok(cleaned.to_string())
}

// `Path::is_absolute` is platform dependent; reject every spelling on every platform.
fn looks_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    Path::new(path).is_absolute()
        || path.starts_with('/')
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Join a cleaned relative path onto `cwd`. Purely lexical: no filesystem access.
///
/// `..` segments are folded; one that would climb above `cwd` is an error.
pub fn resolve_patch_path(cwd: &Path, raw: &str) -> Result<PathBuf, PathError> {
    let relative = ensure_relative_patch_path(raw)?;
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathError::Escapes(relative));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(relative));
            }
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts.iter().fold(cwd.to_path_buf(), |acc, part| acc.join(part)))
}

/// Workspace boundary checks for resolved patch targets.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical workspace root
    workspace_root: PathBuf,
    /// Directories (canonical where they exist) that may never be written
    forbidden_paths: Vec<PathBuf>,
}

impl WorkspaceGuard {
    /// `forbidden` entries are workspace-relative directories such as `.git`.
    pub fn new(
        workspace_root: impl AsRef<Path>,
        forbidden: &[PathBuf],
    ) -> Result<Self, PathError> {
        let root = workspace_root.as_ref();
        let workspace_root = root.canonicalize().map_err(|source| PathError::Canonicalize {
            path: root.to_path_buf(),
            source,
        })?;
        let forbidden_paths = forbidden
            .iter()
            .map(|dir| {
                let joined = workspace_root.join(dir);
                joined.canonicalize().unwrap_or(joined)
            })
            .collect();
        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Resolve a patch path and check it stays inside the workspace.
    ///
    /// Works for paths that do not exist yet: the nearest existing ancestor is
    /// canonicalized (following symlinks) and the remainder re-attached.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathError> {
        let lexical = resolve_patch_path(&self.workspace_root, raw)?;
        let canonical = canonicalize_lenient(&lexical)?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), PathError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(PathError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(PathError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }
}

fn canonicalize_lenient(path: &Path) -> Result<PathBuf, PathError> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        if existing.exists() || existing.is_symlink() {
            break;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    let base = existing
        .canonicalize()
        .map_err(|source| PathError::Canonicalize {
            path: existing.to_path_buf(),
            source,
        })?;
    Ok(missing.iter().rev().fold(base, |acc, name| acc.join(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_ensure_relative_strips_at_and_whitespace() {
        assert_eq!(ensure_relative_patch_path("@src/main.rs").unwrap(), "src/main.rs");
        assert_eq!(ensure_relative_patch_path("  src/lib.rs \n").unwrap(), "src/lib.rs");
        assert_eq!(ensure_relative_patch_path(" @ a.txt").unwrap(), "a.txt");
    }

    #[test]
    fn test_ensure_relative_rejects_empty_and_absolute() {
        assert!(matches!(ensure_relative_patch_path(""), Err(PathError::Empty)));
        assert!(matches!(ensure_relative_patch_path("@"), Err(PathError::Empty)));
        assert!(matches!(
            ensure_relative_patch_path("/etc/passwd"),
            Err(PathError::Absolute(_))
        ));
        assert!(matches!(
            ensure_relative_patch_path("@/etc/passwd"),
            Err(PathError::Absolute(_))
        ));
        assert!(matches!(
            ensure_relative_patch_path("C:\\Windows"),
            Err(PathError::Absolute(_))
        ));
    }

    #[test]
    fn test_resolve_patch_path_rejects_absolute_without_io() {
        let cwd = Path::new("/definitely/not/a/real/dir");
        assert!(matches!(
            resolve_patch_path(cwd, "/etc/passwd"),
            Err(PathError::Absolute(_))
        ));
    }

    #[test]
    fn test_resolve_patch_path_joins_and_folds() {
        let cwd = Path::new("/work");
        assert_eq!(
            resolve_patch_path(cwd, "src/./a/../b.rs").unwrap(),
            PathBuf::from("/work/src/b.rs")
        );
        assert!(matches!(
            resolve_patch_path(cwd, "../outside.rs"),
            Err(PathError::Escapes(_))
        ));
        assert!(matches!(
            resolve_patch_path(cwd, "src/../../x"),
            Err(PathError::Escapes(_))
        ));
    }

    #[test]
    fn test_guard_resolves_missing_file_inside_workspace() {
        let temp_dir = tempfile::tempdir().unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path(), &[]).unwrap();
        let resolved = guard.resolve("new/dir/file.rs").unwrap();
        assert!(resolved.starts_with(guard.workspace_root()));
        assert!(resolved.ends_with("new/dir/file.rs"));
    }

    #[test]
    fn test_guard_forbidden_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp_dir.path().join(".git")).unwrap();
        let guard = WorkspaceGuard::new(temp_dir.path(), &[PathBuf::from(".git")]).unwrap();
        assert!(matches!(
            guard.resolve(".git/config"),
            Err(PathError::ForbiddenPath { .. })
        ));
        assert!(guard.resolve("src/lib.rs").is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_guard_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let workspace = temp_dir.path().join("workspace");
        fs::create_dir_all(&workspace).unwrap();

        let outside = temp_dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        symlink(&outside, workspace.join("escape")).unwrap();

        let guard = WorkspaceGuard::new(&workspace, &[]).unwrap();
        let result = guard.resolve("escape/secret.rs");

        assert!(matches!(result, Err(PathError::OutsideWorkspace { .. })));
    }
}
