//! The patch applier.
//!
//! [`PatchEngine`] validates a [`Patch`] up front (fatal on error), then runs
//! each hunk in patch order. Hunk and chunk failures are recorded in the
//! returned [`PatchSummary`] and never stop later hunks: there is no rollback.
//!
//! # Example
//!
//! ```no_run
//! use hashline_patcher::{apply_patch, Anchor, EditFileChunk, Hunk, Patch};
//! use std::path::Path;
//!
//! let patch = Patch::new(vec![Hunk::Edit {
//!     file_path: "src/lib.rs".to_string(),
//!     move_to_path: None,
//!     chunks: vec![EditFileChunk::replace(
//!         [(Anchor::of(3, "let x = 1;"), "let x = 1;".to_string())],
//!         ["let x = 2;"],
//!     )],
//! }]);
//!
//! let summary = apply_patch(Path::new("."), &patch)?;
//! print!("{}", summary.render(false));
//! # Ok::<(), hashline_patcher::ApplyError>(())
//! ```

pub mod chunks;
pub mod locks;

pub use chunks::{
    apply_chunks, locate_chunk, ChunkOutcome, ChunkedEdit, Mismatch, MismatchReason, Resolution,
};
pub use locks::PathLocks;

use crate::config::{ConfigError, EngineConfig};
use crate::edit::{atomic_write, ensure_parent, EditError, Snapshot};
use crate::patch::{EditFileChunk, Hunk, InvalidHunkError, InvalidPatchError, Patch};
use crate::safety::{resolve_patch_path, PathError, WorkspaceGuard};
use crate::summary::{FailedOperation, NoOp, PatchSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures that stop an apply call before any file is touched.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("invalid patch: {0}")]
    InvalidPatch(#[from] InvalidPatchError),

    #[error("unusable working directory: {0}")]
    Workspace(#[source] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why one hunk failed; rendered into the summary's `failed` list.
#[derive(Error, Debug)]
enum HunkError {
    #[error("{}", .0.message)]
    Invalid(#[from] InvalidHunkError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("file already exists")]
    AlreadyExists,

    #[error("file not found")]
    NotFound,

    #[error("not a regular file")]
    NotAFile,

    #[error("destination already exists: {0}")]
    DestinationExists(String),

    #[error("move destination resolves to its source")]
    SameDestination,

    #[error("edited content written to {to} but the source could not be removed: {source}")]
    SourceNotRemoved { to: String, source: EditError },
}

/// Applies patches under one working directory.
///
/// Safe to share between threads: hunks from concurrent calls that touch the
/// same path are serialized by the engine's lock table.
#[derive(Debug)]
pub struct PatchEngine {
    guard: WorkspaceGuard,
    config: EngineConfig,
    locks: PathLocks,
}

/// Resolved source and optional distinct destination of one hunk.
struct Targets {
    source: PathBuf,
    from: String,
    destination: Option<(PathBuf, String)>,
}

impl PatchEngine {
    pub fn new(cwd: impl AsRef<Path>, config: EngineConfig) -> Result<Self, ApplyError> {
        config.validate()?;
        let guard = WorkspaceGuard::new(cwd, &config.forbidden).map_err(ApplyError::Workspace)?;
        Ok(Self {
            guard,
            config,
            locks: PathLocks::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        self.guard.workspace_root()
    }

    pub fn apply(&self, patch: &Patch) -> Result<PatchSummary, ApplyError> {
        self.apply_with_cancel(patch, &AtomicBool::new(false))
    }

    /// Apply `patch`, checking `cancel` before each hunk.
    ///
    /// Hunks not yet started when the flag is raised are reported as failed;
    /// files written by earlier hunks stay on disk.
    pub fn apply_with_cancel(
        &self,
        patch: &Patch,
        cancel: &AtomicBool,
    ) -> Result<PatchSummary, ApplyError> {
        patch.validate()?;

        let mut summary = PatchSummary::default();
        for (idx, hunk) in patch.hunks.iter().enumerate() {
            let path = display_path(hunk.file_path());
            if cancel.load(Ordering::SeqCst) {
                warn!(hunk = idx, path = %path, "apply cancelled");
                summary.record_failure(FailedOperation::new(
                    path,
                    idx,
                    "cancelled before this hunk was applied",
                ));
                continue;
            }
            if let Err(err) = self.apply_hunk(idx, hunk, &mut summary) {
                warn!(hunk = idx, path = %path, error = %err, "{} failed", hunk.kind());
                summary.record_failure(FailedOperation::new(path, idx, err.to_string()));
            }
        }
        Ok(summary)
    }

    fn apply_hunk(
        &self,
        idx: usize,
        hunk: &Hunk,
        summary: &mut PatchSummary,
    ) -> Result<(), HunkError> {
        hunk.validate(idx)?;
        let targets = self.resolve_targets(hunk)?;

        let mut paths = vec![targets.source.as_path()];
        if let Some((destination, _)) = &targets.destination {
            paths.push(destination);
        }
        let _held = self.locks.acquire(&paths);

        match hunk {
            Hunk::Create { contents, .. } => self.create(&targets, contents, summary),
            Hunk::Delete { .. } => self.delete(&targets, summary),
            Hunk::Move { .. } => self.rename(&targets, summary),
            Hunk::Edit { chunks, .. } => self.edit(idx, &targets, chunks, summary),
        }
    }

    fn resolve_targets(&self, hunk: &Hunk) -> Result<Targets, HunkError> {
        let source = self.guard.resolve(hunk.file_path())?;
        let destination = match hunk.move_to_path() {
            Some(raw) => {
                let destination = self.guard.resolve(raw)?;
                if destination == source {
                    if matches!(hunk, Hunk::Move { .. }) {
                        return Err(HunkError::SameDestination);
                    }
                    None
                } else {
                    Some((destination, display_path(raw)))
                }
            }
            None => None,
        };
        Ok(Targets {
            source,
            from: display_path(hunk.file_path()),
            destination,
        })
    }

    fn create(
        &self,
        targets: &Targets,
        contents: &str,
        summary: &mut PatchSummary,
    ) -> Result<(), HunkError> {
        let path = &targets.source;
        if path.exists() || path.is_symlink() {
            return Err(HunkError::AlreadyExists);
        }
        if self.config.create_parent_dirs {
            ensure_parent(path)?;
        }
        atomic_write(path, contents.as_bytes())?;
        info!(path = %targets.from, bytes = contents.len(), "created");
        summary.record_created(&targets.from, contents);
        Ok(())
    }

    fn delete(&self, targets: &Targets, summary: &mut PatchSummary) -> Result<(), HunkError> {
        let path = &targets.source;
        require_file(path)?;
        let bytes = fs::read(path).map_err(|e| EditError::io(path, e))?;
        fs::remove_file(path).map_err(|e| EditError::io(path, e))?;
        info!(path = %targets.from, "deleted");
        summary.record_deleted(&targets.from, &String::from_utf8_lossy(&bytes));
        Ok(())
    }

    fn rename(&self, targets: &Targets, summary: &mut PatchSummary) -> Result<(), HunkError> {
        let (destination, to) = targets
            .destination
            .as_ref()
            .ok_or(HunkError::SameDestination)?;
        require_file(&targets.source)?;
        if destination.exists() || destination.is_symlink() {
            return Err(HunkError::DestinationExists(to.clone()));
        }
        self.move_file(&targets.source, destination)?;
        info!(from = %targets.from, to = %to, "moved");
        summary.record_moved(&targets.from, to);
        Ok(())
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), EditError> {
        if self.config.create_parent_dirs {
            ensure_parent(to)?;
        }
        fs::rename(from, to).map_err(|e| EditError::io(from, e))
    }

    fn edit(
        &self,
        idx: usize,
        targets: &Targets,
        chunks: &[EditFileChunk],
        summary: &mut PatchSummary,
    ) -> Result<(), HunkError> {
        let path = &targets.source;
        require_file(path)?;
        if let Some((destination, to)) = &targets.destination {
            if destination.exists() || destination.is_symlink() {
                return Err(HunkError::DestinationExists(to.clone()));
            }
        }

        let snapshot = Snapshot::read(path)?;
        self.write_edit(idx, targets, chunks, &snapshot, summary)
    }

    /// Run `chunks` against `snapshot` and write the result.
    fn write_edit(
        &self,
        idx: usize,
        targets: &Targets,
        chunks: &[EditFileChunk],
        snapshot: &Snapshot,
        summary: &mut PatchSummary,
    ) -> Result<(), HunkError> {
        let path = &targets.source;
        let edit = apply_chunks(&snapshot.content, chunks, self.config.drift_window);

        let mut complete = true;
        for (chunk_idx, mismatch) in edit.failures() {
            complete = false;
            warn!(
                path = %targets.from,
                hunk = idx,
                chunk = chunk_idx,
                reason = %mismatch.reason,
                "chunk did not apply"
            );
            summary.record_failure(FailedOperation {
                chunk: Some(chunk_idx),
                expected: Some(mismatch.expected.clone()),
                actual: Some(mismatch.actual.clone()),
                suggest: mismatch.suggest.clone(),
                ..FailedOperation::new(&targets.from, idx, mismatch.reason.to_string())
            });
        }
        for outcome in &edit.outcomes {
            if let ChunkOutcome::NoOp { line, .. } = outcome {
                summary.record_noop(NoOp {
                    path: targets.from.clone(),
                    line: *line,
                    reason: "new lines already match the current content".to_string(),
                });
            }
        }

        let destination = match &targets.destination {
            Some(_) if !complete => {
                summary.record_failure(FailedOperation::new(
                    &targets.from,
                    idx,
                    format!(
                        "moveToPath skipped: not every chunk applied, file left at {}",
                        targets.from
                    ),
                ));
                None
            }
            other => other.as_ref(),
        };

        let changed = edit.changed(&snapshot.content);
        if (changed || destination.is_some()) && self.config.verify_unchanged {
            snapshot.verify_unchanged()?;
        }

        let final_path = match destination {
            Some((to_path, to)) if changed => {
                if self.config.create_parent_dirs {
                    ensure_parent(to_path)?;
                }
                atomic_write(to_path, edit.content.as_bytes())?;
                summary.record_edited(&targets.from, to, &snapshot.content, &edit.content);
                if edit.live() {
                    record_live(summary, to);
                }
                fs::remove_file(path).map_err(|source| HunkError::SourceNotRemoved {
                    to: to.clone(),
                    source: EditError::io(path, source),
                })?;
                info!(from = %targets.from, to = %to, changed, "moved");
                summary.record_moved(&targets.from, to);
                return Ok(());
            }
            Some((to_path, to)) => {
                self.move_file(path, to_path)?;
                info!(from = %targets.from, to = %to, changed, "moved");
                summary.record_moved(&targets.from, to);
                to
            }
            None if changed => {
                atomic_write(path, edit.content.as_bytes())?;
                info!(path = %targets.from, "edited");
                summary.record_edited(&targets.from, &targets.from, &snapshot.content, &edit.content);
                &targets.from
            }
            None => {
                debug!(path = %targets.from, "no content change, nothing written");
                &targets.from
            }
        };

        if edit.live() {
            record_live(summary, final_path);
        }
        Ok(())
    }
}

fn record_live(summary: &mut PatchSummary, path: &str) {
    warn!(path = %path, "anchors drifted; chunks matched at relocated lines");
    summary.record_live(path);
}

/// Apply `patch` under `cwd` with the default configuration.
pub fn apply_patch(cwd: impl AsRef<Path>, patch: &Patch) -> Result<PatchSummary, ApplyError> {
    PatchEngine::new(cwd, EngineConfig::default())?.apply(patch)
}

fn require_file(path: &Path) -> Result<(), HunkError> {
    if !path.exists() {
        return Err(HunkError::NotFound);
    }
    if !path.is_file() {
        return Err(HunkError::NotAFile);
    }
    Ok(())
}

// Normalized project-relative spelling used in summaries.
fn display_path(raw: &str) -> String {
    resolve_patch_path(Path::new(""), raw)
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Anchor;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> PatchEngine {
        PatchEngine::new(dir.path(), EngineConfig::default()).unwrap()
    }

    fn edit(path: &str, chunks: Vec<EditFileChunk>) -> Hunk {
        Hunk::Edit {
            file_path: path.to_string(),
            move_to_path: None,
            chunks,
        }
    }

    fn replace(line: usize, old: &str, new: &str) -> EditFileChunk {
        EditFileChunk::replace([(Anchor::of(line, old), old.to_string())], [new])
    }

    #[test]
    fn test_display_path_normalizes() {
        assert_eq!(display_path("@./src/../a.rs"), "a.rs");
        assert_eq!(display_path(" b.rs "), "b.rs");
    }

    #[test]
    fn test_invalid_patch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = engine(&dir).apply(&Patch::default());
        assert!(matches!(result, Err(ApplyError::InvalidPatch(_))));
    }

    #[test]
    fn test_edit_in_place() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let patch = Patch::new(vec![edit("a.txt", vec![replace(2, "two", "TWO")])]);

        let summary = engine(&dir).apply(&patch).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.edited, vec!["a.txt"]);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\nTWO\n");
    }

    #[test]
    fn test_move_skipped_when_chunk_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let patch = Patch::new(vec![Hunk::Edit {
            file_path: "a.txt".to_string(),
            move_to_path: Some("b.txt".to_string()),
            chunks: vec![replace(1, "one", "ONE"), replace(2, "stale", "x")],
        }]);

        let summary = engine(&dir).apply(&patch).unwrap();
        assert_eq!(summary.edited, vec!["a.txt"]);
        assert!(summary.moved.is_empty());
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.failed[1].error.starts_with("moveToPath skipped"));
        assert!(!dir.path().join("b.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "ONE\ntwo\n");
    }

    #[test]
    fn test_external_write_between_read_and_write_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let engine = engine(&dir);
        let hunk = edit("a.txt", vec![replace(1, "x", "y")]);
        let targets = engine.resolve_targets(&hunk).unwrap();
        let snapshot = Snapshot::read(&targets.source).unwrap();

        fs::write(dir.path().join("a.txt"), "x\nexternal\n").unwrap();

        let Hunk::Edit { chunks, .. } = &hunk else {
            unreachable!()
        };
        let mut summary = PatchSummary::default();
        let result = engine.write_edit(0, &targets, chunks, &snapshot, &mut summary);
        assert!(matches!(
            result,
            Err(HunkError::Edit(EditError::ModifiedDuringApply(_)))
        ));
        assert!(summary.edited.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "x\nexternal\n"
        );
    }

    #[test]
    fn test_external_write_ignored_when_verification_disabled() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let config = EngineConfig {
            verify_unchanged: false,
            ..EngineConfig::default()
        };
        let engine = PatchEngine::new(dir.path(), config).unwrap();
        let hunk = edit("a.txt", vec![replace(1, "x", "y")]);
        let targets = engine.resolve_targets(&hunk).unwrap();
        let snapshot = Snapshot::read(&targets.source).unwrap();

        fs::write(dir.path().join("a.txt"), "x\nexternal\n").unwrap();

        let Hunk::Edit { chunks, .. } = &hunk else {
            unreachable!()
        };
        let mut summary = PatchSummary::default();
        engine
            .write_edit(0, &targets, chunks, &snapshot, &mut summary)
            .unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "y\n");
    }

    #[test]
    fn test_drifted_noop_still_reports_live() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "h1\nh2\nh3\na\nb\n").unwrap();
        let patch = Patch::new(vec![edit("f.txt", vec![replace(2, "b", "b")])]);

        let summary = engine(&dir).apply(&patch).unwrap();
        assert!(summary.is_success());
        assert!(summary.edited.is_empty());
        assert_eq!(summary.noops.len(), 1);
        assert_eq!(summary.noops[0].line, 5);
        assert_eq!(summary.live, vec!["f.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_edit_recorded_when_moved_source_cannot_be_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("a.txt"), "one\ntwo\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        // Privileged users can still unlink in read-only directories
        if fs::write(locked.join("check"), "").is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let patch = Patch::new(vec![Hunk::Edit {
            file_path: "locked/a.txt".to_string(),
            move_to_path: Some("b.txt".to_string()),
            chunks: vec![replace(2, "two", "TWO")],
        }]);
        let summary = engine(&dir).apply(&patch).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(summary.edited, vec!["b.txt"]);
        assert!(summary.moved.is_empty());
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].error.contains("source could not be removed"));
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "one\nTWO\n");
        assert!(locked.join("a.txt").exists());
    }

    #[test]
    fn test_forbidden_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let patch = Patch::new(vec![Hunk::Create {
            file_path: ".git/config".to_string(),
            contents: "x".to_string(),
        }]);
        let summary = engine(&dir).apply(&patch).unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].error.contains("forbidden"));
        assert!(!dir.path().join(".git/config").exists());
    }

    #[test]
    fn test_parent_dirs_not_created_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            create_parent_dirs: false,
            ..EngineConfig::default()
        };
        let engine = PatchEngine::new(dir.path(), config).unwrap();
        let patch = Patch::new(vec![Hunk::Create {
            file_path: "nested/a.txt".to_string(),
            contents: "x".to_string(),
        }]);
        let summary = engine.apply(&patch).unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.created.is_empty());
    }
}
