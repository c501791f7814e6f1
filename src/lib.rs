//! Hashline Patcher: hash-anchored line patching for text files
//!
//! A patch engine for callers (typically language models) that cannot be
//! trusted to reproduce file content byte for byte. Files are read with a
//! short content fingerprint on every line; edits refer to lines by
//! `(line number, fingerprint)` anchors instead of by quoted context.
//!
//! # Architecture
//!
//! - [`normalize`] and [`hash`]: whitespace- and Unicode-insensitive 2-hex-digit
//!   line fingerprints.
//! - [`anchor`]: the `"<line><hash>|<text>"` read format.
//! - [`patch`]: typed create/delete/move/edit hunks, loaded from JSON or TOML.
//! - [`apply`]: anchor resolution with bounded drift search, per-file
//!   best-effort application, per-path locking.
//! - [`summary`]: one report with created/edited/moved/deleted files, failures
//!   with suggested anchors, drifted ("live") files, diffs and no-ops.
//!
//! # Safety
//!
//! - Anchors are re-validated against the file at apply time
//! - Atomic file writes (tempfile + fsync + rename)
//! - Paths must be relative and stay inside the working directory
//! - Concurrent modification between read and write is detected
//!
//! # Example
//!
//! ```no_run
//! use hashline_patcher::format_anchored;
//!
//! let content = std::fs::read_to_string("src/main.rs")?;
//! print!("{}", format_anchored(&content));
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod anchor;
pub mod apply;
pub mod config;
pub mod edit;
pub mod hash;
pub mod normalize;
pub mod patch;
pub mod safety;
pub mod summary;

// Re-exports
pub use anchor::{anchors_for, format_anchored, parse_anchored_line, Anchor, AnchorParseError};
pub use apply::{apply_patch, ApplyError, PatchEngine};
pub use config::{discover_config, load_config, ConfigError, EngineConfig};
pub use edit::{EditError, TextFile};
pub use hash::{compute_line_hash, compute_line_hash_with, compute_string_hash, HashMode, LineHash};
pub use normalize::{normalize_for_hash, normalize_unicode, strip_whitespace};
pub use patch::{
    load_from_path, load_from_str, EditFileChunk, Hunk, InvalidHunkError, InvalidPatchError,
    LoadError, Patch, PatchFormat,
};
pub use safety::{ensure_relative_patch_path, resolve_patch_path, PathError, WorkspaceGuard};
pub use summary::{FailedOperation, FileStatus, NoOp, PatchSummary};
