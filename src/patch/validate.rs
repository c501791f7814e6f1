//! Structural checks run before any file is touched.
//!
//! [`Patch::validate`] failures are fatal for the whole patch; [`Hunk::validate`]
//! failures only fail the hunk's own file.

use crate::patch::types::{EditFileChunk, Hunk, Patch};
use crate::safety::{resolve_patch_path, PathError};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug)]
pub struct InvalidPatchError {
    pub issues: Vec<PatchIssue>,
}

impl fmt::Display for InvalidPatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidPatchError {}

#[derive(Debug)]
pub enum PatchIssue {
    EmptyPatch,
    InvalidPath {
        hunk: usize,
        field: &'static str,
        source: PathError,
    },
    Conflict {
        hunk: usize,
        path: String,
        message: String,
    },
}

impl fmt::Display for PatchIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchIssue::EmptyPatch => write!(f, "patch contains no hunks"),
            PatchIssue::InvalidPath { hunk, field, source } => {
                write!(f, "hunk #{hunk}: invalid {field}: {source}")
            }
            PatchIssue::Conflict {
                hunk,
                path,
                message,
            } => write!(f, "hunk #{hunk} ({path}): {message}"),
        }
    }
}

/// A single malformed hunk. `hunk` is the 0-based index in the patch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid hunk #{hunk} ({path}): {message}")]
pub struct InvalidHunkError {
    pub hunk: usize,
    pub path: String,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Presence {
    Present,
    Absent,
}

impl Patch {
    /// Check every path and the per-file operation sequence without touching
    /// the filesystem.
    pub fn validate(&self) -> Result<(), InvalidPatchError> {
        let mut issues = Vec::new();

        if self.hunks.is_empty() {
            issues.push(PatchIssue::EmptyPatch);
        }

        // What earlier hunks of this patch imply about each path
        let mut presence: HashMap<PathBuf, Presence> = HashMap::new();

        for (idx, hunk) in self.hunks.iter().enumerate() {
            let source = match patch_key(hunk.file_path()) {
                Ok(key) => key,
                Err(source) => {
                    issues.push(PatchIssue::InvalidPath {
                        hunk: idx,
                        field: "filePath",
                        source,
                    });
                    continue;
                }
            };
            let target = match hunk.move_to_path().map(patch_key).transpose() {
                Ok(target) => target,
                Err(source) => {
                    issues.push(PatchIssue::InvalidPath {
                        hunk: idx,
                        field: "moveToPath",
                        source,
                    });
                    continue;
                }
            };

            let mut conflict = |message: &str| {
                issues.push(PatchIssue::Conflict {
                    hunk: idx,
                    path: source.display().to_string(),
                    message: message.to_string(),
                })
            };

            let before = presence.get(&source).copied();
            match hunk {
                Hunk::Create { .. } => {
                    if before == Some(Presence::Present) {
                        conflict("create targets a file an earlier hunk already creates or keeps");
                    }
                    presence.insert(source, Presence::Present);
                }
                Hunk::Delete { .. } => {
                    if before == Some(Presence::Absent) {
                        conflict("delete targets a file an earlier hunk already removed");
                    }
                    presence.insert(source, Presence::Absent);
                }
                Hunk::Move { .. } | Hunk::Edit { .. } => {
                    if before == Some(Presence::Absent) {
                        conflict(&format!(
                            "{} targets a file an earlier hunk already removed",
                            hunk.kind()
                        ));
                    }
                    match target.filter(|target| *target != source) {
                        Some(target) => {
                            if presence.get(&target) == Some(&Presence::Present) {
                                conflict("moveToPath targets a file an earlier hunk creates");
                            }
                            presence.insert(source, Presence::Absent);
                            presence.insert(target, Presence::Present);
                        }
                        None => {
                            presence.insert(source, Presence::Present);
                        }
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(InvalidPatchError { issues })
        }
    }
}

// Lexical, cwd-independent identity of a patch path.
fn patch_key(raw: &str) -> Result<PathBuf, PathError> {
    resolve_patch_path(Path::new(""), raw)
}

impl Hunk {
    /// Per-hunk structural checks. `index` is the hunk's position in the patch.
    pub fn validate(&self, index: usize) -> Result<(), InvalidHunkError> {
        let fail = |message: String| InvalidHunkError {
            hunk: index,
            path: self.file_path().to_string(),
            message,
        };

        match self {
            Hunk::Create { .. } | Hunk::Delete { .. } => Ok(()),
            Hunk::Move {
                file_path,
                move_to_path,
            } => {
                if same_path(file_path, move_to_path) {
                    return Err(fail("move destination equals its source".to_string()));
                }
                Ok(())
            }
            Hunk::Edit {
                move_to_path,
                chunks,
                ..
            } => {
                if chunks.is_empty() && move_to_path.is_none() {
                    return Err(fail("edit hunk has no chunks".to_string()));
                }
                for (n, chunk) in chunks.iter().enumerate() {
                    validate_chunk(chunk).map_err(|message| fail(format!("chunk {n}: {message}")))?;
                }
                check_overlaps(chunks).map_err(fail)
            }
        }
    }
}

fn same_path(a: &str, b: &str) -> bool {
    matches!((patch_key(a), patch_key(b)), (Ok(a), Ok(b)) if a == b)
}

fn validate_chunk(chunk: &EditFileChunk) -> Result<(), String> {
    if chunk.old_anchors.len() != chunk.old_lines.len() {
        return Err(format!(
            "{} old anchors for {} old lines",
            chunk.old_anchors.len(),
            chunk.old_lines.len()
        ));
    }
    if chunk.is_insertion() {
        if chunk.new_lines.is_empty() {
            return Err("chunk has neither old nor new lines".to_string());
        }
        if !chunk.is_end_of_file {
            return Err("chunk without anchors must set isEndOfFile to append".to_string());
        }
        return Ok(());
    }
    let first = chunk.old_anchors[0].line;
    for (offset, anchor) in chunk.old_anchors.iter().enumerate() {
        if anchor.line == 0 {
            return Err("anchor line numbers are 1-based".to_string());
        }
        if anchor.line != first + offset {
            return Err(format!(
                "anchor {anchor} breaks the run starting at line {first}"
            ));
        }
    }
    Ok(())
}

fn check_overlaps(chunks: &[EditFileChunk]) -> Result<(), String> {
    let mut ranges: Vec<(usize, usize)> = chunks
        .iter()
        .filter_map(|chunk| {
            chunk
                .start_line()
                .map(|start| (start, start + chunk.old_anchors.len()))
        })
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let ((a_start, a_end), (b_start, _)) = (pair[0], pair[1]);
        if b_start < a_end {
            return Err(format!(
                "chunks at lines {a_start} and {b_start} overlap"
            ));
        }
    }
    Ok(())
}

/// Chunks in application order, paired with their index in the hunk:
/// anchored chunks by first line, appends last.
pub fn ordered_chunks(chunks: &[EditFileChunk]) -> Vec<(usize, &EditFileChunk)> {
    let mut ordered: Vec<(usize, &EditFileChunk)> = chunks.iter().enumerate().collect();
    ordered.sort_by_key(|(_, chunk)| chunk.start_line().unwrap_or(usize::MAX));
    ordered
}
