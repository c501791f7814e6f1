//! Anchor resolution and in-memory application of edit chunks.
//!
//! Nothing here touches the filesystem: [`apply_chunks`] turns the current
//! file content plus a hunk's chunks into new content and a per-chunk report.

use crate::anchor::Anchor;
use crate::edit::TextFile;
use crate::hash::{compute_line_hash, LineHash};
use crate::normalize::normalize_for_hash;
use crate::patch::{ordered_chunks, EditFileChunk};
use std::fmt;
use tracing::debug;

/// Where a chunk's old lines were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// 0-based index of the first matched line.
    pub start: usize,
    /// The match is not at the claimed position (after earlier chunks' shifts).
    pub drifted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    /// No run of matching fingerprints inside the search window.
    NotFound { window: usize },
    /// Several runs matched equally well.
    Ambiguous { lines: Vec<usize> },
    /// Fingerprints matched but the current text differs from the old lines.
    TextMismatch { lines: Vec<usize> },
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::NotFound { window } => write!(
                f,
                "anchors do not match current content (searched {window} lines around the claimed position)"
            ),
            MismatchReason::Ambiguous { lines } => {
                let lines: Vec<String> = lines.iter().map(usize::to_string).collect();
                write!(
                    f,
                    "anchors match at several positions equally well (lines {})",
                    lines.join(", ")
                )
            }
            MismatchReason::TextMismatch { lines } => {
                let lines: Vec<String> = lines.iter().map(usize::to_string).collect();
                write!(
                    f,
                    "anchor hashes match but old lines differ from current content (lines {})",
                    lines.join(", ")
                )
            }
        }
    }
}

/// An anchored chunk that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub reason: MismatchReason,
    /// The chunk's anchors and old lines, rendered `"<line><hash>|<text>"`.
    pub expected: Vec<String>,
    /// Current lines at the nearest candidate (or the claimed position).
    pub actual: Vec<String>,
    /// Anchors of the current content at the nearest partial match.
    pub suggest: Option<Vec<Anchor>>,
}

/// Locate `chunk` in `lines`.
///
/// `delta` is the net line shift introduced by chunks already applied to this
/// file and `floor` the first line index a match may start at. Candidates are
/// runs within `window` lines of the claimed position whose fingerprints equal
/// the chunk's anchors and whose current text equals the normalized old lines.
/// The closest candidate wins; a tie for closest is ambiguous.
pub fn locate_chunk(
    lines: &[String],
    chunk: &EditFileChunk,
    delta: isize,
    floor: usize,
    window: usize,
) -> Result<Resolution, Mismatch> {
    // Anchor-less chunks append
    let Some(first) = chunk.old_anchors.first() else {
        return Ok(Resolution {
            start: lines.len(),
            drifted: false,
        });
    };
    let hashes: Vec<LineHash> = lines.iter().map(|line| compute_line_hash(line)).collect();
    let len = chunk.old_anchors.len();
    let claimed = first.line.saturating_sub(1);
    let expected = claimed.saturating_add_signed(delta);

    let anchors_match = |start: usize| {
        start + len <= hashes.len()
            && (!chunk.is_end_of_file || start + len == hashes.len())
            && chunk
                .old_anchors
                .iter()
                .zip(&hashes[start..start + len])
                .all(|(anchor, hash)| anchor.hash == *hash)
    };
    let text_agrees = |start: usize| {
        chunk
            .old_lines
            .iter()
            .zip(&lines[start..start + len])
            .all(|(old, current)| normalize_for_hash(old, false) == normalize_for_hash(current, false))
    };

    let lo = expected.saturating_sub(window).max(floor);
    let hi = expected.saturating_add(window).min(hashes.len().saturating_sub(len));

    // Fingerprints only narrow the search; the old text has to agree too
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    let mut collisions: Vec<usize> = Vec::new();
    if hashes.len() >= len {
        for start in lo..=hi {
            if !anchors_match(start) {
                continue;
            }
            if text_agrees(start) {
                candidates.push((start.abs_diff(expected), start));
            } else {
                collisions.push(start + 1);
            }
        }
    }
    candidates.sort_unstable();

    match candidates.as_slice() {
        [] if collisions.is_empty() => Err(mismatch(
            lines,
            &hashes,
            chunk,
            expected,
            lo,
            hi,
            MismatchReason::NotFound { window },
        )),
        [] => {
            let at = collisions[0] - 1;
            Err(Mismatch {
                reason: MismatchReason::TextMismatch { lines: collisions },
                expected: render_expected(chunk),
                actual: render_actual(lines, at, len),
                suggest: Some(anchors_at(lines, at, len)),
            })
        }
        [(distance, start), rest @ ..] => {
            let tied: Vec<usize> = rest
                .iter()
                .take_while(|(d, _)| d == distance)
                .map(|(_, s)| s + 1)
                .collect();
            if !tied.is_empty() {
                let mut lines_at = vec![start + 1];
                lines_at.extend(tied);
                return Err(Mismatch {
                    reason: MismatchReason::Ambiguous { lines: lines_at },
                    expected: render_expected(chunk),
                    actual: render_actual(lines, expected, len),
                    suggest: None,
                });
            }
            debug!(
                claimed = claimed + 1,
                found = start + 1,
                rejected = collisions.len(),
                "resolved chunk anchors"
            );
            Ok(Resolution {
                start: *start,
                drifted: *start != expected,
            })
        }
    }
}

fn anchors_at(lines: &[String], start: usize, len: usize) -> Vec<Anchor> {
    lines[start..start + len]
        .iter()
        .enumerate()
        .map(|(offset, line)| Anchor::of(start + offset + 1, line))
        .collect()
}

fn mismatch(
    lines: &[String],
    hashes: &[LineHash],
    chunk: &EditFileChunk,
    expected: usize,
    lo: usize,
    hi: usize,
    reason: MismatchReason,
) -> Mismatch {
    let len = chunk.old_anchors.len();
    let near = near_miss(lines, hashes, chunk, expected, lo, hi);
    let at = near.unwrap_or(expected);
    let suggest = near.map(|start| anchors_at(lines, start, len));
    Mismatch {
        reason,
        expected: render_expected(chunk),
        actual: render_actual(lines, at, len),
        suggest,
    }
}

/// Position in the window with the most matching anchors (at least one);
/// ties go to the most similar text, then the closest position.
fn near_miss(
    lines: &[String],
    hashes: &[LineHash],
    chunk: &EditFileChunk,
    expected: usize,
    lo: usize,
    hi: usize,
) -> Option<usize> {
    let len = chunk.old_anchors.len();
    if hashes.len() < len || lo > hi {
        return None;
    }
    let old_text = chunk
        .old_lines
        .iter()
        .map(|line| normalize_for_hash(line, false))
        .collect::<Vec<_>>()
        .join("\n");

    let mut best: Option<(usize, f64, usize, usize)> = None;
    for start in lo..=hi {
        let score = chunk
            .old_anchors
            .iter()
            .zip(&hashes[start..start + len])
            .filter(|(anchor, hash)| anchor.hash == **hash)
            .count();
        if score == 0 {
            continue;
        }
        let current = lines[start..start + len]
            .iter()
            .map(|line| normalize_for_hash(line, false))
            .collect::<Vec<_>>()
            .join("\n");
        let similarity = strsim::normalized_levenshtein(&old_text, &current);
        let distance = start.abs_diff(expected);
        let better = match best {
            None => true,
            Some((b_score, b_sim, b_dist, _)) => {
                score > b_score
                    || (score == b_score && similarity > b_sim)
                    || (score == b_score && similarity == b_sim && distance < b_dist)
            }
        };
        if better {
            best = Some((score, similarity, distance, start));
        }
    }
    best.map(|(_, _, _, start)| start)
}

fn render_expected(chunk: &EditFileChunk) -> Vec<String> {
    chunk
        .old_anchors
        .iter()
        .zip(&chunk.old_lines)
        .map(|(anchor, line)| format!("{anchor}|{line}"))
        .collect()
}

fn render_actual(lines: &[String], start: usize, len: usize) -> Vec<String> {
    let start = start.min(lines.len());
    let end = (start + len).min(lines.len());
    lines[start..end]
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("{}|{line}", Anchor::of(start + offset + 1, line)))
        .collect()
}

/// What happened to one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Applied { line: usize, drifted: bool },
    /// New lines equal the matched lines; `line` is 1-based.
    NoOp { line: usize, drifted: bool },
    Failed(Mismatch),
}

/// Result of running every chunk of one edit hunk against some content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEdit {
    pub content: String,
    /// Outcome per chunk, indexed like the hunk's `chunks`.
    pub outcomes: Vec<ChunkOutcome>,
}

impl ChunkedEdit {
    pub fn changed(&self, original: &str) -> bool {
        self.content != original
    }

    pub fn live(&self) -> bool {
        self.outcomes.iter().any(|outcome| {
            matches!(
                outcome,
                ChunkOutcome::Applied { drifted: true, .. } | ChunkOutcome::NoOp { drifted: true, .. }
            )
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &Mismatch)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(idx, outcome)| match outcome {
                ChunkOutcome::Failed(mismatch) => Some((idx, mismatch)),
                _ => None,
            })
    }
}

/// Apply `chunks` to `content` in ascending position order.
///
/// Each applied chunk shifts later chunks by its net line delta (plus any drift
/// it was found at). Failed chunks leave the content untouched and do not stop
/// the remaining chunks.
pub fn apply_chunks(content: &str, chunks: &[EditFileChunk], window: usize) -> ChunkedEdit {
    let mut file = TextFile::parse(content);
    let mut outcomes: Vec<Option<ChunkOutcome>> = vec![None; chunks.len()];
    let mut delta: isize = 0;
    let mut floor = 0usize;
    let mut touched_end = false;

    for (idx, chunk) in ordered_chunks(chunks) {
        if chunk.is_insertion() {
            let at = file.lines.len();
            file.append(&chunk.new_lines);
            floor = file.lines.len();
            touched_end = true;
            outcomes[idx] = Some(ChunkOutcome::Applied {
                line: at + 1,
                drifted: false,
            });
            continue;
        }

        let outcome = match locate_chunk(&file.lines, chunk, delta, floor, window) {
            Ok(Resolution { start, drifted }) => {
                let old_len = chunk.old_anchors.len();
                let end = start + old_len;
                let claimed = chunk.old_anchors[0].line.saturating_sub(1).saturating_add_signed(delta);
                // Drift is carried forward so later chunks start from where this one landed
                delta += start as isize - claimed as isize;
                if file.lines[start..end] == chunk.new_lines[..] {
                    floor = end;
                    ChunkOutcome::NoOp {
                        line: start + 1,
                        drifted,
                    }
                } else {
                    file.splice(start..end, &chunk.new_lines);
                    delta += chunk.new_lines.len() as isize - old_len as isize;
                    floor = start + chunk.new_lines.len();
                    touched_end |= chunk.is_end_of_file;
                    ChunkOutcome::Applied {
                        line: start + 1,
                        drifted,
                    }
                }
            }
            Err(mismatch) => ChunkOutcome::Failed(mismatch),
        };
        outcomes[idx] = Some(outcome);
    }

    if touched_end && !file.lines.is_empty() {
        file.trailing_newline = true;
    }

    ChunkedEdit {
        content: file.render(),
        outcomes: outcomes.into_iter().flatten().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        TextFile::parse(text).lines
    }

    /// Chunk replacing `old` (as read at 1-based `line`) with `new`.
    fn chunk(line: usize, old: &[&str], new: &[&str]) -> EditFileChunk {
        EditFileChunk::replace(
            old.iter()
                .enumerate()
                .map(|(i, text)| (Anchor::of(line + i, text), text.to_string())),
            new.iter().copied(),
        )
    }

    #[test]
    fn test_exact_match() {
        let current = lines("a\nb\nc\n");
        let resolution = locate_chunk(&current, &chunk(2, &["b"], &["B"]), 0, 0, 8).unwrap();
        assert_eq!(resolution, Resolution { start: 1, drifted: false });
    }

    #[test]
    fn test_drift_after_insertions_above() {
        let current = lines("x\ny\nz\na\nb\nc\n");
        let resolution = locate_chunk(&current, &chunk(2, &["b"], &["B"]), 0, 0, 8).unwrap();
        assert_eq!(resolution, Resolution { start: 4, drifted: true });
    }

    #[test]
    fn test_drift_outside_window_fails_with_suggestion() {
        let mut text = String::new();
        for i in 0..20 {
            text.push_str(&format!("filler {i}\n"));
        }
        text.push_str("target line\n");
        let current = lines(&text);
        let err = locate_chunk(&current, &chunk(1, &["target line"], &["x"]), 0, 0, 4).unwrap_err();
        assert_eq!(err.reason, MismatchReason::NotFound { window: 4 });
        assert_eq!(err.expected, vec![format!("{}|target line", Anchor::of(1, "target line"))]);
        assert_eq!(err.actual.len(), 1);
    }

    #[test]
    fn test_changed_line_reports_near_miss() {
        let current = lines("fn a() {\n    one();\n    TWO();\n}\n");
        let stale = chunk(2, &["    one();", "    two();"], &["    three();"]);
        let err = locate_chunk(&current, &stale, 0, 0, 8).unwrap_err();
        let suggest = err.suggest.expect("near miss should suggest anchors");
        assert_eq!(
            suggest,
            vec![Anchor::of(2, "    one();"), Anchor::of(3, "    TWO();")]
        );
        assert!(err.actual[1].ends_with("|    TWO();"));
    }

    #[test]
    fn test_ambiguous_match_fails() {
        let current = lines("dup\nmid\ndup\n");
        // Claims line 2, but "dup" sits one line above and one line below.
        let ambiguous = chunk(2, &["dup"], &["x"]);
        let err = locate_chunk(&current, &ambiguous, 0, 0, 8).unwrap_err();
        assert_eq!(err.reason, MismatchReason::Ambiguous { lines: vec![1, 3] });
    }

    /// A line other than `text` with the same fingerprint.
    fn colliding_line(text: &str) -> String {
        (0..10_000)
            .map(|i| format!("v{i}"))
            .find(|candidate| compute_line_hash(candidate) == compute_line_hash(text))
            .expect("256 buckets guarantee a collision")
    }

    #[test]
    fn test_text_agreement_breaks_hash_ties() {
        // Two runs share the fingerprint but only one has the same text.
        let a = "same";
        let other = colliding_line(a);
        let current = lines(&format!("{other}\nmid\n{a}\n"));
        let c = chunk(2, &[a], &["new"]);
        let resolution = locate_chunk(&current, &c, 0, 0, 8).unwrap();
        assert_eq!(resolution.start, 2);
    }

    #[test]
    fn test_hash_collision_with_different_text_is_rejected() {
        let expected = "let secret = load();";
        let other = colliding_line(expected);
        let current = lines(&format!("fn x() {{\n{other}\n}}\n"));
        let err = locate_chunk(&current, &chunk(2, &[expected], &["REPLACED"]), 0, 0, 8)
            .unwrap_err();
        assert_eq!(err.reason, MismatchReason::TextMismatch { lines: vec![2] });
        assert_eq!(err.actual, vec![format!("{}|{other}", Anchor::of(2, &other))]);
        assert_eq!(err.suggest, Some(vec![Anchor::of(2, &other)]));

        let edit = apply_chunks(
            &format!("fn x() {{\n{other}\n}}\n"),
            &[chunk(2, &[expected], &["REPLACED"])],
            8,
        );
        assert!(!edit.content.contains("REPLACED"));
        assert_eq!(edit.failures().count(), 1);
    }

    #[test]
    fn test_whitespace_only_difference_still_agrees() {
        let current = lines("a\n  b  \nc\n");
        let resolution = locate_chunk(&current, &chunk(2, &["b"], &["B"]), 0, 0, 8).unwrap();
        assert_eq!(resolution.start, 1);
    }

    #[test]
    fn test_floor_excludes_earlier_region() {
        let current = lines("dup\ndup\n");
        let c = chunk(1, &["dup"], &["x"]);
        let resolution = locate_chunk(&current, &c, 0, 1, 8).unwrap();
        assert_eq!(resolution, Resolution { start: 1, drifted: true });
    }

    #[test]
    fn test_end_of_file_requires_last_line() {
        let current = lines("a\nb\na\n");
        let c = chunk(1, &["a"], &["z"]).at_end_of_file();
        let resolution = locate_chunk(&current, &c, 0, 0, 8).unwrap();
        assert_eq!(resolution.start, 2);
    }

    #[test]
    fn test_apply_chunks_composes_deltas() {
        let content = "one\ntwo\nthree\nfour\n";
        let chunks = vec![
            chunk(4, &["four"], &["FOUR"]),
            chunk(1, &["one"], &["ONE", "ONE-B"]),
        ];
        let edit = apply_chunks(content, &chunks, 8);
        assert_eq!(edit.content, "ONE\nONE-B\ntwo\nthree\nFOUR\n");
        assert!(!edit.live());
        assert_eq!(edit.outcomes[0], ChunkOutcome::Applied { line: 5, drifted: false });
        assert_eq!(edit.outcomes[1], ChunkOutcome::Applied { line: 1, drifted: false });
    }

    #[test]
    fn test_apply_chunks_noop() {
        let content = "a\nb\n";
        let edit = apply_chunks(content, &[chunk(2, &["b"], &["b"])], 8);
        assert!(!edit.changed(content));
        assert_eq!(edit.outcomes[0], ChunkOutcome::NoOp { line: 2, drifted: false });
    }

    #[test]
    fn test_apply_chunks_partial_failure() {
        let content = "a\nb\nc\n";
        let chunks = vec![chunk(1, &["a"], &["A"]), chunk(3, &["gone"], &["C"])];
        let edit = apply_chunks(content, &chunks, 8);
        assert_eq!(edit.content, "A\nb\nc\n");
        assert_eq!(edit.failures().count(), 1);
        assert_eq!(edit.failures().next().map(|(idx, _)| idx), Some(1));
    }

    #[test]
    fn test_append_adds_trailing_newline() {
        let edit = apply_chunks("a", &[EditFileChunk::append(["b"])], 8);
        assert_eq!(edit.content, "a\nb\n");
        let edit = apply_chunks("", &[EditFileChunk::append(["first"])], 8);
        assert_eq!(edit.content, "first\n");
    }

    #[test]
    fn test_trailing_newline_preserved_for_inner_edits() {
        let edit = apply_chunks("a\nb", &[chunk(1, &["a"], &["A"])], 8);
        assert_eq!(edit.content, "A\nb");
    }

    #[test]
    fn test_crlf_preserved() {
        let edit = apply_chunks("a\r\nb\r\n", &[chunk(2, &["b"], &["B"])], 8);
        assert_eq!(edit.content, "a\r\nB\r\n");
    }

    #[test]
    fn test_delete_lines() {
        let edit = apply_chunks("a\nb\nc\n", &[chunk(2, &["b"], &[])], 8);
        assert_eq!(edit.content, "a\nc\n");
    }
}
