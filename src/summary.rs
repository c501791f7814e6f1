//! Aggregated outcome of one apply call.
//!
//! The summary always reflects partial success: every hunk lands in exactly one
//! of the success lists or in `failed`, and failures carry enough detail
//! (expected vs actual lines, suggested anchors) for the caller to retry.

use crate::anchor::Anchor;
use serde::Serialize;
use similar::TextDiff;
use std::fmt;

/// Kind of a successful file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Created,
    Edited,
    Moved,
    Deleted,
}

impl FileStatus {
    pub fn code(self) -> &'static str {
        match self {
            FileStatus::Created => "C",
            FileStatus::Edited => "E",
            FileStatus::Moved => "MV",
            FileStatus::Deleted => "D",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedFile {
    pub from: String,
    pub to: String,
}

/// A hunk or chunk that did not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOperation {
    pub path: String,
    /// 0-based hunk index in the patch.
    pub hunk: usize,
    /// 0-based chunk index inside an edit hunk, for anchor failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
    pub error: String,
    /// Lines the anchors claimed, rendered as `"<line><hash>|<text>"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<String>>,
    /// What is currently at or near the claimed position, same rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Vec<String>>,
    /// Anchors that would match the current content at the nearest candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggest: Option<Vec<Anchor>>,
}

impl FailedOperation {
    pub fn new(path: impl Into<String>, hunk: usize, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hunk,
            chunk: None,
            error: error.into(),
            expected: None,
            actual: None,
            suggest: None,
        }
    }
}

/// A chunk whose new lines equal what is already there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoOp {
    pub path: String,
    /// 1-based first line of the matched region.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub diff: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    pub created: Vec<String>,
    pub edited: Vec<String>,
    pub moved: Vec<MovedFile>,
    pub deleted: Vec<String>,
    pub failed: Vec<FailedOperation>,
    /// Files whose anchors drifted but were relocated; their old anchors are stale.
    pub live: Vec<String>,
    pub diffs: Vec<FileDiff>,
    pub noops: Vec<NoOp>,
}

impl PatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Successful operations in report order, with their short status codes.
    pub fn statuses(&self) -> Vec<(FileStatus, String)> {
        let created = self.created.iter().map(|p| (FileStatus::Created, p.clone()));
        let edited = self.edited.iter().map(|p| (FileStatus::Edited, p.clone()));
        let moved = self
            .moved
            .iter()
            .map(|m| (FileStatus::Moved, format!("{} -> {}", m.from, m.to)));
        let deleted = self.deleted.iter().map(|p| (FileStatus::Deleted, p.clone()));
        created.chain(edited).chain(moved).chain(deleted).collect()
    }

    pub(crate) fn record_created(&mut self, path: &str, contents: &str) {
        self.created.push(path.to_string());
        self.push_diff(path, path, "", contents);
    }

    pub(crate) fn record_deleted(&mut self, path: &str, contents: &str) {
        self.deleted.push(path.to_string());
        self.push_diff(path, path, contents, "");
    }

    pub(crate) fn record_moved(&mut self, from: &str, to: &str) {
        self.moved.push(MovedFile {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    pub(crate) fn record_edited(&mut self, from: &str, to: &str, before: &str, after: &str) {
        push_unique(&mut self.edited, to);
        self.push_diff(from, to, before, after);
    }

    pub(crate) fn record_live(&mut self, path: &str) {
        push_unique(&mut self.live, path);
    }

    pub(crate) fn record_noop(&mut self, noop: NoOp) {
        self.noops.push(noop);
    }

    pub(crate) fn record_failure(&mut self, failure: FailedOperation) {
        self.failed.push(failure);
    }

    fn push_diff(&mut self, from: &str, to: &str, before: &str, after: &str) {
        if before == after {
            return;
        }
        self.diffs.push(FileDiff {
            path: to.to_string(),
            diff: unified_diff(from, to, before, after),
        });
    }

    /// Human-readable report; diffs are appended when `with_diffs` is set.
    pub fn render(&self, with_diffs: bool) -> String {
        let mut out = String::new();
        for (status, path) in self.statuses() {
            out.push_str(&format!("{} {}\n", status.code(), path));
        }
        for path in &self.live {
            out.push_str(&format!(
                "live {path}: anchors drifted but were relocated; re-read before editing again\n"
            ));
        }
        for noop in &self.noops {
            out.push_str(&format!("no-op {}:{}: {}\n", noop.path, noop.line, noop.reason));
        }
        for failure in &self.failed {
            out.push_str(&render_failure(failure));
        }
        if with_diffs {
            for diff in &self.diffs {
                out.push_str(&diff.diff);
            }
        }
        if out.is_empty() {
            out.push_str("no changes\n");
        }
        out
    }
}

impl fmt::Display for PatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

fn render_failure(failure: &FailedOperation) -> String {
    let mut out = match failure.chunk {
        Some(chunk) => format!(
            "FAILED {} (hunk {}, chunk {}): {}\n",
            failure.path, failure.hunk, chunk, failure.error
        ),
        None => format!("FAILED {} (hunk {}): {}\n", failure.path, failure.hunk, failure.error),
    };
    if let Some(expected) = &failure.expected {
        out.push_str("  expected:\n");
        for line in expected {
            out.push_str(&format!("    {line}\n"));
        }
    }
    if let Some(actual) = &failure.actual {
        out.push_str("  actual:\n");
        for line in actual {
            out.push_str(&format!("    {line}\n"));
        }
    }
    if let Some(suggest) = &failure.suggest {
        let anchors: Vec<String> = suggest.iter().map(Anchor::to_string).collect();
        out.push_str(&format!("  suggest: {}\n", anchors.join(" ")));
    }
    out
}

fn push_unique(list: &mut Vec<String>, path: &str) {
    if !list.iter().any(|existing| existing == path) {
        list.push(path.to_string());
    }
}

/// Unified diff with three lines of context and `a/` / `b/` headers.
pub fn unified_diff(from: &str, to: &str, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{from}"), &format!("b/{to}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::LineHash;

    #[test]
    fn test_status_codes() {
        assert_eq!(FileStatus::Created.code(), "C");
        assert_eq!(FileStatus::Edited.code(), "E");
        assert_eq!(FileStatus::Moved.code(), "MV");
        assert_eq!(FileStatus::Deleted.code(), "D");
    }

    #[test]
    fn test_unified_diff_headers() {
        let diff = unified_diff("a.txt", "b.txt", "one\ntwo\n", "one\nTWO\n");
        assert!(diff.contains("--- a/a.txt"));
        assert!(diff.contains("+++ b/b.txt"));
        assert!(diff.contains("-two"));
        assert!(diff.contains("+TWO"));
    }

    #[test]
    fn test_partial_summary_render() {
        let mut summary = PatchSummary::default();
        summary.record_created("new.rs", "fn x() {}\n");
        summary.record_moved("old.rs", "moved.rs");
        let mut failure = FailedOperation::new("b.rs", 1, "anchor mismatch");
        failure.chunk = Some(0);
        failure.expected = Some(vec!["361|a".to_string()]);
        failure.actual = Some(vec!["362|b".to_string()]);
        failure.suggest = Some(vec![Anchor::new(3, LineHash::new(0x62))]);
        summary.record_failure(failure);

        assert!(!summary.is_success());
        let text = summary.render(false);
        assert!(text.contains("C new.rs\n"));
        assert!(text.contains("MV old.rs -> moved.rs\n"));
        assert!(text.contains("FAILED b.rs (hunk 1, chunk 0): anchor mismatch"));
        assert!(text.contains("  suggest: 362\n"));
        assert!(!text.contains("+++"));
        assert!(summary.to_string().contains("+++ b/new.rs"));
    }

    #[test]
    fn test_edited_and_live_are_deduplicated() {
        let mut summary = PatchSummary::default();
        summary.record_edited("a.rs", "a.rs", "x\n", "y\n");
        summary.record_edited("a.rs", "a.rs", "y\n", "z\n");
        summary.record_live("a.rs");
        summary.record_live("a.rs");
        assert_eq!(summary.edited, vec!["a.rs"]);
        assert_eq!(summary.live, vec!["a.rs"]);
        assert_eq!(summary.diffs.len(), 2);
    }

    #[test]
    fn test_json_shape() {
        let mut summary = PatchSummary::default();
        summary.record_failure(FailedOperation::new("c.rs", 2, "file not found"));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failed"][0]["path"], "c.rs");
        assert!(json["failed"][0].get("suggest").is_none());
        assert!(json["created"].as_array().unwrap().is_empty());
    }
}
