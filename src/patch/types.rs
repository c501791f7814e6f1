use crate::anchor::Anchor;
use serde::{Deserialize, Serialize};

/// An ordered list of whole-file operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub hunks: Vec<Hunk>,
}

impl Patch {
    pub fn new(hunks: Vec<Hunk>) -> Self {
        Self { hunks }
    }
}

/// One whole-file operation. Paths are project-relative; a leading `@` is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Hunk {
    /// File must not exist yet.
    Create { file_path: String, contents: String },
    /// File must exist.
    Delete { file_path: String },
    /// Rename only; destination must not exist.
    Move {
        file_path: String,
        move_to_path: String,
    },
    /// File must exist; optionally renamed together with the edit.
    Edit {
        file_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        move_to_path: Option<String>,
        #[serde(default)]
        chunks: Vec<EditFileChunk>,
    },
}

impl Hunk {
    pub fn file_path(&self) -> &str {
        match self {
            Hunk::Create { file_path, .. }
            | Hunk::Delete { file_path }
            | Hunk::Move { file_path, .. }
            | Hunk::Edit { file_path, .. } => file_path,
        }
    }

    pub fn move_to_path(&self) -> Option<&str> {
        match self {
            Hunk::Move { move_to_path, .. } => Some(move_to_path),
            Hunk::Edit { move_to_path, .. } => move_to_path.as_deref(),
            Hunk::Create { .. } | Hunk::Delete { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Hunk::Create { .. } => "create",
            Hunk::Delete { .. } => "delete",
            Hunk::Move { .. } => "move",
            Hunk::Edit { .. } => "edit",
        }
    }
}

/// One contiguous region of an edit hunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFileChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_context: Option<String>,
    /// Text the caller believes is currently at the anchored lines.
    #[serde(default)]
    pub old_lines: Vec<String>,
    /// One anchor per old line, consecutive line numbers.
    #[serde(default)]
    pub old_anchors: Vec<Anchor>,
    #[serde(default)]
    pub new_lines: Vec<String>,
    /// The old lines run to the last line of the file (or, without anchors,
    /// the new lines are appended at the end).
    #[serde(default)]
    pub is_end_of_file: bool,
}

impl EditFileChunk {
    /// Replace the anchored lines with `new_lines`.
    pub fn replace(
        old: impl IntoIterator<Item = (Anchor, String)>,
        new_lines: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let (old_anchors, old_lines) = old.into_iter().unzip();
        Self {
            old_lines,
            old_anchors,
            new_lines: new_lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append `new_lines` after the last line of the file.
    pub fn append(new_lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            new_lines: new_lines.into_iter().map(Into::into).collect(),
            is_end_of_file: true,
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.change_context = Some(context.into());
        self
    }

    pub fn at_end_of_file(mut self) -> Self {
        self.is_end_of_file = true;
        self
    }

    /// 1-based line of the first anchor, if any.
    pub fn start_line(&self) -> Option<usize> {
        self.old_anchors.first().map(|anchor| anchor.line)
    }

    pub fn is_insertion(&self) -> bool {
        self.old_anchors.is_empty()
    }
}
