//! Anchored reads.
//!
//! Renders file content as `"<line><hash>|<text>"` so a client can later refer
//! to lines by (position, fingerprint) instead of by position alone, and parses
//! those anchors back.

use crate::edit::TextFile;
use crate::hash::{compute_line_hash, LineHash, ParseHashError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A claim that the line currently at `line` (1-based) has fingerprint `hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Anchor {
    pub line: usize,
    pub hash: LineHash,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorParseError {
    #[error("anchor '{0}' is too short: expected <line><hash>")]
    TooShort(String),

    #[error("anchor '{0}' has an invalid line number")]
    InvalidLine(String),

    #[error(transparent)]
    Hash(#[from] ParseHashError),

    #[error("anchored line is missing the '|' separator")]
    MissingSeparator,
}

impl Anchor {
    pub fn new(line: usize, hash: LineHash) -> Self {
        Self { line, hash }
    }

    /// Anchor for `text` sitting at `line`.
    pub fn of(line: usize, text: &str) -> Self {
        Self::new(line, compute_line_hash(text))
    }

    /// Parse the compact `"<line><hash>"` form, e.g. `"12ab"`.
    pub fn parse(s: &str) -> Result<Self, AnchorParseError> {
        let s = s.trim();
        if s.len() < 3 || !s.is_ascii() {
            return Err(AnchorParseError::TooShort(s.to_string()));
        }
        let (line, hash) = s.split_at(s.len() - 2);
        let line = line
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0 && line.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| AnchorParseError::InvalidLine(s.to_string()))?;
        Ok(Self::new(line, hash.parse()?))
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.line, self.hash)
    }
}

impl FromStr for Anchor {
    type Err = AnchorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Anchor::parse(s)
    }
}

// Accepts both `{"line": 3, "hash": "ab"}` and `"3ab"`.
impl<'de> Deserialize<'de> for Anchor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Compact(String),
            Full { line: usize, hash: LineHash },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Compact(s) => Anchor::parse(&s).map_err(serde::de::Error::custom),
            Repr::Full { line, hash } => Ok(Anchor { line, hash }),
        }
    }
}

/// Split one rendered line `"12ab|text"` into its anchor and original text.
pub fn parse_anchored_line(line: &str) -> Result<(Anchor, &str), AnchorParseError> {
    let (prefix, text) = line
        .split_once('|')
        .ok_or(AnchorParseError::MissingSeparator)?;
    Ok((Anchor::parse(prefix)?, text))
}

/// Anchors for every line of `content`, in order.
pub fn anchors_for(content: &str) -> Vec<Anchor> {
    TextFile::parse(content)
        .lines
        .iter()
        .enumerate()
        .map(|(idx, line)| Anchor::of(idx + 1, line))
        .collect()
}

/// Render `content` with an anchor prefix on every line.
pub fn format_anchored(content: &str) -> String {
    let file = TextFile::parse(content);
    let mut out = String::with_capacity(content.len() + file.lines.len() * 6);
    for (idx, line) in file.lines.iter().enumerate() {
        let anchor = Anchor::of(idx + 1, line);
        out.push_str(&anchor.to_string());
        out.push('|');
        out.push_str(line);
        out.push('\n');
    }
    out
}
