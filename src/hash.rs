//! Per-line fingerprints.
//!
//! A fingerprint is a rolling hash of the normalized line folded into 256
//! buckets and rendered as two lowercase hex digits. Collisions are expected;
//! a fingerprint is always paired with a line number, and its job is to notice
//! that a line's content changed, not to identify it.

use crate::normalize::normalize_for_hash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Two-hex-digit line fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineHash(u8);

impl LineHash {
    /// Fingerprint reserved for empty and whitespace-only lines.
    pub const EMPTY: LineHash = LineHash(0);

    pub const fn new(bucket: u8) -> Self {
        Self(bucket)
    }

    pub const fn bucket(self) -> u8 {
        self.0
    }
}

impl fmt::Display for LineHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid line hash '{0}': expected two hex digits")]
pub struct ParseHashError(pub String);

impl FromStr for LineHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseHashError(s.to_string()));
        }
        u8::from_str_radix(s, 16)
            .map(LineHash)
            .map_err(|_| ParseHashError(s.to_string()))
    }
}

impl Serialize for LineHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How line text is folded before hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashMode {
    /// Production default: case changes change the fingerprint.
    #[default]
    CaseSensitive,
    /// Diagnostic mode; never used when verifying anchors.
    CaseInsensitive,
}

/// Order-sensitive 32-bit rolling hash (`h = h * 31 + unit`) over UTF-16 code units.
pub fn compute_string_hash(s: &str) -> u32 {
    s.encode_utf16().fold(0u32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(u32::from(unit))
    })
}

/// Fingerprint one raw line in the default case-sensitive mode.
pub fn compute_line_hash(raw_line: &str) -> LineHash {
    compute_line_hash_with(raw_line, HashMode::CaseSensitive)
}

pub fn compute_line_hash_with(raw_line: &str, mode: HashMode) -> LineHash {
    let normalized = normalize_for_hash(raw_line, mode == HashMode::CaseInsensitive);
    if normalized.is_empty() {
        return LineHash::EMPTY;
    }
    LineHash((compute_string_hash(&normalized) % 256) as u8)
}
