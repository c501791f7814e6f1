use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Line-oriented view of a text file.
///
/// Lines never contain their terminator. Each line keeps its own terminator,
/// so a file with mixed `\n` and `\r\n` endings renders back byte for byte
/// and edits only affect the lines they replace. Replacement lines take the
/// terminator of the first line they replace; appended lines take the file's
/// dominant ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFile {
    pub lines: Vec<String>,
    endings: Vec<LineEnding>,
    /// Most common terminator in the file (`Lf` on a tie or with none).
    pub line_ending: LineEnding,
    pub trailing_newline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl TextFile {
    pub fn parse(content: &str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();
        if !content.is_empty() {
            for line in content.split_terminator('\n') {
                match line.strip_suffix('\r') {
                    Some(stripped) => {
                        lines.push(stripped.to_string());
                        endings.push(LineEnding::CrLf);
                    }
                    None => {
                        lines.push(line.to_string());
                        endings.push(LineEnding::Lf);
                    }
                }
            }
        }
        let trailing_newline = content.ends_with('\n');
        // An unterminated last line has no ending of its own
        let terminated = if trailing_newline {
            &endings[..]
        } else {
            &endings[..endings.len().saturating_sub(1)]
        };
        let crlf = terminated.iter().filter(|e| **e == LineEnding::CrLf).count();
        let line_ending = if crlf * 2 > terminated.len() {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };
        if !trailing_newline {
            if let Some(last) = endings.last_mut() {
                *last = line_ending;
            }
        }
        Self {
            lines,
            endings,
            line_ending,
            trailing_newline,
        }
    }

    /// Replace `range` with `new_lines`.
    pub fn splice(&mut self, range: Range<usize>, new_lines: &[String]) {
        let ending = self
            .endings
            .get(range.start)
            .copied()
            .unwrap_or(self.line_ending);
        self.endings
            .splice(range.clone(), std::iter::repeat(ending).take(new_lines.len()));
        self.lines.splice(range, new_lines.iter().cloned());
    }

    pub fn append(&mut self, new_lines: &[String]) {
        let end = self.lines.len();
        self.splice(end..end, new_lines);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (idx, line) in self.lines.iter().enumerate() {
            out.push_str(line);
            if idx < last || self.trailing_newline {
                let ending = self.endings.get(idx).copied().unwrap_or(self.line_ending);
                out.push_str(ending.as_str());
            }
        }
        out
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} is not valid UTF-8 text")]
    NotUtf8(PathBuf),

    #[error("{0} was modified by another writer during apply")]
    ModifiedDuringApply(PathBuf),

    #[error("path has no parent directory: {0}")]
    NoParent(PathBuf),
}

impl EditError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        EditError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File content captured at read time together with its xxh3 digest.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub content: String,
    digest: u64,
}

impl Snapshot {
    pub fn read(path: &Path) -> Result<Self, EditError> {
        let bytes = fs::read(path).map_err(|e| EditError::io(path, e))?;
        let digest = xxh3_64(&bytes);
        let content = String::from_utf8(bytes).map_err(|_| EditError::NotUtf8(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            content,
            digest,
        })
    }

    /// Re-read the file and fail if its bytes no longer match the snapshot.
    pub fn verify_unchanged(&self) -> Result<(), EditError> {
        let bytes = fs::read(&self.path).map_err(|e| EditError::io(&self.path, e))?;
        if xxh3_64(&bytes) != self.digest {
            return Err(EditError::ModifiedDuringApply(self.path.clone()));
        }
        Ok(())
    }
}

/// Atomic file write: tempfile + fsync + rename, then an mtime bump so
/// watchers and build tools notice the change.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    // Tempfile must live on the same filesystem for rename to be atomic
    let parent = path
        .parent()
        .ok_or_else(|| EditError::NoParent(path.to_path_buf()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| EditError::io(path, e))?;
    temp.write_all(content).map_err(|e| EditError::io(path, e))?;
    temp.as_file().sync_all().map_err(|e| EditError::io(path, e))?;
    temp.persist(path).map_err(|e| EditError::io(path, e.error))?;

    let now = filetime::FileTime::now();
    filetime::set_file_mtime(path, now).map_err(|e| EditError::io(path, e))?;

    Ok(())
}

/// Create the parent directories of `path` when missing.
pub fn ensure_parent(path: &Path) -> Result<(), EditError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| EditError::io(parent, e))
        }
        _ => Ok(()),
    }
}
