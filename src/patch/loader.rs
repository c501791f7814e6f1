use crate::patch::types::Patch;
use crate::patch::validate::InvalidPatchError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk encodings a patch can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    Json,
    Toml,
}

impl PatchFormat {
    /// `.toml` files are TOML, everything else is treated as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => PatchFormat::Toml,
            _ => PatchFormat::Json,
        }
    }
}

#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Invalid {
        path: Option<PathBuf>,
        source: InvalidPatchError,
    },
}

impl LoadError {
    fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            LoadError::Json { path: None, source } => LoadError::Json { path, source },
            LoadError::Toml { path: None, source } => LoadError::Toml { path, source },
            LoadError::Invalid { path: None, source } => LoadError::Invalid { path, source },
            other => other,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => {
                write!(f, "failed to read patch from {}: {}", path.display(), source)
            }
            LoadError::Json { path, source } => match path {
                Some(path) => write!(f, "failed to parse patch JSON ({}): {}", path.display(), source),
                None => write!(f, "failed to parse patch JSON: {}", source),
            },
            LoadError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse patch TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse patch TOML: {}", source),
            },
            LoadError::Invalid { path, source } => match path {
                Some(path) => write!(f, "invalid patch ({}): {}", path.display(), source),
                None => write!(f, "invalid patch: {}", source),
            },
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            LoadError::Json { source, .. } => Some(source),
            LoadError::Toml { source, .. } => Some(source),
            LoadError::Invalid { source, .. } => Some(source),
        }
    }
}

/// Parse and validate a patch.
pub fn load_from_str(input: &str, format: PatchFormat) -> Result<Patch, LoadError> {
    let patch: Patch = match format {
        PatchFormat::Json => serde_json::from_str(input)
            .map_err(|source| LoadError::Json { path: None, source })?,
        PatchFormat::Toml => toml_edit::de::from_str(input)
            .map_err(|source| LoadError::Toml { path: None, source })?,
    };
    patch
        .validate()
        .map_err(|source| LoadError::Invalid { path: None, source })?;
    Ok(patch)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Patch, LoadError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents, PatchFormat::from_path(path)).map_err(|error| error.with_path(path))
}
