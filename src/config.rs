//! Engine settings, optionally read from a `.hashline.toml` file.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the working directory when no config is given.
pub const DEFAULT_CONFIG_FILE: &str = ".hashline.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Lines searched on each side of a drifted anchor's claimed position.
    pub drift_window: usize,
    /// Create missing parent directories for created or moved files.
    pub create_parent_dirs: bool,
    /// Workspace-relative directories that may never be written.
    pub forbidden: Vec<PathBuf>,
    /// Re-read each file right before writing and fail if it changed.
    pub verify_unchanged: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drift_window: 8,
            create_parent_dirs: true,
            forbidden: vec![PathBuf::from(".git")],
            verify_unchanged: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml_edit::de::Error),

    #[error("invalid config: forbidden entry must be relative: {0}")]
    AbsoluteForbidden(PathBuf),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(entry) = self.forbidden.iter().find(|entry| entry.is_absolute()) {
            return Err(ConfigError::AbsoluteForbidden(entry.clone()));
        }
        Ok(())
    }
}

pub fn load_config_str(input: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml_edit::de::from_str(input)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&contents)
}

/// Explicit path first, then `<cwd>/.hashline.toml`, then defaults.
pub fn discover_config(explicit: Option<&Path>, cwd: &Path) -> Result<EngineConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let candidate = cwd.join(DEFAULT_CONFIG_FILE);
    if candidate.is_file() {
        return load_config(candidate);
    }
    Ok(EngineConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = load_config_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.drift_window, 8);
    }

    #[test]
    fn test_partial_override() {
        let config = load_config_str("drift-window = 3\nforbidden = [\".git\", \"target\"]\n").unwrap();
        assert_eq!(config.drift_window, 3);
        assert_eq!(config.forbidden.len(), 2);
        assert!(config.verify_unchanged);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            load_config_str("drift = 3\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_absolute_forbidden_rejected() {
        assert!(matches!(
            load_config_str("forbidden = [\"/etc\"]\n"),
            Err(ConfigError::AbsoluteForbidden(_))
        ));
    }

    #[test]
    fn test_discover_prefers_workspace_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(
            discover_config(None, temp_dir.path()).unwrap(),
            EngineConfig::default()
        );
        fs::write(temp_dir.path().join(DEFAULT_CONFIG_FILE), "drift-window = 2\n").unwrap();
        assert_eq!(discover_config(None, temp_dir.path()).unwrap().drift_window, 2);
    }
}
