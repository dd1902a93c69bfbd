//! Workbench configuration loaded from an optional TOML file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_HITS: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Module the simulated target loads at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: "target.exe".into(),
            base: 0x40_0000,
            size: 0x10_0000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hits before an echo breakpoint removes itself
    pub max_hits: u32,
    /// Directory for JSON trace files; traces stay in memory when unset
    pub store_dir: Option<PathBuf>,
    pub module: ModuleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_hits: DEFAULT_MAX_HITS,
            store_dir: None,
            module: ModuleConfig::default(),
        }
    }
}

impl Config {
    /// Load a config file, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_hits == 0 {
            return Err(ConfigError::Invalid("max_hits must be positive".into()));
        }
        if self.module.name.is_empty() {
            return Err(ConfigError::Invalid("module name can not be empty".into()));
        }
        if self.module.size == 0 {
            return Err(ConfigError::Invalid(format!(
                "module {} has no size",
                self.module.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("echotrace.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echotrace.toml");
        std::fs::write(&path, "max_hits = 4\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_hits, 4);
        assert_eq!(config.module, ModuleConfig::default());
        assert!(config.store_dir.is_none());
    }

    #[test]
    fn test_module_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echotrace.toml");
        std::fs::write(
            &path,
            "store_dir = \"traces\"\n\n[module]\nname = \"calc.exe\"\nbase = 4096\nsize = 8192\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store_dir, Some(PathBuf::from("traces")));
        assert_eq!(config.module.name, "calc.exe");
        assert_eq!(config.module.base, 0x1000);
    }

    #[test]
    fn test_zero_max_hits_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echotrace.toml");
        std::fs::write(&path, "max_hits = 0\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echotrace.toml");
        std::fs::write(&path, "max_hits = \"many\"\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
