//! Configuration file handling.
//!
//! Reads from `~/.config/sesame/sesame.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Editing session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditConfig {
    /// Whether projections handed to the surface carry protected values.
    #[serde(default = "default_include_sensitive")]
    pub include_sensitive: bool,
    /// Password generator settings.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Password generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default = "default_class_enabled")]
    pub uppercase: bool,
    #[serde(default = "default_class_enabled")]
    pub lowercase: bool,
    #[serde(default = "default_class_enabled")]
    pub digits: bool,
    #[serde(default)]
    pub symbols: bool,
}

fn default_include_sensitive() -> bool {
    true
}

fn default_length() -> usize {
    20
}

fn default_class_enabled() -> bool {
    true
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            include_sensitive: default_include_sensitive(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            length: default_length(),
            uppercase: default_class_enabled(),
            lowercase: default_class_enabled(),
            digits: default_class_enabled(),
            symbols: false,
        }
    }
}

impl EditConfig {
    /// Load configuration from the config file.
    ///
    /// If `custom_path` is provided, load from that path.
    /// Otherwise, load from the default XDG config location.
    /// Creates a default config file if it doesn't exist (only for default path).
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self> {
        let is_custom = custom_path.is_some();
        let config_path = match custom_path {
            Some(path) => path,
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            // Only create default config for the default path
            if !is_custom {
                let config = EditConfig::default();
                config.save_to(&config_path)?;
                tracing::info!("Created default config: {:?}", config);
                return Ok(config);
            } else {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: EditConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded config from {}: {:?}", config_path.display(), config);
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }

    /// Get the path to the config file.
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("sesame").join("sesame.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = EditConfig::default();
        assert!(config.include_sensitive);
        assert_eq!(config.generator.length, 20);
        assert!(!config.generator.symbols);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: EditConfig = toml::from_str("[generator]\nlength = 8\n").unwrap();
        assert_eq!(config.generator.length, 8);
        assert!(config.generator.lowercase);
        assert!(config.include_sensitive);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sesame.toml");

        let mut config = EditConfig::default();
        config.include_sensitive = false;
        config.generator.symbols = true;
        config.save_to(&path).unwrap();

        let loaded = EditConfig::load(Some(path)).unwrap();
        assert!(!loaded.include_sensitive);
        assert!(loaded.generator.symbols);
    }

    #[test]
    fn missing_custom_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EditConfig::load(Some(dir.path().join("absent.toml"))).is_err());
    }
}
