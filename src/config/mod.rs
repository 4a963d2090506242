//! Configuration management for Trellis

pub mod schema;

pub use schema::{Config, SiteConfig};

use crate::error::{TrellisError, TrellisResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the project-local configuration file
pub const LOCAL_CONFIG_FILE: &str = "trellis.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trellis")
            .join("config.toml")
    }

    /// Get the default persistent compiler cache directory
    pub fn compiler_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trellis")
            .join("compiler")
    }

    /// Walk up from `start` looking for a project-local `trellis.toml`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> TrellisResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load global configuration with an optional local file merged on top.
    ///
    /// A relative `project.root` in the local file is resolved against the
    /// directory containing that file.
    pub async fn load_merged(&self, local: Option<&Path>) -> TrellisResult<Config> {
        let mut merged = self.load_table(&self.config_path).await?;

        if let Some(local_path) = local {
            let overlay = self.load_table(local_path).await?;
            merge_tables(&mut merged, overlay);
        }

        let mut config: Config = toml::Value::Table(merged).try_into().map_err(
            |e: toml::de::Error| TrellisError::ConfigInvalid {
                path: local.unwrap_or(&self.config_path).to_path_buf(),
                reason: e.to_string(),
            },
        )?;

        if let Some(dir) = local.and_then(Path::parent) {
            if config.project.root.is_relative() {
                config.project.root = dir.join(&config.project.root);
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> TrellisResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TrellisError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| TrellisError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    async fn load_table(&self, path: &Path) -> TrellisResult<toml::Table> {
        if !path.exists() {
            return Ok(toml::Table::new());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TrellisError::io(format!("reading config from {}", path.display()), e))?;

        content.parse().map_err(|e: toml::de::Error| TrellisError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> TrellisResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            TrellisError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> TrellisResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TrellisError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Persistent compiler cache directory, honoring `cache.dir`
    pub fn compiler_cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(ConfigManager::compiler_cache_dir)
    }
}

/// Recursively merge `overlay` into `base`; overlay wins on conflicts
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
