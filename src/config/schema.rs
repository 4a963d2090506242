//! Configuration schema for Trellis
//!
//! Global configuration lives at `~/.config/trellis/config.toml`; a project
//! may override any key in a local `trellis.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Compile configuration shared by every template
    pub site: SiteConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Compilation cache settings
    pub cache: CacheConfig,

    /// Project layout
    pub project: ProjectConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Compile configuration.
///
/// The serialized form of this struct is part of every content digest, so
/// any change here invalidates persisted artifacts. The in-memory cache tier
/// is partitioned by the identity of the `Arc<SiteConfig>` handed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Public origin of the deployed site (e.g. "https://example.com")
    pub site: Option<String>,

    /// URL prefix every generated asset link starts with
    pub base: String,

    /// Collapse whitespace runs in literal markup
    pub compress_html: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site: None,
            base: "/".to_string(),
            compress_html: true,
        }
    }
}

impl SiteConfig {
    /// Join a path onto `base`, avoiding doubled slashes
    pub fn asset_url(&self, path: &str) -> String {
        let base = self.base.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Maximum internal reroutes per request
    pub max_reroute_depth: u32,

    /// Accept WebSocket upgrades
    pub websocket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4321,
            max_reroute_depth: 5,
            websocket: true,
        }
    }
}

/// Compilation cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep compiled artifacts across restarts (default: true)
    pub persistent: bool,

    /// Override the persistent cache directory
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            dir: None,
        }
    }
}

/// Project layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root, relative to the directory holding the config file
    pub root: PathBuf,

    /// Directory under `root` holding routable pages
    pub pages_dir: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            pages_dir: "pages".to_string(),
        }
    }
}
