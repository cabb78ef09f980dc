//! Configuration management for qcast

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub queue: QueueConfig,
    pub facebook: Option<FacebookConfig>,
    pub instagram: Option<InstagramConfig>,
    pub tiktok: Option<TiktokConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue document path
    pub path: String,
    /// Root for per-post staged media directories
    pub staged_dir: String,
    /// Run lock marker path
    pub lock_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub enabled: bool,
    pub page_id: String,
    pub token_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub enabled: bool,
    /// Instagram Business account ID
    pub account_id: String,
    /// Linked Facebook Page, used to host local files for CDN URLs
    pub page_id: String,
    pub token_file: String,
}

fn default_privacy_level() -> String {
    "SELF_ONLY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiktokConfig {
    pub enabled: bool,
    pub token_file: String,
    #[serde(default = "default_privacy_level")]
    pub privacy_level: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            queue: QueueConfig {
                path: "~/.local/share/qcast/queue.json".to_string(),
                staged_dir: "~/.local/share/qcast/scheduled_media".to_string(),
                lock_file: "~/.local/share/qcast/scheduler.lock".to_string(),
            },
            facebook: Some(FacebookConfig {
                enabled: false,
                page_id: String::new(),
                token_file: "~/.config/qcast/facebook.token".to_string(),
            }),
            instagram: Some(InstagramConfig {
                enabled: false,
                account_id: String::new(),
                page_id: String::new(),
                token_file: "~/.config/qcast/instagram.token".to_string(),
            }),
            tiktok: Some(TiktokConfig {
                enabled: false,
                token_file: "~/.config/qcast/tiktok.token".to_string(),
                privacy_level: default_privacy_level(),
            }),
        }
    }

    pub fn queue_path(&self) -> PathBuf {
        expand(&self.queue.path)
    }

    pub fn staged_root(&self) -> PathBuf {
        expand(&self.queue.staged_dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        expand(&self.queue.lock_file)
    }
}

impl FacebookConfig {
    pub fn expand_token_file_path(&self) -> PathBuf {
        expand(&self.token_file)
    }
}

impl InstagramConfig {
    pub fn expand_token_file_path(&self) -> PathBuf {
        expand(&self.token_file)
    }
}

impl TiktokConfig {
    pub fn expand_token_file_path(&self) -> PathBuf {
        expand(&self.token_file)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("QCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("qcast").join("config.toml"))
}
