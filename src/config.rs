use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::references::{ImageUrls, DEFAULT_API_PATH};
use crate::upload::MAX_FILE_SIZE;

/// Overrides `images.cdn_url` when set to a non-empty value.
pub const CDN_URL_ENV: &str = "IMAGE_CDN_URL";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub images: ImagesConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file `{}`", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file `{}`", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("`images.api_path` must not be empty")]
    EmptyApiPath,
}

impl Config {
    /// Loads the config from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// An empty `api_path` would make every number in an image URL look
    /// like a reference.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.api_path.trim().is_empty() {
            return Err(ConfigError::EmptyApiPath);
        }
        Ok(())
    }

    /// Applies the CDN environment override. `value` is the raw env var, if any.
    pub fn apply_cdn_override(&mut self, value: Option<String>) {
        if let Some(cdn_url) = value.filter(|url| !url.is_empty()) {
            self.images.cdn_url = Some(cdn_url);
        }
    }
}

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Fjall,
    /// Nothing survives a restart.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Directory of the fjall keyspace.
    #[serde(default = "default_data_dir")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_api_path")]
    pub api_path: String,
    pub cdn_url: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            api_path: default_api_path(),
            cdn_url: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ImagesConfig {
    pub fn urls(&self) -> ImageUrls {
        ImageUrls::new(self.api_path.clone(), self.cdn_url.clone())
    }
}

fn default_api_path() -> String {
    DEFAULT_API_PATH.to_owned()
}

fn default_max_upload_bytes() -> usize {
    MAX_FILE_SIZE
}
