//! Server configuration.
//!
//! Configuration is read once at startup from a YAML file (path taken from
//! `LANTERN_CONFIG`, default `lantern.yaml`). A missing file means defaults.
//! The `LISTEN` environment variable overrides the listen address.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "lantern.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub compression: CompressionConfig,
    pub privacy: PrivacyConfig,
    pub tls: TlsPolicy,
    pub access: AccessConfig,
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Name of the local host.
    pub hostname: String,
    /// Unique id of the local host.
    pub guid: String,
    /// Document root for static files.
    pub web_dir: PathBuf,
    /// User that must own every served file. Empty means the effective user.
    pub web_files_owner: String,
    /// Group that must own every served file. Empty means the effective group.
    pub web_files_group: String,
    /// Requests still incomplete beyond this many bytes are refused.
    pub max_request_size: usize,
    /// Data collection interval in seconds; used as the expiry of
    /// non-cacheable responses.
    pub update_every: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// gzip level, 1..=9
    pub level: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub respect_do_not_track: bool,
    pub x_frame_options: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsPolicy {
    /// Plain-text dashboard requests are redirected to https.
    pub force_http: bool,
    /// Plain-text STREAM requests are refused.
    pub force_stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub dashboard: bool,
    pub registry: bool,
    pub badges: bool,
    pub management: bool,
    pub config: bool,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub hostname: String,
    pub guid: String,
    #[serde(default = "default_update_every")]
    pub update_every: u64,
}

fn default_update_every() -> u64 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:19999".to_string(),
            hostname: "localhost".to_string(),
            guid: "00000000-0000-0000-0000-000000000000".to_string(),
            web_dir: PathBuf::from("web"),
            web_files_owner: String::new(),
            web_files_group: String::new(),
            max_request_size: 16_384,
            update_every: default_update_every(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 3,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            dashboard: true,
            registry: true,
            badges: true,
            management: false,
            config: false,
            stream: true,
        }
    }
}

impl Config {
    /// Loads the configuration from `LANTERN_CONFIG` (or the default path)
    /// and applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("LANTERN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("Invalid configuration file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text).context("Malformed YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Renders the effective configuration; served as the diagnostic dump.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration")
    }

    fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.compression.level) {
            anyhow::bail!(
                "invalid compression level {} (must be 1-9)",
                self.compression.level
            );
        }
        if self.server.update_every == 0 {
            anyhow::bail!("update_every must be at least 1 second");
        }
        Ok(())
    }
}
