use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::ConfigError;
use crate::groups::DEFAULT_PLAYER_GROUPS;
use crate::segment::DEFAULT_NUM_BUFFERS;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RECORD_DIR: &str = "audiofiles";
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

pub trait Validate {
    fn validate(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub record_dir: PathBuf,
    /// Sample rate of the recorder stream, also the hop length.
    pub sample_rate: u32,
    pub num_buffers: usize,
    pub player_groups: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            record_dir: PathBuf::from(DEFAULT_RECORD_DIR),
            sample_rate: DEFAULT_SAMPLE_RATE,
            num_buffers: DEFAULT_NUM_BUFFERS,
            player_groups: DEFAULT_PLAYER_GROUPS,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                host: self.host.clone(),
                port: self.port,
            })
    }
}

impl Validate for ServerConfig {
    fn validate(&mut self) {
        if self.host.trim().is_empty() {
            warn!("Invalid host: empty string. Using default: {DEFAULT_HOST}");
            self.host = DEFAULT_HOST.to_string();
        }

        if self.port == 0 {
            warn!("Invalid port: 0. Using default: {DEFAULT_PORT}");
            self.port = DEFAULT_PORT;
        }

        if self.record_dir.as_os_str().is_empty() {
            warn!("Invalid record_dir: empty path. Using default: {DEFAULT_RECORD_DIR}");
            self.record_dir = PathBuf::from(DEFAULT_RECORD_DIR);
        }

        if !(8000..=192000).contains(&self.sample_rate) {
            warn!(
                "Invalid sample_rate: {}. Using default: {DEFAULT_SAMPLE_RATE}",
                self.sample_rate
            );
            self.sample_rate = DEFAULT_SAMPLE_RATE;
        }

        if self.num_buffers < 2 {
            warn!(
                "Invalid num_buffers: {}. Using default: {DEFAULT_NUM_BUFFERS}",
                self.num_buffers
            );
            self.num_buffers = DEFAULT_NUM_BUFFERS;
        }

        if self.player_groups == 0 {
            warn!("Invalid player_groups: 0. Using default: {DEFAULT_PLAYER_GROUPS}");
            self.player_groups = DEFAULT_PLAYER_GROUPS;
        }
    }
}

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Loader for the per-user configuration file.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("grainfield");
        Self::with_dir(config_dir)
    }

    pub fn with_dir(config_dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        Ok(Self {
            config_path: config_dir.join("config.toml"),
        })
    }

    /// Loader for an explicit file.
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load_or_create(&self) -> Result<ServerConfig> {
        if !self.config_path.exists() {
            let default_config = ServerConfig::default();
            self.save(&default_config)?;
            Ok(default_config)
        } else {
            self.load_and_normalize()
        }
    }

    fn load_and_normalize(&self) -> Result<ServerConfig> {
        let content =
            fs::read_to_string(&self.config_path).context("Failed to read config file")?;

        let mut config: ServerConfig = match toml::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                let backup_path = self.config_path.with_extension("toml.backup");
                fs::write(&backup_path, &content).context("Failed to write backup")?;
                error!(
                    "Config file corrupted: {}. Backup saved to {:?}. Using defaults.",
                    e, backup_path
                );
                let default = ServerConfig::default();
                self.save(&default)?;
                return Ok(default);
            }
        };

        config.validate();

        let current_toml =
            toml::to_string_pretty(&config).context("Failed to serialize config")?;
        if content.trim() != current_toml.trim() {
            self.save(&config)?;
        }

        Ok(config)
    }

    pub fn save(&self, config: &ServerConfig) -> Result<()> {
        let toml_string = toml::to_string_pretty(config).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, toml_string).context("Failed to write config file")?;
        Ok(())
    }
}
