use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::DEFAULT_STATUS_SOCKET_PATH;
use shared::types::HealthCheckConf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Upper bound on writing one report to one client
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    /// Permission bits applied to the socket file after bind
    #[serde(default)]
    pub socket_mode: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub address: String,
    #[serde(default)]
    pub health_check: HealthCheckConf,
    #[serde(default)]
    pub instances: Vec<String>,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATUS_SOCKET_PATH)
}

fn default_write_timeout() -> u64 {
    5
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            write_timeout_secs: default_write_timeout(),
            socket_mode: None,
        }
    }
}

impl StatusConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }
}
