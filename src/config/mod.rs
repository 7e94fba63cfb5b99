//! Configuration module
//!
//! Handles loading and saving z21link configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::NetworkConfig;
use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Command station settings
    #[serde(default)]
    pub station: StationConfig,

    /// Probe and renewal timers
    #[serde(default)]
    pub liveness: LivenessSettings,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log filter directive, overrides the verbose flag (e.g. "z21link=trace")
    pub log_filter: Option<String>,
    /// Buffered events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_filter: None,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Command station configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station host name or IP address
    pub host: Option<String>,
    /// Station UDP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local address to bind the UDP socket to
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 0))
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            bind_address: default_bind_address(),
        }
    }
}

/// Liveness timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessSettings {
    /// Seconds between reachability probes
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    /// Seconds between broadcast subscription renewals
    #[serde(default = "default_renewal_interval")]
    pub renewal_interval_secs: u64,
    /// Probe timeout in ms
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

fn default_probe_interval() -> u64 {
    5
}

fn default_renewal_interval() -> u64 {
    50
}

fn default_probe_timeout() -> u64 {
    2000
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
            renewal_interval_secs: default_renewal_interval(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("z21link/config.toml")),
            Some(PathBuf::from("./z21link.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::debug!("Using config file {}", path.display());
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Runtime network settings for the client
    pub fn network_config(&self) -> NetworkConfig {
        let mut network = NetworkConfig::new(self.station.port)
            .with_bind_address(self.station.bind_address)
            .with_intervals(
                Duration::from_secs(self.liveness.probe_interval_secs.max(1)),
                Duration::from_secs(self.liveness.renewal_interval_secs.max(1)),
            );
        network.probe_timeout = Duration::from_millis(self.liveness.probe_timeout_ms);
        network.event_capacity = self.general.event_capacity;
        network
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        station: StationConfig {
            host: Some("192.168.0.111".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    Ok(toml::to_string_pretty(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.station.port, DEFAULT_PORT);
        assert_eq!(config.liveness.probe_interval_secs, 5);
        assert_eq!(config.liveness.renewal_interval_secs, 50);
        assert!(config.station.host.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let mut config = Config::default();
        config.station.host = Some("z21.local".to_string());
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = Config::load(file.path()).unwrap();
        assert_eq!(loaded.station.port, config.station.port);
        assert_eq!(loaded.station.host.as_deref(), Some("z21.local"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[station]\nhost = \"10.0.0.5\"\n\n[liveness]\nprobe_interval_secs = 10").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.station.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.station.port, DEFAULT_PORT);
        assert_eq!(config.liveness.probe_interval_secs, 10);
        assert_eq!(config.liveness.renewal_interval_secs, 50);
        assert_eq!(config.general.event_capacity, 256);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match Config::load(&path) {
            Err(ConfigError::NotFound(p)) => assert_eq!(p, path),
            _ => panic!("Wrong result for missing file"),
        }
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[station\nport = ").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_network_config_conversion() {
        let mut config = Config::default();
        config.station.port = 21106;
        config.liveness.probe_timeout_ms = 500;
        config.general.event_capacity = 16;

        let network = config.network_config();
        assert_eq!(network.port, 21106);
        assert_eq!(network.probe_interval, Duration::from_secs(5));
        assert_eq!(network.renewal_interval, Duration::from_secs(50));
        assert_eq!(network.probe_timeout, Duration::from_millis(500));
        assert_eq!(network.event_capacity, 16);
    }

    #[test]
    fn test_sample_config() {
        let sample = generate_sample_config().unwrap();
        let parsed: Config = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.station.host.as_deref(), Some("192.168.0.111"));
        assert_eq!(parsed.station.port, DEFAULT_PORT);
    }
}
