use serde::{Deserialize, Serialize};

use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::player::PlayerConfig;
use super::server::ServerConfig;
use super::sut::SutEndpoint;

/// Main configuration structure for Ferrous Replay
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Scenario player settings (timeouts, fake clock, replay)
    #[serde(default)]
    pub player: PlayerConfig,

    /// Mock upstream server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named endpoints of the system under test
    #[serde(default)]
    pub sut: Vec<SutEndpoint>,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. ferrous-replay.toml in current directory
    /// 3. /etc/ferrous-replay/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new("ferrous-replay.toml").exists() {
            Self::from_file("ferrous-replay.toml")?
        } else if std::path::Path::new("/etc/ferrous-replay/config.toml").exists() {
            Self::from_file("/etc/ferrous-replay/config.toml")?
        } else {
            Self::default()
        };

        config.player.apply_env();
        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    /// Load configuration from a specific file
    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply command-line overrides to configuration
    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(timeout) = overrides.query_timeout_ms {
            self.player.query_timeout_ms = timeout;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if !overrides.sut.is_empty() {
            self.sut = overrides.sut;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Mock server port cannot be 0".to_string(),
            ));
        }

        if self.sut.is_empty() {
            return Err(ConfigError::Validation(
                "No SUT endpoints configured".to_string(),
            ));
        }

        if self.player.query_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Query timeout cannot be 0".to_string(),
            ));
        }

        for (i, endpoint) in self.sut.iter().enumerate() {
            if self.sut[..i].iter().any(|e| e.name == endpoint.name) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate SUT endpoint name '{}'",
                    endpoint.name
                )));
            }
        }

        Ok(())
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub server_port: Option<u16>,
    pub query_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
    pub sut: Vec<SutEndpoint>,
}
