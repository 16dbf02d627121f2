use crate::session::{Mode, Session};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result of [`Config::load_or_create`]
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Config),
    /// No file existed; an example was written in its place
    Created,
}

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Address the relay binds its sockets to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Authenticator server address
    pub host: String,

    /// Server ports to relay (RADIUS authentication and accounting by default)
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// "passive" forwards bytes untouched, "active" decodes and intercepts
    #[serde(default)]
    pub mode: Mode,

    /// Drop client endpoints idle for this many seconds (default: never)
    #[serde(default)]
    pub idle_timeout: Option<u64>,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Packet codes the built-in interceptor drops in active mode
    #[serde(default)]
    pub drop_codes: Vec<u8>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_ports() -> Vec<u16> {
    vec![1812, 1813]
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration, writing [`Config::example`] only when the file
    /// does not exist. Unreadable, malformed or invalid files are reported
    /// and left as they are.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<LoadOutcome, ConfigError> {
        let path = path.as_ref();
        match Config::from_file(path) {
            Ok(config) => Ok(LoadOutcome::Loaded(config)),
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Config::example().to_file(path)?;
                Ok(LoadOutcome::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address))
        })
    }

    pub fn host_ip(&self) -> Result<IpAddr, ConfigError> {
        self.host
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid host address: {}", self.host)))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.map(Duration::from_secs)
    }

    /// Relay session described by this configuration
    pub fn session(&self) -> Result<Session, ConfigError> {
        Ok(Session::configure(
            self.mode,
            self.host_ip()?,
            self.ports.iter().copied(),
        ))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_ip()?;
        self.host_ip()?;

        if self.ports.is_empty() {
            return Err(ConfigError::Invalid("No ports configured".to_string()));
        }
        if self.ports.contains(&0) {
            return Err(ConfigError::Invalid("Port cannot be 0".to_string()));
        }

        if self.idle_timeout == Some(0) {
            return Err(ConfigError::Invalid(
                "Idle timeout must be positive (omit it to disable eviction)".to_string(),
            ));
        }

        if !self.drop_codes.is_empty() && self.mode == Mode::Passive {
            return Err(ConfigError::Invalid(
                "drop_codes requires active mode".to_string(),
            ));
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            listen_address: "0.0.0.0".to_string(),
            host: "192.168.1.10".to_string(),
            ports: default_ports(),
            mode: Mode::Active,
            idle_timeout: Some(300),
            log_level: Some("info".to_string()),
            drop_codes: vec![],
        }
    }
}
