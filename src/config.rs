//! Configuration module for the framekv server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocol::{DEFAULT_MAX_ARGS, DEFAULT_MAX_MESSAGE};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "framekv")]
#[command(version)]
#[command(about = "A single-threaded key-value server over a length-prefixed protocol", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:1234)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Maximum frame payload size in bytes
    #[arg(long)]
    pub max_message: Option<usize>,

    /// Maximum number of arguments per request
    #[arg(long)]
    pub max_args: Option<usize>,

    /// Maximum number of open client connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum number of open client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Readiness events fetched per poll
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Upper bound for a single socket read
    #[serde(default = "default_read_chunk")]
    pub read_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
            event_capacity: default_event_capacity(),
            read_chunk: default_read_chunk(),
        }
    }
}

/// Wire protocol limits
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_max_message")]
    pub max_message: usize,
    #[serde(default = "default_max_args")]
    pub max_args: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_message: default_max_message(),
            max_args: default_max_args(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:1234".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_event_capacity() -> usize {
    1024
}

fn default_read_chunk() -> usize {
    64 * 1024
}

fn default_max_message() -> usize {
    DEFAULT_MAX_MESSAGE
}

fn default_max_args() -> usize {
    DEFAULT_MAX_ARGS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub max_connections: usize,
    pub event_capacity: usize,
    pub read_chunk: usize,
    pub max_message: usize,
    pub max_args: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Merge parsed CLI arguments over the TOML file they point to, if any.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match cli.config {
            Some(ref path) => read_toml(path)?,
            None => TomlConfig::default(),
        };

        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            event_capacity: toml_config.server.event_capacity,
            read_chunk: toml_config.server.read_chunk,
            max_message: cli
                .max_message
                .unwrap_or(toml_config.protocol.max_message),
            max_args: cli.max_args.unwrap_or(toml_config.protocol.max_args),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::InvalidListen(self.listen.clone()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        for (name, value) in [
            ("max_connections", self.max_connections),
            ("event_capacity", self.event_capacity),
            ("read_chunk", self.read_chunk),
            ("max_message", self.max_message),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.max_message > u32::MAX as usize {
            return Err(ConfigError::MessageLimitTooLarge(self.max_message));
        }
        Ok(())
    }
}

fn read_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file {0:?}: {1}")]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid listen address '{0}'")]
    InvalidListen(String),
    #[error("'{0}' must be greater than zero")]
    Zero(&'static str),
    #[error("max_message {0} does not fit the 32-bit length prefix")]
    MessageLimitTooLarge(usize),
}
