use crate::batch::{AssemblerConfig, CompoundSplit};
use crate::buffer::BufferConfig;
use crate::reliability::RetryConfig;
use crate::sender::HttpDispatcherConfig;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Argument error: {0}")]
    ArgError(#[from] clap::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("unknown log level '{s}'")),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Outbound message buffer for worker nodes", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Buffered weight at which producers start waiting
    #[arg(long, env = "OUT_BUFFER_MAX_BUFFER_WEIGHT", default_value = "30000")]
    pub max_buffer_weight: u64,

    /// Weight above which a bulk is closed and dispatched
    #[arg(long, env = "OUT_BUFFER_MAX_BULK_WEIGHT", default_value = "1500")]
    pub max_bulk_weight: u64,

    /// Total dispatch attempts per bulk
    #[arg(long, env = "OUT_BUFFER_RETRY_NUMBER", default_value = "5")]
    pub retry_number: u32,

    /// Pause between dispatch attempts in milliseconds
    #[arg(long, env = "OUT_BUFFER_RETRY_DELAY_MS", default_value = "5000")]
    pub retry_delay_ms: u64,

    /// Never split a multi-message submission across bulks
    #[arg(long, env = "OUT_BUFFER_KEEP_COMPOUNDS_WHOLE")]
    pub keep_compounds_whole: bool,

    /// Orchestrator bulk endpoint URL
    #[arg(
        long,
        env = "ORCHESTRATOR_ENDPOINT",
        default_value = "http://orchestrator:8080/v1/bulks"
    )]
    pub orchestrator_endpoint: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Gzip request bodies
    #[arg(long, env = "ENABLE_COMPRESSION")]
    pub enable_compression: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_buffer_weight: crate::buffer::outbound::DEFAULT_MAX_BUFFER_WEIGHT,
            max_bulk_weight: crate::batch::assembler::DEFAULT_MAX_BULK_WEIGHT,
            retry_number: crate::reliability::retry::DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: crate::reliability::retry::DEFAULT_RETRY_DELAY.as_millis() as u64,
            keep_compounds_whole: false,
            orchestrator_endpoint: crate::sender::http::DEFAULT_ORCHESTRATOR_ENDPOINT.to_string(),
            request_timeout_secs: 30,
            enable_compression: false,
            log_level: LogLevel::Info,
            log_json: false,
            config_file: None,
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `OUT_BUFFER_*` and related variables. When `CONFIG_FILE` is
    /// set the file provides the base values and variables override them.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("CONFIG_FILE") {
            Ok(path) => {
                let mut config = Self::read_file(&path)?;
                config.config_file = Some(PathBuf::from(path));
                config
            }
            Err(_) => Config::default(),
        };

        load_env_var("OUT_BUFFER_MAX_BUFFER_WEIGHT", &mut config.max_buffer_weight)?;
        load_env_var("OUT_BUFFER_MAX_BULK_WEIGHT", &mut config.max_bulk_weight)?;
        load_env_var("OUT_BUFFER_RETRY_NUMBER", &mut config.retry_number)?;
        load_env_var("OUT_BUFFER_RETRY_DELAY_MS", &mut config.retry_delay_ms)?;
        load_env_var(
            "OUT_BUFFER_KEEP_COMPOUNDS_WHOLE",
            &mut config.keep_compounds_whole,
        )?;
        load_env_string("ORCHESTRATOR_ENDPOINT", &mut config.orchestrator_endpoint);
        load_env_var("REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        load_env_var("ENABLE_COMPRESSION", &mut config.enable_compression)?;
        load_env_var("LOG_LEVEL", &mut config.log_level)?;
        load_env_var("LOG_JSON", &mut config.log_json)?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path.as_ref())?;
        config.config_file = Some(path.as_ref().to_path_buf());
        config.validate()?;
        Ok(config)
    }

    fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.orchestrator_endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid orchestrator endpoint '{}': {}",
                self.orchestrator_endpoint, e
            ))
        })?;

        if self.max_buffer_weight == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max buffer weight must be greater than 0".to_string(),
            ));
        }

        if self.max_bulk_weight == 0 {
            return Err(ConfigError::InvalidConfig(
                "Max bulk weight must be greater than 0".to_string(),
            ));
        }

        if self.retry_number == 0 {
            return Err(ConfigError::InvalidConfig(
                "Retry number must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_buffer_weight: self.max_buffer_weight,
        }
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            max_bulk_weight: self.max_bulk_weight,
            compound_split: if self.keep_compounds_whole {
                CompoundSplit::KeepWhole
            } else {
                CompoundSplit::Split
            },
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_number,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn http_dispatcher_config(&self) -> HttpDispatcherConfig {
        HttpDispatcherConfig {
            endpoint: self.orchestrator_endpoint.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            enable_compression: self.enable_compression,
            ..HttpDispatcherConfig::default()
        }
    }
}

/// Parse `name` into `target` when set; an unset variable keeps the default.
fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        *target = value
            .trim()
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

fn load_env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}
