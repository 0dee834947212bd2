//! Configuration module for Embedis
//!
//! Provides a centralized configuration system that supports both
//! configuration files and command-line arguments.

mod cli;
mod parser;

pub use cli::CliArgs;
pub use parser::{parse_config_file, parse_config_str, ConfigParseError};

use std::path::PathBuf;

use crate::storage::database::DEFAULT_STREAM_NODE_MAX_ENTRIES;

/// Main configuration structure for Embedis
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Engine-wide settings
    pub server: ServerConfig,

    /// Stream storage settings
    pub streams: StreamConfig,

    /// Script evaluator settings
    pub scripting: ScriptConfig,

    /// Seed for the per-database random generators; random when unset
    pub seed: Option<u64>,
}

/// Server-specific configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of databases
    pub databases: usize,

    /// Log level
    pub log_level: LogLevel,

    /// Active expiry sweeps per second (0 disables the sweep)
    pub hz: u32,
}

/// Stream storage configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Entries per storage node; approximate trimming removes whole nodes
    pub node_max_entries: usize,
}

/// Scripting configuration
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Whether EVAL/EVALSHA are available
    pub enabled: bool,
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - most verbose
    Debug,

    /// Verbose level
    Verbose,

    /// Notice level - default
    Notice,

    /// Warning level
    Warning,
}

impl LogLevel {
    /// Parse a redis.conf `loglevel` value
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "verbose" => Some(LogLevel::Verbose),
            "notice" => Some(LogLevel::Notice),
            "warning" => Some(LogLevel::Warning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
        }
    }

    /// The matching `tracing` filter directive
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "trace",
            LogLevel::Verbose => "debug",
            LogLevel::Notice => "info",
            LogLevel::Warning => "warn",
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            databases: 16,
            log_level: LogLevel::Notice,
            hz: 10,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            node_max_entries: DEFAULT_STREAM_NODE_MAX_ENTRIES,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        ScriptConfig { enabled: true }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigParseError> {
        let path = path.into();
        parse_config_file(&path)
    }

    /// Load the file named by `--config`, if any, then apply the flags
    pub fn from_cli(args: &CliArgs) -> Result<Self, ConfigParseError> {
        let mut config = match &args.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_cli_args(args)?;
        Ok(config)
    }

    /// Apply command-line arguments to override config
    pub fn apply_cli_args(&mut self, args: &CliArgs) -> Result<(), ConfigParseError> {
        if let Some(databases) = args.databases {
            self.server.databases = databases;
        }
        if let Some(level) = &args.loglevel {
            self.server.log_level = LogLevel::parse(level)
                .ok_or_else(|| ConfigParseError::Value("loglevel".to_string(), 0, level.clone()))?;
        }
        if let Some(hz) = args.hz {
            self.server.hz = hz;
        }
        if let Some(seed) = args.seed {
            self.seed = Some(seed);
        }
        if args.no_scripting {
            self.scripting.enabled = false;
        }
        self.validate()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigParseError> {
        if self.server.databases == 0 {
            return Err(ConfigParseError::Value("databases".to_string(), 0, "0".to_string()));
        }
        if self.streams.node_max_entries == 0 {
            return Err(ConfigParseError::Value(
                "stream-node-max-entries".to_string(),
                0,
                "0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a configuration parameter by name
    pub fn get(&self, param: &str) -> Option<String> {
        match param {
            "databases" => Some(self.server.databases.to_string()),
            "loglevel" => Some(self.server.log_level.as_str().to_string()),
            "hz" => Some(self.server.hz.to_string()),
            "stream-node-max-entries" => Some(self.streams.node_max_entries.to_string()),
            "lua-scripting" => Some(if self.scripting.enabled { "yes" } else { "no" }.to_string()),
            "seed" => self.seed.map(|seed| seed.to_string()),
            _ => None,
        }
    }

    /// Get all configuration parameters
    pub fn get_all(&self) -> Vec<(String, String)> {
        ["databases", "loglevel", "hz", "stream-node-max-entries", "lua-scripting", "seed"]
            .iter()
            .filter_map(|param| self.get(param).map(|value| (param.to_string(), value)))
            .collect()
    }
}
