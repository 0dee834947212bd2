//! Configuration file parser
//!
//! Parses redis.conf-style files: one `parameter value` per line, `#`
//! comments, yes/no booleans.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use super::{Config, LogLevel};

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigParseError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid line format
    #[error("Invalid line format at line {0}: {1}")]
    Format(usize, String),

    /// Invalid parameter value
    #[error("Invalid value for parameter '{0}' at line {1}: {2}")]
    Value(String, usize, String),
}

/// Parse a redis.conf-style configuration file
pub fn parse_config_file(path: &Path) -> Result<Config, ConfigParseError> {
    let file = File::open(path)?;
    parse_config_reader(BufReader::new(file))
}

/// Parse configuration text
pub fn parse_config_str(text: &str) -> Result<Config, ConfigParseError> {
    parse_config_reader(text.as_bytes())
}

fn parse_config_reader<R: BufRead>(reader: R) -> Result<Config, ConfigParseError> {
    let mut config = Config::default();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((param, value)) = line.split_once(char::is_whitespace) else {
            return Err(ConfigParseError::Format(line_num + 1, line.to_string()));
        };

        apply_config_param(&mut config, &param.to_lowercase(), value.trim(), line_num + 1)?;
    }

    config.validate()?;
    Ok(config)
}

/// Apply a configuration parameter to the config
fn apply_config_param(
    config: &mut Config,
    param: &str,
    value: &str,
    line_num: usize,
) -> Result<(), ConfigParseError> {
    match param {
        "databases" => {
            config.server.databases = parse_value(param, value, line_num)?;
        }
        "loglevel" => {
            config.server.log_level = LogLevel::parse(value)
                .ok_or_else(|| invalid(param, value, line_num))?;
        }
        "hz" => {
            config.server.hz = parse_value(param, value, line_num)?;
        }
        "stream-node-max-entries" => {
            config.streams.node_max_entries = parse_value(param, value, line_num)?;
        }
        "lua-scripting" => {
            config.scripting.enabled = parse_yes_no(param, value, line_num)?;
        }
        "seed" => {
            config.seed = Some(parse_value(param, value, line_num)?);
        }
        _ => {
            warn!(param, line = line_num, "Unknown configuration parameter, skipping");
        }
    }

    Ok(())
}

fn invalid(param: &str, value: &str, line_num: usize) -> ConfigParseError {
    ConfigParseError::Value(param.to_string(), line_num, value.to_string())
}

/// Parse a value that implements FromStr
fn parse_value<T: FromStr>(param: &str, value: &str, line_num: usize) -> Result<T, ConfigParseError> {
    value.parse::<T>().map_err(|_| invalid(param, value, line_num))
}

/// Parse a yes/no value
fn parse_yes_no(param: &str, value: &str, line_num: usize) -> Result<bool, ConfigParseError> {
    match value.to_lowercase().as_str() {
        "yes" | "1" => Ok(true),
        "no" | "0" => Ok(false),
        _ => Err(invalid(param, value, line_num)),
    }
}
