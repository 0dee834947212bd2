//! Error types for Embedis
//!
//! This module defines all error types used throughout the engine.
//! We follow Redis's error conventions where applicable: the `Display`
//! form of every error is the reply line a Redis server would send.

use std::io;

use crate::config::ConfigParseError;

/// Main error type for Embedis operations
#[derive(Debug, thiserror::Error)]
pub enum EmbedisError {
    /// Command parsing and execution errors
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Storage engine errors
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Script evaluation errors
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigParseError),

    /// I/O errors (CLI and config loading only)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Command-specific errors that map to Redis error responses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Unknown command
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    /// Unknown subcommand of a container command (SCRIPT, XGROUP, XINFO)
    #[error("ERR unknown subcommand '{subcommand}'. Try {command} HELP.")]
    UnknownSubcommand { command: String, subcommand: String },

    /// Wrong number of arguments for command
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongNumberOfArgs(String),

    /// Syntax error in command
    #[error("ERR syntax error")]
    SyntaxError,

    /// Value is not an integer or out of range
    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    /// Value is not a valid float
    #[error("ERR value is not a valid float")]
    NotFloat,

    /// Integer overflow
    #[error("ERR increment or decrement would overflow")]
    IntegerOverflow,

    /// Index out of range
    #[error("ERR index out of range")]
    IndexOutOfRange,

    /// Key not found where one is required
    #[error("ERR no such key")]
    NoSuchKey,

    /// Invalid argument for command
    #[error("ERR {0}")]
    InvalidArgument(String),

    /// Unsupported option value (for example an unknown AGGREGATE function)
    #[error("ERR unsupported {option} '{value}'")]
    Unsupported { option: String, value: String },

    /// Referenced script was never loaded or has been flushed
    #[error("NOSCRIPT No matching script. Please use EVAL.")]
    NoScript,

    /// Referenced consumer group does not exist
    #[error("NOGROUP No such key '{key}' or consumer group '{group}'")]
    NoGroup { key: String, group: String },

    /// Consumer group already exists
    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,

    /// Command not allowed in the current session state
    #[error("ERR {0}")]
    InvalidState(String),

    /// EXEC on a transaction that had a rejected command
    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,
}

/// Storage-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Wrong data type for operation
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Database index out of range
    #[error("ERR DB index is out of range")]
    InvalidDatabase,
}

/// Script evaluation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// The script failed to compile
    #[error("ERR Error compiling script: {0}")]
    Compile(String),

    /// The script raised a Lua error
    #[error("ERR Error running script: {0}")]
    Runtime(String),

    /// An error reply raised by `redis.call`, passed through unchanged
    #[error("{0}")]
    Raised(String),

    /// The script was aborted by SCRIPT KILL
    #[error("ERR Error running script: Script killed by user with SCRIPT KILL...")]
    Killed,

    /// SCRIPT KILL with nothing running
    #[error("NOTBUSY No scripts in execution right now.")]
    NotBusy,

    /// SCRIPT KILL on a script that already wrote
    #[error("UNKILLABLE Sorry the script already executed write commands against the dataset.")]
    Unkillable,

    /// Command not permitted from inside a script
    #[error("ERR This Redis command is not allowed from script: {0}")]
    NotAllowed(String),
}

/// Classification of errors, independent of the concrete variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation applied to a key holding the wrong value type
    TypeMismatch,
    /// Malformed arguments or bounds
    InvalidArgument,
    /// Referenced script, group or key absent
    NotFound,
    /// Unrecognised subcommand or option value
    UnsupportedOperation,
    /// Command issued in the wrong session state
    State,
    /// Script runtime failure
    Script,
    /// Anything else
    Internal,
}

/// Type alias for Results throughout Embedis
pub type Result<T> = std::result::Result<T, EmbedisError>;

impl EmbedisError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbedisError::Storage(StorageError::WrongType) => ErrorKind::TypeMismatch,
            EmbedisError::Storage(StorageError::InvalidDatabase) => ErrorKind::InvalidArgument,
            EmbedisError::Command(err) => err.kind(),
            EmbedisError::Script(ScriptError::NotBusy) | EmbedisError::Script(ScriptError::Unkillable) => {
                ErrorKind::State
            }
            EmbedisError::Script(_) => ErrorKind::Script,
            EmbedisError::Config(_) | EmbedisError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl CommandError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownCommand(_)
            | CommandError::UnknownSubcommand { .. }
            | CommandError::Unsupported { .. } => ErrorKind::UnsupportedOperation,
            CommandError::WrongNumberOfArgs(_)
            | CommandError::SyntaxError
            | CommandError::NotInteger
            | CommandError::NotFloat
            | CommandError::IntegerOverflow
            | CommandError::IndexOutOfRange
            | CommandError::InvalidArgument(_)
            | CommandError::BusyGroup => ErrorKind::InvalidArgument,
            CommandError::NoSuchKey | CommandError::NoScript | CommandError::NoGroup { .. } => {
                ErrorKind::NotFound
            }
            CommandError::InvalidState(_) | CommandError::ExecAbort => ErrorKind::State,
        }
    }

    /// Shorthand for an `InvalidArgument` with a message
    pub fn invalid(msg: impl Into<String>) -> Self {
        CommandError::InvalidArgument(msg.into())
    }
}
