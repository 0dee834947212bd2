//! Storage engine for Embedis
//!
//! This module provides the core data structures and storage functionality
//! for Redis-compatible data types.

pub mod blocking;
pub mod clock;
pub mod commands;
pub mod consumer_groups;
pub mod database;
pub mod engine;
pub mod ops;
pub mod script_cache;
pub mod scripting;
pub mod sorted_set;
pub mod stream;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use engine::{Engine, Keyspace};
pub use scripting::{LuaEvaluator, ScriptEvaluator, ScriptHost, ScriptRegistry};
pub use stream::StreamId;
pub use value::{Value, ValueType};

/// Database index type
pub type DatabaseIndex = usize;

/// Key type for storage
pub type Key = Vec<u8>;
