//! Embedis library
//!
//! An in-process engine with Redis data-type semantics: strings, lists,
//! sets, sorted sets, hashes and streams, with transactions, blocking pops
//! and Lua scripting. Commands go through a [`Session`] as argument
//! vectors and come back as RESP frames.
//!
//! ```no_run
//! use std::sync::Arc;
//! use embedis::{Config, Engine, Session};
//!
//! let engine = Arc::new(Engine::new(&Config::default()));
//! let mut session = Session::new(engine);
//! session.execute(&["SET", "greeting", "hello"]).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{EmbedisError, ErrorKind, Result};
pub use protocol::RespFrame;
pub use session::Session;
pub use storage::commands::Command;
pub use storage::engine::Engine;
