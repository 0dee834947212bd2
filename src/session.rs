//! Per-client state
//!
//! A [`Session`] plays the role a connection plays in a server: it holds
//! the selected database, the MULTI queue and the watched keys, and it is
//! where blocking commands park.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CommandError, Result};
use crate::protocol::RespFrame;
use crate::storage::commands::{Command, ExecContext, ExecMode, ScriptingCommand, TransactionCommand};
use crate::storage::{DatabaseIndex, Engine, Key, Keyspace};

/// Transaction state for a session
#[derive(Debug, Default)]
struct TransactionState {
    /// Whether MULTI is active
    in_transaction: bool,
    /// Queued commands, already parsed
    queued: Vec<Command>,
    /// A command failed to parse while queuing; EXEC will abort
    dirty: bool,
}

/// One client of an [`Engine`]
pub struct Session {
    id: Uuid,
    engine: Arc<Engine>,
    db: DatabaseIndex,
    transaction: TransactionState,
    /// Watched keys with the version they had when watched
    watched: HashMap<(DatabaseIndex, Key), u64>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("db", &self.db)
            .field("in_transaction", &self.transaction.in_transaction)
            .field("queued", &self.transaction.queued.len())
            .field("watched", &self.watched.len())
            .finish()
    }
}

impl Session {
    /// Open a session on database 0
    pub fn new(engine: Arc<Engine>) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "Session opened");
        Session {
            id,
            engine,
            db: 0,
            transaction: TransactionState::default(),
            watched: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The selected database
    pub fn db(&self) -> DatabaseIndex {
        self.db
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.in_transaction
    }

    /// Parse and execute one command. Inside MULTI a command that fails to
    /// parse also poisons the transaction.
    pub fn execute<A: AsRef<[u8]>>(&mut self, argv: &[A]) -> Result<RespFrame> {
        let argv: Vec<Vec<u8>> = argv.iter().map(|arg| arg.as_ref().to_vec()).collect();
        match Command::parse(&argv) {
            Ok(command) => self.execute_command(command),
            Err(err) => {
                if self.transaction.in_transaction {
                    self.transaction.dirty = true;
                }
                Err(err)
            }
        }
    }

    /// Execute an already parsed command
    pub fn execute_command(&mut self, command: Command) -> Result<RespFrame> {
        match command {
            Command::Transaction(command) => self.transaction_command(command),
            command if self.transaction.in_transaction => {
                self.transaction.queued.push(command);
                Ok(RespFrame::queued())
            }
            command => self.run_now(command),
        }
    }

    fn run_now(&mut self, mut command: Command) -> Result<RespFrame> {
        let engine = Arc::clone(&self.engine);

        // SCRIPT runs outside the keyspace lock so SCRIPT KILL can reach a
        // running script
        if let Command::Scripting(ScriptingCommand::Script(subcommand)) = &command {
            return subcommand.execute(engine.scripts());
        }

        let db = self.db;
        if let Some(request) = command.blocking_request() {
            engine.run(|keyspace| command.prepare_blocking(keyspace, db))?;
            return engine.block_on(db, &request.keys, request.timeout, |keyspace| {
                command.try_serve(&mut ExecContext {
                    keyspace,
                    db,
                    scripts: engine.scripts(),
                    mode: ExecMode::Normal,
                })
            });
        }

        let (reply, selected) = engine.run(|keyspace| {
            let mut ctx = ExecContext {
                keyspace,
                db,
                scripts: engine.scripts(),
                mode: ExecMode::Normal,
            };
            let reply = command.execute(&mut ctx);
            (reply, ctx.db)
        });
        self.db = selected;
        reply
    }

    fn transaction_command(&mut self, command: TransactionCommand) -> Result<RespFrame> {
        match command {
            TransactionCommand::Multi => {
                if self.transaction.in_transaction {
                    return Err(CommandError::InvalidState("MULTI calls can not be nested".to_string()).into());
                }
                self.transaction = TransactionState {
                    in_transaction: true,
                    ..TransactionState::default()
                };
                Ok(RespFrame::ok())
            }
            TransactionCommand::Exec => self.exec(),
            TransactionCommand::Discard => {
                if !self.transaction.in_transaction {
                    return Err(CommandError::InvalidState("DISCARD without MULTI".to_string()).into());
                }
                self.transaction = TransactionState::default();
                self.unwatch_all();
                Ok(RespFrame::ok())
            }
            TransactionCommand::Watch(keys) => {
                if self.transaction.in_transaction {
                    return Err(CommandError::InvalidState("WATCH inside MULTI is not allowed".to_string()).into());
                }
                let db = self.db;
                let watched = &mut self.watched;
                self.engine.run(|keyspace| -> Result<()> {
                    let database = keyspace.db(db)?;
                    for key in keys {
                        if let Entry::Vacant(slot) = watched.entry((db, key)) {
                            let version = database.watch(&slot.key().1);
                            slot.insert(version);
                        }
                    }
                    Ok(())
                })?;
                Ok(RespFrame::ok())
            }
            TransactionCommand::Unwatch => {
                self.unwatch_all();
                Ok(RespFrame::ok())
            }
        }
    }

    /// Handle EXEC: run the queue under one lock acquisition
    fn exec(&mut self) -> Result<RespFrame> {
        if !self.transaction.in_transaction {
            return Err(CommandError::InvalidState("EXEC without MULTI".to_string()).into());
        }
        let transaction = std::mem::take(&mut self.transaction);
        let watched = std::mem::take(&mut self.watched);

        let engine = Arc::clone(&self.engine);
        let mut db = self.db;
        let outcome = engine.run(|keyspace| -> Result<RespFrame> {
            let watch_broken = watched
                .iter()
                .any(|((index, key), version)| keyspace.db(*index).map_or(true, |d| d.watched_version(key) != *version));
            release_watches(keyspace, &watched);

            if transaction.dirty {
                info!(session = %self.id, "Transaction discarded because of previous errors");
                return Err(CommandError::ExecAbort.into());
            }
            if watch_broken {
                debug!(session = %self.id, "Watched key modified, transaction aborted");
                return Ok(RespFrame::null_array());
            }

            let mut ctx = ExecContext {
                keyspace,
                db,
                scripts: engine.scripts(),
                mode: ExecMode::Transaction,
            };
            let replies = transaction
                .queued
                .iter()
                .map(|command| match command.execute(&mut ctx) {
                    Ok(reply) => reply,
                    Err(err) => RespFrame::error(err.to_string()),
                })
                .collect();
            db = ctx.db;
            Ok(RespFrame::array(replies))
        });
        self.db = db;
        outcome
    }

    fn unwatch_all(&mut self) {
        if self.watched.is_empty() {
            return;
        }
        let watched = std::mem::take(&mut self.watched);
        self.engine.run(|keyspace| release_watches(keyspace, &watched));
    }
}

fn release_watches(keyspace: &mut Keyspace, watched: &HashMap<(DatabaseIndex, Key), u64>) {
    for (index, key) in watched.keys() {
        if let Ok(database) = keyspace.db(*index) {
            database.unwatch(key);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unwatch_all();
        debug!(session = %self.id, "Session closed");
    }
}
