//! Main storage engine implementation
//!
//! Provides Redis-compatible storage with multiple databases behind one
//! lock, blocking-pop coordination and the shared script registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{CommandError, Result, StorageError};
use crate::protocol::RespFrame;
use crate::storage::blocking::{BlockingRegistry, Waiter};
use crate::storage::clock::{Clock, SystemClock};
use crate::storage::database::Database;
use crate::storage::scripting::{LuaEvaluator, ScriptEvaluator, ScriptRegistry};
use crate::storage::value::ValueType;
use crate::storage::{DatabaseIndex, Key};

/// Everything guarded by the engine lock
#[derive(Debug)]
pub struct Keyspace {
    dbs: Vec<Database>,
    blocking: BlockingRegistry,
}

/// Main storage engine
#[derive(Debug)]
pub struct Engine {
    keyspace: Mutex<Keyspace>,
    scripts: ScriptRegistry,
    databases: usize,
}

impl Keyspace {
    /// Access a database by index
    pub fn db(&mut self, index: DatabaseIndex) -> Result<&mut Database> {
        self.dbs
            .get_mut(index)
            .ok_or_else(|| StorageError::InvalidDatabase.into())
    }

    pub fn database_count(&self) -> usize {
        self.dbs.len()
    }

    /// MOVE: false when the key is absent in the source or present in the
    /// destination
    pub fn move_key(&mut self, key: &[u8], src: DatabaseIndex, dst: DatabaseIndex) -> Result<bool> {
        if dst >= self.dbs.len() {
            return Err(StorageError::InvalidDatabase.into());
        }
        if src == dst {
            return Err(CommandError::invalid("source and destination objects are the same").into());
        }
        if self.db(dst)?.contains(key) {
            return Ok(false);
        }
        let Some(stored) = self.db(src)?.take(key) else {
            return Ok(false);
        };
        let ready = matches!(
            stored.value.value_type(),
            ValueType::List | ValueType::SortedSet | ValueType::Stream
        );
        let target = self.db(dst)?;
        target.insert(key.to_vec(), stored);
        if ready {
            target.signal_ready(key);
        }
        Ok(true)
    }

    /// FLUSHALL
    pub fn flush_all(&mut self) {
        for db in &mut self.dbs {
            db.flush();
        }
    }

    pub(crate) fn begin_journal(&mut self) {
        self.dbs.iter_mut().for_each(Database::begin_journal);
    }

    pub(crate) fn commit_journal(&mut self) {
        self.dbs.iter_mut().for_each(Database::commit_journal);
    }

    pub(crate) fn rollback_journal(&mut self) {
        self.dbs.iter_mut().for_each(Database::rollback_journal);
    }

    /// Whether the running script has written to any database
    pub(crate) fn journal_has_writes(&self) -> bool {
        self.dbs.iter().any(Database::journal_has_writes)
    }

    /// Number of clients parked on keys
    pub fn blocked_clients(&self) -> usize {
        self.blocking.blocked_count()
    }

    /// Mark keys that still hold data as ready again so the next waiter in
    /// line gets its turn
    fn resignal(&mut self, db: DatabaseIndex, keys: &[Key]) {
        let Some(database) = self.dbs.get_mut(db) else {
            return;
        };
        for key in keys {
            if self.blocking.has_blocked_clients(db, key) && database.contains(key) {
                database.signal_ready(key);
            }
        }
    }

    /// Hand every key that received data to the clients blocked on it.
    /// Streams wake all their readers; lists and sorted sets wake one
    /// client per ready event.
    fn wake_ready_waiters(&mut self) {
        for (index, db) in self.dbs.iter_mut().enumerate() {
            let mut seen = HashSet::new();
            for key in db.take_ready_keys() {
                if !seen.insert(key.clone()) || !self.blocking.has_blocked_clients(index, &key) {
                    continue;
                }
                match db.peek_type(&key) {
                    Some(ValueType::Stream) => {
                        for client in self.blocking.pop_all_waiters(index, &key) {
                            client.waiter.wake(index, key.clone());
                        }
                    }
                    Some(_) => {
                        while let Some(client) = self.blocking.pop_first_waiter(index, &key) {
                            if client.waiter.wake(index, key.clone()) {
                                break;
                            }
                        }
                    }
                    None => {}
                }
            }
        }
    }
}

impl Engine {
    /// Create an engine from configuration, reading the system clock
    pub fn new(config: &Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let evaluator: Option<Arc<dyn ScriptEvaluator>> = if config.scripting.enabled {
            Some(Arc::new(LuaEvaluator::new()))
        } else {
            None
        };
        Self::with_parts(config, clock, evaluator)
    }

    /// Create an engine with an explicit clock and script evaluator
    pub fn with_parts(
        config: &Config,
        clock: Arc<dyn Clock>,
        evaluator: Option<Arc<dyn ScriptEvaluator>>,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let databases = config.server.databases.max(1);
        let dbs = (0..databases)
            .map(|index| {
                Database::new(
                    Arc::clone(&clock),
                    seed.wrapping_add(index as u64),
                    config.streams.node_max_entries,
                )
            })
            .collect();

        info!(
            databases,
            scripting = evaluator.is_some(),
            "Storage engine created"
        );

        Engine {
            keyspace: Mutex::new(Keyspace {
                dbs,
                blocking: BlockingRegistry::new(),
            }),
            scripts: ScriptRegistry::new(evaluator),
            databases,
        }
    }

    /// Number of databases
    pub fn databases(&self) -> usize {
        self.databases
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    /// Run `f` under the engine lock, then wake clients blocked on keys
    /// that received data
    pub fn run<R>(&self, f: impl FnOnce(&mut Keyspace) -> R) -> R {
        let mut keyspace = self.keyspace.lock();
        let result = f(&mut keyspace);
        keyspace.wake_ready_waiters();
        result
    }

    /// Run `f` against one database under the engine lock
    pub fn with_db<R>(&self, db: DatabaseIndex, f: impl FnOnce(&mut Database) -> Result<R>) -> Result<R> {
        self.run(|keyspace| f(keyspace.db(db)?))
    }

    /// Remove expired keys from every database
    pub fn purge_expired(&self) -> usize {
        let removed: usize = self.run(|keyspace| keyspace.dbs.iter_mut().map(Database::purge_expired).sum());
        if removed > 0 {
            debug!(removed, "Active expiry sweep");
        }
        removed
    }

    /// Run `attempt` until it produces a reply, parking between attempts
    /// until one of `keys` receives data. `attempt` returns `None` when
    /// there is nothing to serve. `timeout` of `None` waits forever; on
    /// timeout the reply is a null array.
    pub fn block_on<F>(
        &self,
        db: DatabaseIndex,
        keys: &[Key],
        timeout: Option<Duration>,
        mut attempt: F,
    ) -> Result<RespFrame>
    where
        F: FnMut(&mut Keyspace) -> Result<Option<RespFrame>>,
    {
        // A timeout past the end of the clock's range waits forever
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let waiter = Waiter::new();

        loop {
            let served = self.run(|keyspace| -> Result<Option<RespFrame>> {
                keyspace.blocking.unregister(waiter.id());
                if let Some(reply) = attempt(keyspace)? {
                    keyspace.resignal(db, keys);
                    return Ok(Some(reply));
                }
                keyspace.blocking.register(&waiter, db, keys);
                Ok(None)
            })?;
            if let Some(reply) = served {
                return Ok(reply);
            }

            if waiter.wait(deadline).is_some() {
                continue;
            }

            // Timed out. A wake-up that raced with the timeout is passed on.
            self.run(|keyspace| {
                keyspace.blocking.unregister(waiter.id());
                if let Some((woken_db, key)) = waiter.take_wakeup() {
                    if let Ok(database) = keyspace.db(woken_db) {
                        database.signal_ready(&key);
                    }
                }
            });
            debug!(db, keys = keys.len(), "Blocking command timed out");
            return Ok(RespFrame::null_array());
        }
    }
}
