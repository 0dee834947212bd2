//! A single logical database
//!
//! Owns the key space of one database index along with the bookkeeping
//! the engine needs around it: lazy expiry, WATCH versions, keys made
//! ready for blocked clients, and the write journal used to roll back a
//! failed script.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{CommandError, Result, StorageError};
use crate::storage::clock::{Clock, SystemClock};
use crate::storage::value::{StoredValue, Value, ValueType};
use crate::storage::Key;

/// Default number of entries in one stream storage node
pub const DEFAULT_STREAM_NODE_MAX_ENTRIES: usize = 100;

/// WATCH bookkeeping for one key
#[derive(Debug, Clone, Copy)]
struct WatchSlot {
    version: u64,
    watchers: usize,
}

/// A single database instance
pub struct Database {
    /// Key-value storage
    data: HashMap<Key, StoredValue>,

    /// Versions of watched keys
    watched: HashMap<Key, WatchSlot>,

    /// Modification counter
    modification_counter: u64,

    /// Keys that received data since the last drain
    ready_keys: Vec<Key>,

    /// Pre-images of keys written while a script runs
    journal: Option<HashMap<Key, Option<StoredValue>>>,

    clock: Arc<dyn Clock>,
    pub(crate) rng: StdRng,
    stream_node_max_entries: usize,
}

/// Outcome of a RENAME/RENAMENX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    /// RENAMENX found the destination taken
    DestinationExists,
}

impl Database {
    /// Create a database reading time from `clock` and seeding its RNG with `seed`
    pub fn new(clock: Arc<dyn Clock>, seed: u64, stream_node_max_entries: usize) -> Self {
        Database {
            data: HashMap::new(),
            watched: HashMap::new(),
            modification_counter: 0,
            ready_keys: Vec::new(),
            journal: None,
            clock,
            rng: StdRng::seed_from_u64(seed),
            stream_node_max_entries,
        }
    }

    /// Current time in milliseconds
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn stream_node_max_entries(&self) -> usize {
        self.stream_node_max_entries
    }

    // ---- core accessors -------------------------------------------------

    /// Remove `key` if it has expired. Returns whether it was removed.
    fn expire_if_needed(&mut self, key: &[u8]) -> bool {
        let now = self.now_ms();
        let expired = self.data.get(key).is_some_and(|v| v.is_expired(now));
        if expired {
            self.record_pre_image(key);
            self.data.remove(key);
            self.mark_modified(key);
        }
        expired
    }

    /// Look up a live entry
    pub(crate) fn lookup(&mut self, key: &[u8]) -> Option<&StoredValue> {
        self.expire_if_needed(key);
        self.data.get(key)
    }

    /// Look up a live entry for writing
    pub(crate) fn lookup_mut(&mut self, key: &[u8]) -> Option<&mut StoredValue> {
        self.expire_if_needed(key);
        if self.data.contains_key(key) {
            self.record_pre_image(key);
        }
        self.data.get_mut(key)
    }

    /// Look up a live value
    pub fn get_value(&mut self, key: &[u8]) -> Option<&Value> {
        self.lookup(key).map(|stored| &stored.value)
    }

    /// Look up a live value for writing
    pub(crate) fn get_value_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        self.lookup_mut(key).map(|stored| &mut stored.value)
    }

    /// Insert or replace an entry, returning the previous live one
    pub(crate) fn insert(&mut self, key: Key, stored: StoredValue) -> Option<StoredValue> {
        self.expire_if_needed(&key);
        self.record_pre_image(&key);
        self.mark_modified(&key);
        self.data.insert(key, stored)
    }

    /// Remove a live entry
    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<StoredValue> {
        if self.expire_if_needed(key) || !self.data.contains_key(key) {
            return None;
        }
        self.record_pre_image(key);
        self.mark_modified(key);
        self.data.remove(key)
    }

    /// Bookkeeping after a write through `get_value_mut`: bumps the version
    /// and deletes the key if a collection was emptied.
    pub(crate) fn after_write(&mut self, key: &[u8]) {
        self.mark_modified(key);
        if self.data.get(key).is_some_and(|v| v.value.is_empty_collection()) {
            self.data.remove(key);
        }
    }

    /// Record that `key` received data a blocked client may want
    pub(crate) fn signal_ready(&mut self, key: &[u8]) {
        self.ready_keys.push(key.to_vec());
    }

    /// Drain the keys signalled since the last call
    pub(crate) fn take_ready_keys(&mut self) -> Vec<Key> {
        std::mem::take(&mut self.ready_keys)
    }

    /// Type of a live key without touching expiry
    pub(crate) fn peek_type(&self, key: &[u8]) -> Option<ValueType> {
        let now = self.now_ms();
        self.data
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.value.value_type())
    }

    fn mark_modified(&mut self, key: &[u8]) {
        self.modification_counter += 1;
        if let Some(slot) = self.watched.get_mut(key) {
            slot.version = self.modification_counter;
        }
    }

    // ---- WATCH ----------------------------------------------------------

    /// Start watching `key`, returning its current version
    pub(crate) fn watch(&mut self, key: &[u8]) -> u64 {
        self.expire_if_needed(key);
        let slot = self
            .watched
            .entry(key.to_vec())
            .or_insert(WatchSlot { version: 0, watchers: 0 });
        slot.watchers += 1;
        slot.version
    }

    /// Stop watching `key`
    pub(crate) fn unwatch(&mut self, key: &[u8]) {
        if let Entry::Occupied(mut slot) = self.watched.entry(key.to_vec()) {
            slot.get_mut().watchers -= 1;
            if slot.get().watchers == 0 {
                slot.remove();
            }
        }
    }

    /// Current version of a watched key, expiring it first
    pub(crate) fn watched_version(&mut self, key: &[u8]) -> u64 {
        self.expire_if_needed(key);
        self.watched.get(key).map_or(0, |slot| slot.version)
    }

    // ---- script journal -------------------------------------------------

    /// Start recording pre-images of every key written
    pub(crate) fn begin_journal(&mut self) {
        self.journal = Some(HashMap::new());
    }

    /// Keep all writes since `begin_journal`
    pub(crate) fn commit_journal(&mut self) {
        self.journal = None;
    }

    /// Undo all writes since `begin_journal`
    pub(crate) fn rollback_journal(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        if !journal.is_empty() {
            debug!(keys = journal.len(), "Rolling back script writes");
        }
        for (key, pre_image) in journal {
            self.mark_modified(&key);
            match pre_image {
                Some(stored) => {
                    self.data.insert(key, stored);
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
    }

    /// Whether anything was written since `begin_journal`
    pub(crate) fn journal_has_writes(&self) -> bool {
        self.journal.as_ref().is_some_and(|journal| !journal.is_empty())
    }

    fn record_pre_image(&mut self, key: &[u8]) {
        if let Some(journal) = self.journal.as_mut() {
            if !journal.contains_key(key) {
                journal.insert(key.to_vec(), self.data.get(key).cloned());
            }
        }
    }

    // ---- key space operations -------------------------------------------

    /// Store a value, replacing any previous one, with an optional absolute expiry
    pub fn set(&mut self, key: Key, value: Value, expires_at: Option<u64>) -> Option<Value> {
        self.insert(key, StoredValue::with_expiry(value, expires_at))
            .map(|previous| previous.value)
    }

    /// Delete keys, returning how many existed
    pub fn delete<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> usize {
        keys.iter()
            .filter(|key| self.remove(key.as_ref()).is_some())
            .count()
    }

    /// Count existing keys; repeated keys count repeatedly
    pub fn exists<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> usize {
        keys.iter()
            .filter(|key| self.lookup(key.as_ref()).is_some())
            .count()
    }

    /// Set an absolute expiry in milliseconds. A time in the past deletes the key.
    pub fn expire_at(&mut self, key: &[u8], at_ms: u64) -> bool {
        if self.lookup(key).is_none() {
            return false;
        }
        if at_ms <= self.now_ms() {
            self.remove(key);
            return true;
        }
        if let Some(stored) = self.lookup_mut(key) {
            stored.expires_at = Some(at_ms);
        }
        self.mark_modified(key);
        true
    }

    /// Set a relative expiry in milliseconds. Non-positive values delete the key.
    pub fn expire_in(&mut self, key: &[u8], ms: i64) -> bool {
        let at = if ms <= 0 {
            0
        } else {
            self.now_ms().saturating_add(ms as u64)
        };
        self.expire_at(key, at)
    }

    /// Remaining time to live in milliseconds: -2 if absent, -1 without expiry
    pub fn pttl(&mut self, key: &[u8]) -> i64 {
        let now = self.now_ms();
        match self.lookup(key) {
            None => -2,
            Some(StoredValue { expires_at: None, .. }) => -1,
            Some(StoredValue { expires_at: Some(at), .. }) => at.saturating_sub(now) as i64,
        }
    }

    /// Remaining time to live in seconds: -2 if absent, -1 without expiry
    pub fn ttl(&mut self, key: &[u8]) -> i64 {
        match self.pttl(key) {
            ms if ms < 0 => ms,
            ms => (ms + 500) / 1000,
        }
    }

    /// Drop the expiry of a key
    pub fn persist(&mut self, key: &[u8]) -> bool {
        let had_expiry = self.lookup(key).is_some_and(|v| v.expires_at.is_some());
        if had_expiry {
            if let Some(stored) = self.lookup_mut(key) {
                stored.expires_at = None;
            }
            self.mark_modified(key);
        }
        had_expiry
    }

    /// RENAME / RENAMENX. The expiry travels with the value.
    pub fn rename(&mut self, src: &[u8], dst: Key, fail_if_exists: bool) -> Result<RenameOutcome> {
        if self.lookup(src).is_none() {
            return Err(CommandError::NoSuchKey.into());
        }
        if fail_if_exists && self.lookup(&dst).is_some() {
            return Ok(RenameOutcome::DestinationExists);
        }
        if src == dst.as_slice() {
            return Ok(RenameOutcome::Renamed);
        }
        if let Some(stored) = self.remove(src) {
            self.insert(dst, stored);
        }
        Ok(RenameOutcome::Renamed)
    }

    /// Name of the type stored at `key`, `none` if absent
    pub fn key_type(&mut self, key: &[u8]) -> &'static str {
        self.get_value(key)
            .map_or("none", |v| v.value_type().as_str())
    }

    /// Keys matching a glob pattern
    pub fn keys(&mut self, pattern: &[u8]) -> Vec<Key> {
        self.purge_expired();
        let pattern = String::from_utf8_lossy(pattern);
        let mut keys: Vec<Key> = self
            .data
            .keys()
            .filter(|key| glob_match::glob_match(&pattern, &String::from_utf8_lossy(key)))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of live keys
    pub fn dbsize(&mut self) -> usize {
        self.purge_expired();
        self.data.len()
    }

    /// A random live key
    pub fn random_key(&mut self) -> Option<Key> {
        self.purge_expired();
        self.data.keys().choose(&mut self.rng).cloned()
    }

    /// Remove every key
    pub fn flush(&mut self) {
        let keys: Vec<Key> = self.data.keys().cloned().collect();
        for key in &keys {
            self.record_pre_image(key);
            self.mark_modified(key);
        }
        for key in self.watched.keys().cloned().collect::<Vec<_>>() {
            self.mark_modified(&key);
        }
        self.data.clear();
    }

    /// Remove every expired key, returning how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = self.now_ms();
        let expired: Vec<Key> = self
            .data
            .iter()
            .filter(|(_, v)| v.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.record_pre_image(key);
            self.data.remove(key);
            self.mark_modified(key);
        }
        expired.len()
    }

    /// Detach an entry for MOVE
    pub(crate) fn take(&mut self, key: &[u8]) -> Option<StoredValue> {
        self.remove(key)
    }

    /// Whether a live key exists
    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.lookup(key).is_some()
    }
}

/// Map a value of the wrong variant to `WRONGTYPE`
#[inline]
pub(crate) fn wrong_type<T>() -> Result<T> {
    Err(StorageError::WrongType.into())
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("keys", &self.data.len())
            .field("watched", &self.watched.len())
            .field("modification_counter", &self.modification_counter)
            .finish()
    }
}

impl Default for Database {
    fn default() -> Self {
        Database::new(Arc::new(SystemClock), rand::random(), DEFAULT_STREAM_NODE_MAX_ENTRIES)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;

    pub(crate) fn test_db() -> (Database, ManualClock) {
        let clock = ManualClock::new(1_000);
        let db = Database::new(Arc::new(clock.clone()), 7, DEFAULT_STREAM_NODE_MAX_ENTRIES);
        (db, clock)
    }

    #[test]
    fn test_delete_and_exists_count() {
        let (mut db, _) = test_db();
        db.set(b"a".to_vec(), Value::string("1"), None);
        db.set(b"b".to_vec(), Value::string("2"), None);
        assert_eq!(db.exists(&[&b"a"[..], &b"a"[..], &b"zz"[..]]), 2);
        assert_eq!(db.delete(&[&b"a"[..], &b"zz"[..]]), 1);
        assert_eq!(db.exists(&[b"a"]), 0);
    }

    #[test]
    fn test_lazy_expiry() {
        let (mut db, clock) = test_db();
        db.set(b"k".to_vec(), Value::string("v"), None);
        assert!(db.expire_in(b"k", 1_500));
        assert_eq!(db.pttl(b"k"), 1_500);
        assert_eq!(db.ttl(b"k"), 2);
        clock.advance(1_500);
        assert_eq!(db.ttl(b"k"), -2);
        assert!(db.get_value(b"k").is_none());
        assert!(!db.expire_in(b"k", 10));
    }

    #[test]
    fn test_non_positive_expire_deletes() {
        let (mut db, _) = test_db();
        db.set(b"k".to_vec(), Value::string("v"), None);
        assert!(db.expire_in(b"k", 0));
        assert!(!db.contains(b"k"));
    }

    #[test]
    fn test_persist_and_ttl_codes() {
        let (mut db, _) = test_db();
        assert_eq!(db.ttl(b"none"), -2);
        db.set(b"k".to_vec(), Value::string("v"), Some(5_000));
        assert_eq!(db.ttl(b"k"), 4);
        assert!(db.persist(b"k"));
        assert!(!db.persist(b"k"));
        assert_eq!(db.ttl(b"k"), -1);
    }

    #[test]
    fn test_rename_keeps_ttl() {
        let (mut db, _) = test_db();
        db.set(b"src".to_vec(), Value::string("v"), Some(10_000));
        assert_eq!(db.rename(b"src", b"dst".to_vec(), false).unwrap(), RenameOutcome::Renamed);
        assert!(!db.contains(b"src"));
        assert_eq!(db.pttl(b"dst"), 9_000);

        db.set(b"other".to_vec(), Value::string("o"), None);
        assert_eq!(
            db.rename(b"other", b"dst".to_vec(), true).unwrap(),
            RenameOutcome::DestinationExists
        );
        assert!(db.rename(b"missing", b"x".to_vec(), false).is_err());
    }

    #[test]
    fn test_watch_versions() {
        let (mut db, _) = test_db();
        let v = db.watch(b"k");
        assert_eq!(db.watched_version(b"k"), v);
        db.set(b"k".to_vec(), Value::string("v"), None);
        assert_ne!(db.watched_version(b"k"), v);
        db.unwatch(b"k");
        assert_eq!(db.watched_version(b"k"), 0);
    }

    #[test]
    fn test_journal_rollback() {
        let (mut db, _) = test_db();
        db.set(b"keep".to_vec(), Value::string("old"), None);
        db.begin_journal();
        db.set(b"keep".to_vec(), Value::string("new"), None);
        db.set(b"fresh".to_vec(), Value::string("x"), None);
        db.rollback_journal();
        assert!(matches!(db.get_value(b"keep"), Some(Value::String(v)) if v == b"old"));
        assert!(!db.contains(b"fresh"));
    }

    #[test]
    fn test_keys_pattern_and_flush() {
        let (mut db, _) = test_db();
        for key in ["user:1", "user:2", "order:1"] {
            db.set(key.as_bytes().to_vec(), Value::string("x"), None);
        }
        assert_eq!(db.keys(b"user:*"), vec![b"user:1".to_vec(), b"user:2".to_vec()]);
        assert_eq!(db.key_type(b"user:1"), "string");
        assert!(db.random_key().is_some());
        db.flush();
        assert_eq!(db.dbsize(), 0);
        assert!(db.random_key().is_none());
    }
}
