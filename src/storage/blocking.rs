//! Blocking operations support for BLPOP/BRPOP/BZPOP*/XREAD BLOCK
//!
//! Blocked callers register a [`Waiter`] on every key they wait for while
//! holding the keyspace lock, release the lock and park on the waiter's
//! condition variable. Writers that make a key ready hand the key to the
//! first waiter in FIFO order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::storage::{DatabaseIndex, Key};

static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

/// A parked caller
#[derive(Debug)]
pub struct Waiter {
    id: u64,
    /// Key this waiter was woken for, if any
    woken_by: Mutex<Option<(DatabaseIndex, Key)>>,
    cond: Condvar,
}

/// Information about a blocked client
#[derive(Debug, Clone)]
pub struct BlockedClient {
    pub waiter: Arc<Waiter>,
    pub blocked_at: Instant,
}

/// Registry of blocked clients, per database and key
#[derive(Debug, Default)]
pub struct BlockingRegistry {
    /// Map of (db, key) -> waiting clients ordered by arrival time
    blocked_on_key: HashMap<(DatabaseIndex, Key), VecDeque<BlockedClient>>,
}

impl Waiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Waiter {
            id: NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed),
            woken_by: Mutex::new(None),
            cond: Condvar::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Hand a ready key to this waiter and unpark it. Returns false if the
    /// waiter already holds a wake-up for another key.
    pub fn wake(&self, db: DatabaseIndex, key: Key) -> bool {
        let mut woken_by = self.woken_by.lock();
        if woken_by.is_some() {
            return false;
        }
        *woken_by = Some((db, key));
        self.cond.notify_one();
        true
    }

    /// Park until woken or until `deadline` passes (`None` waits forever).
    /// Returns and clears the key the waiter was woken for.
    pub fn wait(&self, deadline: Option<Instant>) -> Option<(DatabaseIndex, Key)> {
        let mut woken_by = self.woken_by.lock();
        while woken_by.is_none() {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut woken_by, deadline).timed_out() {
                        break;
                    }
                }
                None => self.cond.wait(&mut woken_by),
            }
        }
        woken_by.take()
    }

    /// Take the wake-up key without parking
    pub fn take_wakeup(&self) -> Option<(DatabaseIndex, Key)> {
        self.woken_by.lock().take()
    }
}

impl BlockingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter on a set of keys. Queues stay ordered by waiter
    /// id, so a waiter that re-registers after losing a wake-up keeps its
    /// place ahead of clients that blocked later.
    pub fn register(&mut self, waiter: &Arc<Waiter>, db: DatabaseIndex, keys: &[Key]) {
        let client = BlockedClient {
            waiter: Arc::clone(waiter),
            blocked_at: Instant::now(),
        };
        for key in keys {
            let queue = self.blocked_on_key.entry((db, key.clone())).or_default();
            if queue.iter().any(|c| c.waiter.id == waiter.id) {
                continue;
            }
            let pos = queue
                .iter()
                .position(|c| c.waiter.id > waiter.id)
                .unwrap_or(queue.len());
            queue.insert(pos, client.clone());
        }
    }

    /// Remove a waiter from all keys
    pub fn unregister(&mut self, waiter_id: u64) {
        self.blocked_on_key.retain(|_, clients| {
            clients.retain(|client| client.waiter.id != waiter_id);
            !clients.is_empty()
        });
    }

    /// Check if any clients are blocked on a key
    pub fn has_blocked_clients(&self, db: DatabaseIndex, key: &[u8]) -> bool {
        self.blocked_on_key.contains_key(&(db, key.to_vec()))
    }

    /// Pop the first waiting client for a key
    pub fn pop_first_waiter(&mut self, db: DatabaseIndex, key: &[u8]) -> Option<BlockedClient> {
        let slot = (db, key.to_vec());
        let clients = self.blocked_on_key.get_mut(&slot)?;
        let client = clients.pop_front();
        if clients.is_empty() {
            self.blocked_on_key.remove(&slot);
        }
        client
    }

    /// Pop every waiting client for a key
    pub fn pop_all_waiters(&mut self, db: DatabaseIndex, key: &[u8]) -> Vec<BlockedClient> {
        self.blocked_on_key
            .remove(&(db, key.to_vec()))
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of distinct blocked clients
    pub fn blocked_count(&self) -> usize {
        let mut ids: Vec<u64> = self
            .blocked_on_key
            .values()
            .flat_map(|clients| clients.iter().map(|c| c.waiter.id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fifo_per_key() {
        let mut registry = BlockingRegistry::new();
        let first = Waiter::new();
        let second = Waiter::new();
        registry.register(&first, 0, &[b"k".to_vec()]);
        registry.register(&second, 0, &[b"k".to_vec(), b"other".to_vec()]);

        assert!(registry.has_blocked_clients(0, b"k"));
        assert!(!registry.has_blocked_clients(1, b"k"));
        assert_eq!(registry.blocked_count(), 2);

        assert_eq!(registry.pop_first_waiter(0, b"k").unwrap().waiter.id(), first.id());
        assert_eq!(registry.pop_first_waiter(0, b"k").unwrap().waiter.id(), second.id());
        assert!(registry.pop_first_waiter(0, b"k").is_none());

        registry.unregister(second.id());
        assert!(!registry.has_blocked_clients(0, b"other"));
    }

    #[test]
    fn test_reregistered_waiter_keeps_its_place() {
        let mut registry = BlockingRegistry::new();
        let first = Waiter::new();
        let second = Waiter::new();
        registry.register(&first, 0, &[b"k".to_vec()]);
        registry.register(&second, 0, &[b"k".to_vec()]);

        // first is woken, finds nothing left and blocks again
        assert_eq!(registry.pop_first_waiter(0, b"k").unwrap().waiter.id(), first.id());
        registry.unregister(first.id());
        registry.register(&first, 0, &[b"k".to_vec()]);

        assert_eq!(registry.pop_first_waiter(0, b"k").unwrap().waiter.id(), first.id());
        assert_eq!(registry.pop_first_waiter(0, b"k").unwrap().waiter.id(), second.id());
    }

    #[test]
    fn test_wait_times_out() {
        let waiter = Waiter::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(waiter.wait(Some(deadline)).is_none());
    }

    #[test]
    fn test_wake_before_wait_is_not_lost() {
        let waiter = Waiter::new();
        assert!(waiter.wake(0, b"k".to_vec()));
        assert!(!waiter.wake(0, b"other".to_vec()));
        assert_eq!(waiter.wait(None), Some((0, b"k".to_vec())));
    }

    #[test]
    fn test_wake_from_other_thread() {
        let waiter = Waiter::new();
        let remote = Arc::clone(&waiter);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            assert!(remote.wake(3, b"k".to_vec()));
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(waiter.wait(Some(deadline)), Some((3, b"k".to_vec())));
        handle.join().unwrap();
    }
}
