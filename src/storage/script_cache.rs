//! Script cache shared by every session of an engine
//!
//! Scripts are stored by the lowercase hex SHA-1 of their body. The cache
//! has its own lock so SCRIPT LOAD/EXISTS/FLUSH never wait on the keyspace.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sha1::{Digest, Sha1};

/// Lowercase hex SHA-1 of a script body
pub fn sha1_hex(body: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Script cache keyed by SHA-1
#[derive(Debug, Default, Clone)]
pub struct ScriptCache {
    scripts: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a script body, returning its digest
    pub fn load(&self, body: &[u8]) -> String {
        let sha = sha1_hex(body);
        self.scripts
            .write()
            .entry(sha.clone())
            .or_insert_with(|| Arc::from(body));
        sha
    }

    /// Look up a script by digest; digests are matched case-insensitively
    pub fn get(&self, sha: &str) -> Option<Arc<[u8]>> {
        self.scripts.read().get(&sha.to_ascii_lowercase()).cloned()
    }

    pub fn exists(&self, sha: &str) -> bool {
        self.scripts.read().contains_key(&sha.to_ascii_lowercase())
    }

    /// Drop every cached script, returning how many there were
    pub fn flush(&self) -> usize {
        let mut scripts = self.scripts.write();
        let count = scripts.len();
        scripts.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.scripts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha1_matches_redis() {
        // SCRIPT LOAD "return 1" on a real server
        assert_eq!(sha1_hex(b"return 1"), "e0e1f9fabfc9d4800c877a703b823ac0578ff8db");
    }

    #[test]
    fn test_load_get_flush() {
        let cache = ScriptCache::new();
        let sha = cache.load(b"return 1");
        assert!(cache.exists(&sha));
        assert!(cache.exists(&sha.to_uppercase()));
        assert_eq!(cache.get(&sha).as_deref(), Some(&b"return 1"[..]));
        assert_eq!(cache.load(b"return 1"), sha);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.flush(), 1);
        assert!(!cache.exists(&sha));
        assert!(cache.is_empty());
    }
}
