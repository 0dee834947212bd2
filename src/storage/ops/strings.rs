//! String and numeric operations

use crate::error::{CommandError, Result};
use crate::protocol::resp::format_double;
use crate::storage::database::{wrong_type, Database};
use crate::storage::ops::{normalize_range, parse_i64};
use crate::storage::sorted_set::parse_score;
use crate::storage::value::{StoredValue, Value};
use crate::storage::Key;

/// Largest string SETRANGE/APPEND may produce
pub const MAX_STRING_LEN: usize = 512 * 1024 * 1024;

/// SET NX / XX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// Only set if the key does not exist
    Nx,
    /// Only set if the key already exists
    Xx,
}

/// SET expiry option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Seconds from now
    Ex(u64),
    /// Milliseconds from now
    Px(u64),
    /// Absolute Unix time in seconds
    ExAt(u64),
    /// Absolute Unix time in milliseconds
    PxAt(u64),
    /// Retain the existing time to live
    KeepTtl,
}

/// Options of SET
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: Option<SetCondition>,
    pub expiry: Option<Expiry>,
    /// Return the previous value
    pub get: bool,
}

/// Outcome of SET
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// Whether the value was written
    pub written: bool,
    /// Previous string value, only filled when `get` was requested
    pub previous: Option<Vec<u8>>,
}

impl Expiry {
    /// Absolute expiry in milliseconds, given the current time
    fn deadline(&self, now_ms: u64) -> Option<u64> {
        match *self {
            Expiry::Ex(s) => Some(now_ms.saturating_add(s.saturating_mul(1000))),
            Expiry::Px(ms) => Some(now_ms.saturating_add(ms)),
            Expiry::ExAt(s) => Some(s.saturating_mul(1000)),
            Expiry::PxAt(ms) => Some(ms),
            Expiry::KeepTtl => None,
        }
    }
}

impl Database {
    /// Read a string value
    pub fn get_string(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.get_value(key) {
            Some(Value::String(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    /// SET with options
    pub fn set_string(&mut self, key: Key, value: Vec<u8>, options: &SetOptions) -> Result<SetOutcome> {
        let now = self.now_ms();
        let (exists, previous, previous_expiry) = match self.lookup(&key) {
            Some(StoredValue { value: Value::String(bytes), expires_at }) => {
                (true, Some(bytes.clone()), *expires_at)
            }
            Some(_) if options.get => return wrong_type(),
            Some(stored) => (true, None, stored.expires_at),
            None => (false, None, None),
        };

        let allowed = match options.condition {
            Some(SetCondition::Nx) => !exists,
            Some(SetCondition::Xx) => exists,
            None => true,
        };
        let previous = if options.get { previous } else { None };
        if !allowed {
            return Ok(SetOutcome { written: false, previous });
        }

        let expires_at = match options.expiry {
            Some(Expiry::KeepTtl) => previous_expiry,
            Some(expiry) => expiry.deadline(now),
            None => None,
        };
        self.insert(key, StoredValue::with_expiry(Value::String(value), expires_at));
        Ok(SetOutcome { written: true, previous })
    }

    /// GETSET: set and return the old value
    pub fn get_set(&mut self, key: Key, value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let options = SetOptions { get: true, ..Default::default() };
        Ok(self.set_string(key, value, &options)?.previous)
    }

    /// MGET: values of several keys, `None` for absent or non-string keys
    pub fn mget<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Vec<Option<Vec<u8>>> {
        keys.iter()
            .map(|key| match self.get_value(key.as_ref()) {
                Some(Value::String(bytes)) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// MSET
    pub fn mset(&mut self, pairs: Vec<(Key, Vec<u8>)>) {
        for (key, value) in pairs {
            self.insert(key, StoredValue::new(Value::String(value)));
        }
    }

    /// MSETNX: set all pairs only if none of the keys exists
    pub fn msetnx(&mut self, pairs: Vec<(Key, Vec<u8>)>) -> bool {
        if pairs.iter().any(|(key, _)| self.contains(key)) {
            return false;
        }
        self.mset(pairs);
        true
    }

    /// INCRBY / DECRBY / INCR / DECR. The key keeps its time to live.
    pub fn incr_by(&mut self, key: &[u8], delta: i64) -> Result<i64> {
        let current = match self.get_value(key) {
            Some(Value::String(bytes)) => parse_i64(bytes).ok_or(CommandError::NotInteger)?,
            Some(_) => return wrong_type(),
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CommandError::IntegerOverflow)?;
        self.write_string_keep_ttl(key, next.to_string().into_bytes());
        Ok(next)
    }

    /// INCRBYFLOAT
    pub fn incr_by_float(&mut self, key: &[u8], delta: f64) -> Result<f64> {
        let current = match self.get_value(key) {
            Some(Value::String(bytes)) => parse_score(bytes).ok_or(CommandError::NotFloat)?,
            Some(_) => return wrong_type(),
            None => 0.0,
        };
        let next = current + delta;
        if next.is_nan() || next.is_infinite() {
            return Err(CommandError::invalid("increment would produce NaN or Infinity").into());
        }
        self.write_string_keep_ttl(key, format_double(next).into_bytes());
        Ok(next)
    }

    /// APPEND: returns the new length
    pub fn append(&mut self, key: &[u8], suffix: &[u8]) -> Result<usize> {
        match self.get_value_mut(key) {
            Some(Value::String(bytes)) => {
                if bytes.len() + suffix.len() > MAX_STRING_LEN {
                    return Err(too_large());
                }
                bytes.extend_from_slice(suffix);
                let len = bytes.len();
                self.after_write(key);
                Ok(len)
            }
            Some(_) => wrong_type(),
            None => {
                self.insert(key.to_vec(), StoredValue::new(Value::String(suffix.to_vec())));
                Ok(suffix.len())
            }
        }
    }

    /// STRLEN
    pub fn strlen(&mut self, key: &[u8]) -> Result<usize> {
        match self.get_value(key) {
            Some(Value::String(bytes)) => Ok(bytes.len()),
            Some(_) => wrong_type(),
            None => Ok(0),
        }
    }

    /// GETRANGE with inclusive, possibly negative offsets
    pub fn get_range(&mut self, key: &[u8], start: i64, end: i64) -> Result<Vec<u8>> {
        match self.get_value(key) {
            Some(Value::String(bytes)) => Ok(normalize_range(start, end, bytes.len())
                .map(|(s, e)| bytes[s..=e].to_vec())
                .unwrap_or_default()),
            Some(_) => wrong_type(),
            None => Ok(Vec::new()),
        }
    }

    /// SETRANGE: overwrite from `offset`, zero-padding as needed
    pub fn set_range(&mut self, key: &[u8], offset: usize, value: &[u8]) -> Result<usize> {
        if offset.saturating_add(value.len()) > MAX_STRING_LEN {
            return Err(too_large());
        }
        match self.get_value_mut(key) {
            Some(Value::String(bytes)) => {
                if value.is_empty() {
                    return Ok(bytes.len());
                }
                let end = offset + value.len();
                if bytes.len() < end {
                    bytes.resize(end, 0);
                }
                bytes[offset..end].copy_from_slice(value);
                let len = bytes.len();
                self.after_write(key);
                Ok(len)
            }
            Some(_) => wrong_type(),
            None if value.is_empty() => Ok(0),
            None => {
                let mut bytes = vec![0u8; offset];
                bytes.extend_from_slice(value);
                let len = bytes.len();
                self.insert(key.to_vec(), StoredValue::new(Value::String(bytes)));
                Ok(len)
            }
        }
    }

    fn write_string_keep_ttl(&mut self, key: &[u8], bytes: Vec<u8>) {
        match self.get_value_mut(key) {
            Some(value) => {
                *value = Value::String(bytes);
                self.after_write(key);
            }
            None => {
                self.insert(key.to_vec(), StoredValue::new(Value::String(bytes)));
            }
        }
    }
}

fn too_large() -> crate::error::EmbedisError {
    CommandError::invalid("string exceeds maximum allowed size (proto-max-bulk-len)").into()
}

#[cfg(test)]
mod tests {
    use crate::storage::database::tests::test_db;
    use crate::error::{ErrorKind, CommandError, EmbedisError};
    use super::*;

    #[test]
    fn test_set_conditions() {
        let (mut db, _) = test_db();
        let nx = SetOptions { condition: Some(SetCondition::Nx), ..Default::default() };
        assert!(db.set_string(b"k".to_vec(), b"1".to_vec(), &nx).unwrap().written);
        assert!(!db.set_string(b"k".to_vec(), b"2".to_vec(), &nx).unwrap().written);

        let xx = SetOptions { condition: Some(SetCondition::Xx), ..Default::default() };
        assert!(!db.set_string(b"other".to_vec(), b"2".to_vec(), &xx).unwrap().written);
        assert_eq!(db.get_string(b"k").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_set_discards_ttl_unless_keepttl() {
        let (mut db, _) = test_db();
        let ex = SetOptions { expiry: Some(Expiry::Ex(10)), ..Default::default() };
        db.set_string(b"k".to_vec(), b"1".to_vec(), &ex).unwrap();
        assert_eq!(db.ttl(b"k"), 10);

        let keep = SetOptions { expiry: Some(Expiry::KeepTtl), ..Default::default() };
        db.set_string(b"k".to_vec(), b"2".to_vec(), &keep).unwrap();
        assert_eq!(db.ttl(b"k"), 10);

        db.set_string(b"k".to_vec(), b"3".to_vec(), &SetOptions::default()).unwrap();
        assert_eq!(db.ttl(b"k"), -1);
    }

    #[test]
    fn test_set_get_returns_previous() {
        let (mut db, _) = test_db();
        assert_eq!(db.get_set(b"k".to_vec(), b"a".to_vec()).unwrap(), None);
        assert_eq!(db.get_set(b"k".to_vec(), b"b".to_vec()).unwrap(), Some(b"a".to_vec()));
    }

    #[test]
    fn test_incr_by() {
        let (mut db, _) = test_db();
        assert_eq!(db.incr_by(b"n", 5).unwrap(), 5);
        assert_eq!(db.incr_by(b"n", -7).unwrap(), -2);

        db.set(b"s".to_vec(), Value::string("abc"), None);
        let err = db.incr_by(b"s", 1).unwrap_err();
        assert!(matches!(err, EmbedisError::Command(CommandError::NotInteger)));

        db.set(b"max".to_vec(), Value::string(i64::MAX.to_string()), None);
        assert!(matches!(
            db.incr_by(b"max", 1).unwrap_err(),
            EmbedisError::Command(CommandError::IntegerOverflow)
        ));

        db.set(b"list".to_vec(), Value::List(Default::default()), None);
        assert_eq!(db.incr_by(b"list", 1).unwrap_err().kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let (mut db, _) = test_db();
        db.set(b"n".to_vec(), Value::string("1"), Some(11_000));
        db.incr_by(b"n", 1).unwrap();
        assert_eq!(db.ttl(b"n"), 10);
    }

    #[test]
    fn test_incr_by_float() {
        let (mut db, _) = test_db();
        assert_eq!(db.incr_by_float(b"f", 10.5).unwrap(), 10.5);
        assert_eq!(db.incr_by_float(b"f", 0.5).unwrap(), 11.0);
        assert_eq!(db.get_string(b"f").unwrap(), Some(b"11".to_vec()));
        db.set(b"s".to_vec(), Value::string("x"), None);
        assert!(db.incr_by_float(b"s", 1.0).is_err());
    }

    #[test]
    fn test_append_and_strlen() {
        let (mut db, _) = test_db();
        assert_eq!(db.append(b"k", b"Hello").unwrap(), 5);
        assert_eq!(db.append(b"k", b" World").unwrap(), 11);
        assert_eq!(db.strlen(b"k").unwrap(), 11);
        assert_eq!(db.strlen(b"missing").unwrap(), 0);
    }

    #[test]
    fn test_get_range() {
        let (mut db, _) = test_db();
        db.set(b"k".to_vec(), Value::string("This is a string"), None);
        assert_eq!(db.get_range(b"k", 0, 3).unwrap(), b"This");
        assert_eq!(db.get_range(b"k", -3, -1).unwrap(), b"ing");
        assert_eq!(db.get_range(b"k", 10, 100).unwrap(), b"string");
        assert!(db.get_range(b"k", 5, 1).unwrap().is_empty());
    }

    #[test]
    fn test_set_range_pads() {
        let (mut db, _) = test_db();
        assert_eq!(db.set_range(b"k", 0, b"").unwrap(), 0);
        assert!(!db.contains(b"k"));
        assert_eq!(db.set_range(b"k", 3, b"ab").unwrap(), 5);
        assert_eq!(db.get_string(b"k").unwrap(), Some(b"\0\0\0ab".to_vec()));
        assert_eq!(db.set_range(b"k", 1, b"Z").unwrap(), 5);
        assert_eq!(db.get_string(b"k").unwrap(), Some(b"\0Z\0ab".to_vec()));
    }

    #[test]
    fn test_msetnx_all_or_nothing() {
        let (mut db, _) = test_db();
        assert!(db.msetnx(vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]));
        assert!(!db.msetnx(vec![(b"b".to_vec(), b"3".to_vec()), (b"c".to_vec(), b"4".to_vec())]));
        assert_eq!(db.mget(&[&b"a"[..], &b"b"[..], &b"c"[..]]), vec![Some(b"1".to_vec()), Some(b"2".to_vec()), None]);
    }
}
