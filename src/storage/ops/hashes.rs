//! Hash operations

use std::collections::HashMap;

use crate::error::{CommandError, Result};
use crate::protocol::resp::format_double;
use crate::storage::database::{wrong_type, Database};
use crate::storage::ops::parse_i64;
use crate::storage::sorted_set::parse_score;
use crate::storage::value::{StoredValue, Value};

impl Database {
    fn hash(&mut self, key: &[u8]) -> Result<Option<&HashMap<Vec<u8>, Vec<u8>>>> {
        match self.get_value(key) {
            Some(Value::Hash(hash)) => Ok(Some(hash)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    /// Mutable access to a hash, creating it when absent
    fn hash_or_create(&mut self, key: &[u8]) -> Result<&mut HashMap<Vec<u8>, Vec<u8>>> {
        if self.hash(key)?.is_none() {
            self.insert(key.to_vec(), StoredValue::new(Value::Hash(HashMap::new())));
        }
        match self.get_value_mut(key) {
            Some(Value::Hash(hash)) => Ok(hash),
            _ => wrong_type(),
        }
    }

    /// HSET / HMSET: number of fields created
    pub fn hset(&mut self, key: &[u8], pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Result<usize> {
        let hash = self.hash_or_create(key)?;
        let created = pairs
            .into_iter()
            .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
            .count();
        self.after_write(key);
        Ok(created)
    }

    /// HSETNX: false when the field exists
    pub fn hsetnx(&mut self, key: &[u8], field: Vec<u8>, value: Vec<u8>) -> Result<bool> {
        if self.hash(key)?.is_some_and(|hash| hash.contains_key(&field)) {
            return Ok(false);
        }
        self.hset(key, vec![(field, value)])?;
        Ok(true)
    }

    pub fn hget(&mut self, key: &[u8], field: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.hash(key)?.and_then(|hash| hash.get(field).cloned()))
    }

    pub fn hmget<F: AsRef<[u8]>>(&mut self, key: &[u8], fields: &[F]) -> Result<Vec<Option<Vec<u8>>>> {
        let hash = self.hash(key)?;
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.get(f.as_ref()).cloned()))
            .collect())
    }

    /// HGETALL, ordered by field
    pub fn hgetall(&mut self, key: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = self
            .hash(key)?
            .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default();
        pairs.sort();
        Ok(pairs)
    }

    /// HDEL: number of fields actually removed
    pub fn hdel<F: AsRef<[u8]>>(&mut self, key: &[u8], fields: &[F]) -> Result<usize> {
        let removed = match self.get_value_mut(key) {
            Some(Value::Hash(hash)) => fields.iter().filter(|f| hash.remove(f.as_ref()).is_some()).count(),
            Some(_) => return wrong_type(),
            None => return Ok(0),
        };
        if removed > 0 {
            self.after_write(key);
        }
        Ok(removed)
    }

    pub fn hlen(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.hash(key)?.map_or(0, HashMap::len))
    }

    pub fn hexists(&mut self, key: &[u8], field: &[u8]) -> Result<bool> {
        Ok(self.hash(key)?.is_some_and(|hash| hash.contains_key(field)))
    }

    pub fn hkeys(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.hgetall(key)?.into_iter().map(|(f, _)| f).collect())
    }

    pub fn hvals(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.hgetall(key)?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn hstrlen(&mut self, key: &[u8], field: &[u8]) -> Result<usize> {
        Ok(self.hget(key, field)?.map_or(0, |v| v.len()))
    }

    /// HINCRBY
    pub fn hincrby(&mut self, key: &[u8], field: &[u8], delta: i64) -> Result<i64> {
        let current = match self.hget(key, field)? {
            Some(value) => parse_i64(&value).ok_or_else(|| CommandError::invalid("hash value is not an integer"))?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(CommandError::IntegerOverflow)?;
        self.hset(key, vec![(field.to_vec(), next.to_string().into_bytes())])?;
        Ok(next)
    }

    /// HINCRBYFLOAT
    pub fn hincrbyfloat(&mut self, key: &[u8], field: &[u8], delta: f64) -> Result<f64> {
        let current = match self.hget(key, field)? {
            Some(value) => parse_score(&value).ok_or_else(|| CommandError::invalid("hash value is not a float"))?,
            None => 0.0,
        };
        let next = current + delta;
        if next.is_nan() || next.is_infinite() {
            return Err(CommandError::invalid("increment would produce NaN or Infinity").into());
        }
        self.hset(key, vec![(field.to_vec(), format_double(next).into_bytes())])?;
        Ok(next)
    }
}
