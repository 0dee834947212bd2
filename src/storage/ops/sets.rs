//! Set operations

use std::collections::HashSet;

use rand::seq::IteratorRandom;
use rand::Rng;

use crate::error::Result;
use crate::storage::database::{wrong_type, Database};
use crate::storage::value::{StoredValue, Value};
use crate::storage::Key;

/// SINTER / SUNION / SDIFF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAlgebra {
    Inter,
    Union,
    Diff,
}

impl Database {
    fn set_ref(&mut self, key: &[u8]) -> Result<Option<&HashSet<Vec<u8>>>> {
        match self.get_value(key) {
            Some(Value::Set(set)) => Ok(Some(set)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    fn set_mut(&mut self, key: &[u8]) -> Result<Option<&mut HashSet<Vec<u8>>>> {
        match self.get_value_mut(key) {
            Some(Value::Set(set)) => Ok(Some(set)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    /// SADD: number of members newly added
    pub fn sadd(&mut self, key: &[u8], members: Vec<Vec<u8>>) -> Result<usize> {
        let added = match self.set_mut(key)? {
            Some(set) => members.into_iter().filter(|m| set.insert(m.clone())).count(),
            None => {
                let set: HashSet<Vec<u8>> = members.into_iter().collect();
                let added = set.len();
                self.insert(key.to_vec(), StoredValue::new(Value::Set(set)));
                return Ok(added);
            }
        };
        if added > 0 {
            self.after_write(key);
        }
        Ok(added)
    }

    /// SREM: number of members actually removed
    pub fn srem<M: AsRef<[u8]>>(&mut self, key: &[u8], members: &[M]) -> Result<usize> {
        let removed = match self.set_mut(key)? {
            Some(set) => members.iter().filter(|m| set.remove(m.as_ref())).count(),
            None => return Ok(0),
        };
        if removed > 0 {
            self.after_write(key);
        }
        Ok(removed)
    }

    /// SMEMBERS, sorted for stable output
    pub fn smembers(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut members: Vec<Vec<u8>> = self
            .set_ref(key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    pub fn sismember(&mut self, key: &[u8], member: &[u8]) -> Result<bool> {
        Ok(self.set_ref(key)?.is_some_and(|set| set.contains(member)))
    }

    pub fn scard(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.set_ref(key)?.map_or(0, HashSet::len))
    }

    /// SMOVE
    pub fn smove(&mut self, src: &[u8], dst: &[u8], member: &[u8]) -> Result<bool> {
        self.set_ref(dst)?;
        if !self.sismember(src, member)? {
            return Ok(false);
        }
        if src == dst {
            return Ok(true);
        }
        self.srem(src, &[member])?;
        self.sadd(dst, vec![member.to_vec()])?;
        Ok(true)
    }

    /// SINTER / SUNION / SDIFF; missing keys act as empty sets
    pub fn set_algebra<K: AsRef<[u8]>>(&mut self, op: SetAlgebra, keys: &[K]) -> Result<HashSet<Vec<u8>>> {
        let mut sets = Vec::with_capacity(keys.len());
        for key in keys {
            sets.push(self.set_ref(key.as_ref())?.cloned().unwrap_or_default());
        }
        let mut iter = sets.into_iter();
        let first = iter.next().unwrap_or_default();
        Ok(iter.fold(first, |acc, set| match op {
            SetAlgebra::Inter => acc.intersection(&set).cloned().collect(),
            SetAlgebra::Union => acc.union(&set).cloned().collect(),
            SetAlgebra::Diff => acc.difference(&set).cloned().collect(),
        }))
    }

    /// The STORE variants: overwrite `dst` with the result, deleting it when empty
    pub fn set_algebra_store<K: AsRef<[u8]>>(&mut self, op: SetAlgebra, dst: Key, keys: &[K]) -> Result<usize> {
        let result = self.set_algebra(op, keys)?;
        let len = result.len();
        if result.is_empty() {
            self.remove(&dst);
        } else {
            self.insert(dst, StoredValue::new(Value::Set(result)));
        }
        Ok(len)
    }

    /// SPOP: remove up to `count` random members
    pub fn spop(&mut self, key: &[u8], count: usize) -> Result<Vec<Vec<u8>>> {
        let mut members: Vec<Vec<u8>> = match self.set_ref(key)? {
            Some(set) => set.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };
        members.sort();
        let chosen = members.into_iter().choose_multiple(&mut self.rng, count);
        self.srem(key, &chosen)?;
        Ok(chosen)
    }

    /// SRANDMEMBER: positive count yields distinct members, negative count
    /// allows repeats
    pub fn srandmember(&mut self, key: &[u8], count: i64) -> Result<Vec<Vec<u8>>> {
        let mut members: Vec<Vec<u8>> = match self.set_ref(key)? {
            Some(set) => set.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };
        members.sort();
        if count >= 0 {
            Ok(members.into_iter().choose_multiple(&mut self.rng, count as usize))
        } else {
            let n = count.unsigned_abs() as usize;
            Ok((0..n)
                .map(|_| members[self.rng.gen_range(0..members.len())].clone())
                .collect())
        }
    }
}
