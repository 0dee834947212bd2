//! List operations

use std::collections::VecDeque;

use crate::error::{CommandError, Result};
use crate::storage::database::{wrong_type, Database};
use crate::storage::ops::{normalize_index, normalize_range};
use crate::storage::value::{StoredValue, Value};

/// Which end of a list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEnd {
    Left,
    Right,
}

impl ListEnd {
    pub fn parse(token: &[u8]) -> Result<Self> {
        if token.eq_ignore_ascii_case(b"LEFT") {
            Ok(ListEnd::Left)
        } else if token.eq_ignore_ascii_case(b"RIGHT") {
            Ok(ListEnd::Right)
        } else {
            Err(CommandError::SyntaxError.into())
        }
    }
}

impl Database {
    fn list(&mut self, key: &[u8]) -> Result<Option<&VecDeque<Vec<u8>>>> {
        match self.get_value(key) {
            Some(Value::List(list)) => Ok(Some(list)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    fn list_mut(&mut self, key: &[u8]) -> Result<Option<&mut VecDeque<Vec<u8>>>> {
        match self.get_value_mut(key) {
            Some(Value::List(list)) => Ok(Some(list)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    /// LPUSH / RPUSH (and the X variants with `only_if_exists`).
    /// Returns the new length, 0 when the X variant found no list.
    pub fn push(&mut self, key: &[u8], elements: Vec<Vec<u8>>, end: ListEnd, only_if_exists: bool) -> Result<usize> {
        let len = match self.list_mut(key)? {
            Some(list) => {
                push_all(list, elements, end);
                list.len()
            }
            None if only_if_exists => return Ok(0),
            None => {
                let mut list = VecDeque::with_capacity(elements.len());
                push_all(&mut list, elements, end);
                let len = list.len();
                self.insert(key.to_vec(), StoredValue::new(Value::List(list)));
                self.signal_ready(key);
                return Ok(len);
            }
        };
        self.after_write(key);
        self.signal_ready(key);
        Ok(len)
    }

    /// LPOP / RPOP. `None` when the key is absent.
    pub fn pop(&mut self, key: &[u8], count: usize, end: ListEnd) -> Result<Option<Vec<Vec<u8>>>> {
        let popped = match self.list_mut(key)? {
            Some(list) => {
                let n = count.min(list.len());
                (0..n)
                    .filter_map(|_| match end {
                        ListEnd::Left => list.pop_front(),
                        ListEnd::Right => list.pop_back(),
                    })
                    .collect::<Vec<_>>()
            }
            None => return Ok(None),
        };
        self.after_write(key);
        Ok(Some(popped))
    }

    /// LLEN
    pub fn llen(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.list(key)?.map_or(0, VecDeque::len))
    }

    /// LRANGE with clamping; empty when start > stop after clamping
    pub fn lrange(&mut self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let Some(list) = self.list(key)? else {
            return Ok(Vec::new());
        };
        Ok(match normalize_range(start, stop, list.len()) {
            Some((s, e)) => list.range(s..=e).cloned().collect(),
            None => Vec::new(),
        })
    }

    /// LINDEX
    pub fn lindex(&mut self, key: &[u8], index: i64) -> Result<Option<Vec<u8>>> {
        let Some(list) = self.list(key)? else {
            return Ok(None);
        };
        Ok(normalize_index(index, list.len()).and_then(|i| list.get(i).cloned()))
    }

    /// LSET
    pub fn lset(&mut self, key: &[u8], index: i64, element: Vec<u8>) -> Result<()> {
        let list = self.list_mut(key)?.ok_or(CommandError::NoSuchKey)?;
        let i = normalize_index(index, list.len()).ok_or(CommandError::IndexOutOfRange)?;
        list[i] = element;
        self.after_write(key);
        Ok(())
    }

    /// LINSERT: new length, -1 if the pivot is missing, 0 if the key is missing
    pub fn linsert(&mut self, key: &[u8], before: bool, pivot: &[u8], element: Vec<u8>) -> Result<i64> {
        let len = match self.list_mut(key)? {
            Some(list) => match list.iter().position(|e| e.as_slice() == pivot) {
                Some(pos) => {
                    list.insert(if before { pos } else { pos + 1 }, element);
                    list.len() as i64
                }
                None => return Ok(-1),
            },
            None => return Ok(0),
        };
        self.after_write(key);
        Ok(len)
    }

    /// LREM: count > 0 from head, < 0 from tail, 0 removes all
    pub fn lrem(&mut self, key: &[u8], count: i64, element: &[u8]) -> Result<usize> {
        let removed = match self.list_mut(key)? {
            Some(list) => {
                let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
                let mut removed = 0;
                if count >= 0 {
                    let mut i = 0;
                    while i < list.len() && removed < limit {
                        if list[i] == element {
                            list.remove(i);
                            removed += 1;
                        } else {
                            i += 1;
                        }
                    }
                } else {
                    let mut i = list.len();
                    while i > 0 && removed < limit {
                        i -= 1;
                        if list[i] == element {
                            list.remove(i);
                            removed += 1;
                        }
                    }
                }
                removed
            }
            None => return Ok(0),
        };
        if removed > 0 {
            self.after_write(key);
        }
        Ok(removed)
    }

    /// LTRIM; an empty result deletes the key
    pub fn ltrim(&mut self, key: &[u8], start: i64, stop: i64) -> Result<()> {
        match self.list_mut(key)? {
            Some(list) => match normalize_range(start, stop, list.len()) {
                Some((s, e)) => {
                    list.truncate(e + 1);
                    list.drain(..s);
                }
                None => list.clear(),
            },
            None => return Ok(()),
        }
        self.after_write(key);
        Ok(())
    }

    /// LMOVE / RPOPLPUSH. Atomic pop from `src` and push onto `dst`.
    pub fn lmove(&mut self, src: &[u8], dst: &[u8], from: ListEnd, to: ListEnd) -> Result<Option<Vec<u8>>> {
        if self.list(src)?.is_none() {
            return Ok(None);
        }
        // Type-check the destination before touching the source
        self.list(dst)?;
        let element = match self.pop(src, 1, from)?.and_then(|mut v| v.pop()) {
            Some(element) => element,
            None => return Ok(None),
        };
        self.push(dst, vec![element.clone()], to, false)?;
        Ok(Some(element))
    }
}

fn push_all(list: &mut VecDeque<Vec<u8>>, elements: Vec<Vec<u8>>, end: ListEnd) {
    for element in elements {
        match end {
            ListEnd::Left => list.push_front(element),
            ListEnd::Right => list.push_back(element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::database::tests::test_db;

    fn items(values: &[&str]) -> Vec<Vec<u8>> {
        values.iter().map(|v| v.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_push_order_round_trips() {
        let (mut db, _) = test_db();
        assert_eq!(db.push(b"r", items(&["a", "b", "c"]), ListEnd::Right, false).unwrap(), 3);
        assert_eq!(db.lrange(b"r", 0, -1).unwrap(), items(&["a", "b", "c"]));

        db.push(b"l", items(&["a", "b", "c"]), ListEnd::Left, false).unwrap();
        assert_eq!(db.lrange(b"l", 0, -1).unwrap(), items(&["c", "b", "a"]));
    }

    #[test]
    fn test_pushx_requires_list() {
        let (mut db, _) = test_db();
        assert_eq!(db.push(b"k", items(&["a"]), ListEnd::Left, true).unwrap(), 0);
        assert!(!db.contains(b"k"));
    }

    #[test]
    fn test_pop_deletes_empty_list() {
        let (mut db, _) = test_db();
        db.push(b"k", items(&["a", "b"]), ListEnd::Right, false).unwrap();
        assert_eq!(db.pop(b"k", 5, ListEnd::Right).unwrap(), Some(items(&["b", "a"])));
        assert_eq!(db.exists(&[b"k"]), 0);
        assert_eq!(db.pop(b"k", 1, ListEnd::Left).unwrap(), None);
    }

    #[test]
    fn test_lrange_clamps() {
        let (mut db, _) = test_db();
        db.push(b"k", items(&["a", "b", "c"]), ListEnd::Right, false).unwrap();
        assert_eq!(db.lrange(b"k", -100, 100).unwrap().len(), 3);
        assert!(db.lrange(b"k", 2, 1).unwrap().is_empty());
        assert_eq!(db.lrange(b"k", -2, -1).unwrap(), items(&["b", "c"]));
    }

    #[test]
    fn test_lset_errors() {
        let (mut db, _) = test_db();
        assert!(db.lset(b"k", 0, b"x".to_vec()).is_err());
        db.push(b"k", items(&["a"]), ListEnd::Right, false).unwrap();
        let err = db.lset(b"k", 5, b"x".to_vec()).unwrap_err();
        assert_eq!(err.to_string(), "ERR index out of range");
        db.lset(b"k", -1, b"z".to_vec()).unwrap();
        assert_eq!(db.lindex(b"k", 0).unwrap(), Some(b"z".to_vec()));
    }

    #[test]
    fn test_linsert() {
        let (mut db, _) = test_db();
        assert_eq!(db.linsert(b"k", true, b"a", b"x".to_vec()).unwrap(), 0);
        db.push(b"k", items(&["a", "c"]), ListEnd::Right, false).unwrap();
        assert_eq!(db.linsert(b"k", false, b"a", b"b".to_vec()).unwrap(), 3);
        assert_eq!(db.linsert(b"k", true, b"zz", b"b".to_vec()).unwrap(), -1);
        assert_eq!(db.lrange(b"k", 0, -1).unwrap(), items(&["a", "b", "c"]));
    }

    #[test]
    fn test_lrem_directions() {
        let (mut db, _) = test_db();
        db.push(b"k", items(&["x", "a", "x", "b", "x"]), ListEnd::Right, false).unwrap();
        assert_eq!(db.lrem(b"k", -1, b"x").unwrap(), 1);
        assert_eq!(db.lrange(b"k", 0, -1).unwrap(), items(&["x", "a", "x", "b"]));
        assert_eq!(db.lrem(b"k", 1, b"x").unwrap(), 1);
        assert_eq!(db.lrange(b"k", 0, -1).unwrap(), items(&["a", "x", "b"]));
        assert_eq!(db.lrem(b"k", 0, b"x").unwrap(), 1);
        assert_eq!(db.lrange(b"k", 0, -1).unwrap(), items(&["a", "b"]));
    }

    #[test]
    fn test_ltrim_to_empty_deletes() {
        let (mut db, _) = test_db();
        db.push(b"k", items(&["a", "b", "c", "d"]), ListEnd::Right, false).unwrap();
        db.ltrim(b"k", 1, 2).unwrap();
        assert_eq!(db.lrange(b"k", 0, -1).unwrap(), items(&["b", "c"]));
        db.ltrim(b"k", 5, 10).unwrap();
        assert!(!db.contains(b"k"));
    }

    #[test]
    fn test_lmove() {
        let (mut db, _) = test_db();
        db.push(b"src", items(&["a", "b"]), ListEnd::Right, false).unwrap();
        assert_eq!(db.lmove(b"src", b"dst", ListEnd::Right, ListEnd::Left).unwrap(), Some(b"b".to_vec()));
        assert_eq!(db.lmove(b"src", b"src", ListEnd::Left, ListEnd::Right).unwrap(), Some(b"a".to_vec()));
        assert_eq!(db.lrange(b"src", 0, -1).unwrap(), items(&["a"]));

        db.set(b"str".to_vec(), Value::string("x"), None);
        let err = db.lmove(b"src", b"str", ListEnd::Left, ListEnd::Left).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(db.llen(b"src").unwrap(), 1);
    }
}
