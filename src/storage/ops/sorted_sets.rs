//! Sorted set operations

use std::collections::HashMap;

use crate::error::{CommandError, Result};
use crate::storage::database::{wrong_type, Database};
use crate::storage::ops::normalize_range;
use crate::storage::sorted_set::{LexRange, ScoreRange, SortedSet};
use crate::storage::value::{StoredValue, Value};
use crate::storage::Key;

/// A member with its score
pub type ScoredMember = (Vec<u8>, f64);

/// ZADD NX / XX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZAddCondition {
    Nx,
    Xx,
}

/// ZADD GT / LT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZAddComparison {
    Gt,
    Lt,
}

/// Options of ZADD
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZAddOptions {
    pub condition: Option<ZAddCondition>,
    pub comparison: Option<ZAddComparison>,
    /// Count changed members, not only added ones
    pub ch: bool,
    /// Behave like ZINCRBY
    pub incr: bool,
}

/// Result of ZADD
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZAddOutcome {
    /// Added (or, with CH, changed) member count
    Count(usize),
    /// New score with INCR, `None` when a condition blocked the update
    Score(Option<f64>),
}

/// AGGREGATE of ZUNIONSTORE / ZINTERSTORE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

/// Options of ZUNIONSTORE / ZINTERSTORE
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOptions {
    /// One weight per input key; empty means all 1
    pub weights: Vec<f64>,
    pub aggregate: Aggregate,
}

/// LIMIT offset count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeLimit {
    pub offset: i64,
    /// Negative means no limit
    pub count: i64,
}

/// ZINTERSTORE or ZUNIONSTORE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZSetAlgebra {
    Inter,
    Union,
}

impl Aggregate {
    pub fn parse(token: &[u8]) -> Result<Self> {
        match token.to_ascii_uppercase().as_slice() {
            b"SUM" => Ok(Aggregate::Sum),
            b"MIN" => Ok(Aggregate::Min),
            b"MAX" => Ok(Aggregate::Max),
            _ => Err(CommandError::Unsupported {
                option: "aggregate".to_string(),
                value: String::from_utf8_lossy(token).into_owned(),
            }
            .into()),
        }
    }

    fn combine(&self, a: f64, b: f64) -> f64 {
        let combined = match self {
            Aggregate::Sum => a + b,
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        };
        if combined.is_nan() { 0.0 } else { combined }
    }
}

impl RangeLimit {
    fn apply(&self, items: Vec<ScoredMember>) -> Vec<ScoredMember> {
        if self.offset < 0 {
            return Vec::new();
        }
        let take = if self.count < 0 { usize::MAX } else { self.count as usize };
        items.into_iter().skip(self.offset as usize).take(take).collect()
    }
}

impl Database {
    fn zset(&mut self, key: &[u8]) -> Result<Option<&SortedSet>> {
        match self.get_value(key) {
            Some(Value::SortedSet(zset)) => Ok(Some(zset)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    fn zset_mut(&mut self, key: &[u8]) -> Result<Option<&mut SortedSet>> {
        match self.get_value_mut(key) {
            Some(Value::SortedSet(zset)) => Ok(Some(zset)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    /// ZADD
    pub fn zadd(&mut self, key: &[u8], options: &ZAddOptions, pairs: Vec<(f64, Vec<u8>)>) -> Result<ZAddOutcome> {
        if options.condition == Some(ZAddCondition::Xx) && self.zset(key)?.is_none() {
            return Ok(if options.incr { ZAddOutcome::Score(None) } else { ZAddOutcome::Count(0) });
        }
        if self.zset(key)?.is_none() {
            self.insert(key.to_vec(), StoredValue::new(Value::SortedSet(SortedSet::new())));
        }

        let mut added = 0;
        let mut changed = 0;
        let mut last_score = None;
        if let Some(zset) = self.zset_mut(key)? {
            for (score, member) in pairs {
                let current = zset.score(&member);
                let blocked = match (options.condition, current) {
                    (Some(ZAddCondition::Nx), Some(_)) | (Some(ZAddCondition::Xx), None) => true,
                    _ => false,
                };
                if blocked {
                    last_score = None;
                    continue;
                }
                let new_score = match (options.incr, current) {
                    (true, Some(old)) => old + score,
                    _ => score,
                };
                if new_score.is_nan() {
                    return Err(CommandError::invalid("resulting score is not a number (NaN)").into());
                }
                let allowed = match (options.comparison, current) {
                    (Some(ZAddComparison::Gt), Some(old)) => new_score > old,
                    (Some(ZAddComparison::Lt), Some(old)) => new_score < old,
                    _ => true,
                };
                if !allowed {
                    last_score = None;
                    continue;
                }
                match current {
                    None => added += 1,
                    Some(old) if old != new_score => changed += 1,
                    Some(_) => {}
                }
                zset.insert(member, new_score);
                last_score = Some(new_score);
            }
        }
        self.after_write(key);
        self.signal_ready(key);

        Ok(if options.incr {
            ZAddOutcome::Score(last_score)
        } else if options.ch {
            ZAddOutcome::Count(added + changed)
        } else {
            ZAddOutcome::Count(added)
        })
    }

    /// ZINCRBY
    pub fn zincrby(&mut self, key: &[u8], delta: f64, member: Vec<u8>) -> Result<f64> {
        let options = ZAddOptions { incr: true, ..Default::default() };
        match self.zadd(key, &options, vec![(delta, member)])? {
            ZAddOutcome::Score(Some(score)) => Ok(score),
            _ => Err(CommandError::invalid("resulting score is not a number (NaN)").into()),
        }
    }

    /// ZREM
    pub fn zrem<M: AsRef<[u8]>>(&mut self, key: &[u8], members: &[M]) -> Result<usize> {
        let removed = match self.zset_mut(key)? {
            Some(zset) => members.iter().filter(|m| zset.remove(m.as_ref()).is_some()).count(),
            None => return Ok(0),
        };
        if removed > 0 {
            self.after_write(key);
        }
        Ok(removed)
    }

    pub fn zscore(&mut self, key: &[u8], member: &[u8]) -> Result<Option<f64>> {
        Ok(self.zset(key)?.and_then(|zset| zset.score(member)))
    }

    pub fn zcard(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.zset(key)?.map_or(0, SortedSet::len))
    }

    pub fn zcount(&mut self, key: &[u8], range: &ScoreRange) -> Result<usize> {
        Ok(self.zset(key)?.map_or(0, |zset| zset.count_in_score_range(range)))
    }

    pub fn zlexcount(&mut self, key: &[u8], range: &LexRange) -> Result<usize> {
        Ok(self.zset(key)?.map_or(0, |zset| zset.range_by_lex(range).len()))
    }

    /// ZRANK / ZREVRANK
    pub fn zrank(&mut self, key: &[u8], member: &[u8], reverse: bool) -> Result<Option<usize>> {
        Ok(self.zset(key)?.and_then(|zset| {
            zset.rank(member)
                .map(|rank| if reverse { zset.len() - 1 - rank } else { rank })
        }))
    }

    /// ZRANGE / ZREVRANGE by rank
    pub fn zrange(&mut self, key: &[u8], start: i64, stop: i64, reverse: bool) -> Result<Vec<ScoredMember>> {
        let Some(zset) = self.zset(key)? else {
            return Ok(Vec::new());
        };
        let Some((s, e)) = normalize_range(start, stop, zset.len()) else {
            return Ok(Vec::new());
        };
        if reverse {
            let len = zset.len();
            let mut items = zset.range_by_rank(len - 1 - e, len - 1 - s);
            items.reverse();
            Ok(items)
        } else {
            Ok(zset.range_by_rank(s, e))
        }
    }

    /// ZRANGEBYSCORE / ZREVRANGEBYSCORE
    pub fn zrange_by_score(
        &mut self,
        key: &[u8],
        range: &ScoreRange,
        reverse: bool,
        limit: Option<RangeLimit>,
    ) -> Result<Vec<ScoredMember>> {
        let mut items = self.zset(key)?.map(|zset| zset.range_by_score(range)).unwrap_or_default();
        if reverse {
            items.reverse();
        }
        Ok(match limit {
            Some(limit) => limit.apply(items),
            None => items,
        })
    }

    /// ZRANGEBYLEX / ZREVRANGEBYLEX
    pub fn zrange_by_lex(
        &mut self,
        key: &[u8],
        range: &LexRange,
        reverse: bool,
        limit: Option<RangeLimit>,
    ) -> Result<Vec<ScoredMember>> {
        let mut items = self.zset(key)?.map(|zset| zset.range_by_lex(range)).unwrap_or_default();
        if reverse {
            items.reverse();
        }
        Ok(match limit {
            Some(limit) => limit.apply(items),
            None => items,
        })
    }

    /// ZPOPMIN / ZPOPMAX; empty when the key is absent
    pub fn zpop(&mut self, key: &[u8], count: usize, max: bool) -> Result<Vec<ScoredMember>> {
        let popped = match self.zset_mut(key)? {
            Some(zset) if max => zset.pop_max(count),
            Some(zset) => zset.pop_min(count),
            None => return Ok(Vec::new()),
        };
        self.after_write(key);
        Ok(popped)
    }

    /// ZREMRANGEBYRANK. A start beyond the stop is rejected.
    pub fn zremrange_by_rank(&mut self, key: &[u8], start: i64, stop: i64) -> Result<usize> {
        let len = self.zset(key)?.map_or(0, |zset| zset.len()) as i64;
        let s = if start < 0 { (len + start).max(0) } else { start };
        let e = if stop < 0 { len + stop } else { stop };
        if s > e && e >= 0 {
            return Err(CommandError::invalid("start index is greater than stop index").into());
        }
        let Some(zset) = self.zset(key)? else {
            return Ok(0);
        };
        let members: Vec<Vec<u8>> = match normalize_range(start, stop, zset.len()) {
            Some((s, e)) => zset.range_by_rank(s, e).into_iter().map(|(m, _)| m).collect(),
            None => return Ok(0),
        };
        self.zrem(key, &members)
    }

    /// ZREMRANGEBYSCORE
    pub fn zremrange_by_score(&mut self, key: &[u8], range: &ScoreRange) -> Result<usize> {
        let members: Vec<Vec<u8>> = match self.zset(key)? {
            Some(zset) => zset.range_by_score(range).into_iter().map(|(m, _)| m).collect(),
            None => return Ok(0),
        };
        self.zrem(key, &members)
    }

    /// ZREMRANGEBYLEX
    pub fn zremrange_by_lex(&mut self, key: &[u8], range: &LexRange) -> Result<usize> {
        let members: Vec<Vec<u8>> = match self.zset(key)? {
            Some(zset) => zset.range_by_lex(range).into_iter().map(|(m, _)| m).collect(),
            None => return Ok(0),
        };
        self.zrem(key, &members)
    }

    /// ZUNIONSTORE / ZINTERSTORE. Plain sets count as members with score 1.
    pub fn zstore<K: AsRef<[u8]>>(
        &mut self,
        op: ZSetAlgebra,
        dst: Key,
        keys: &[K],
        options: &StoreOptions,
    ) -> Result<usize> {
        if !options.weights.is_empty() && options.weights.len() != keys.len() {
            return Err(CommandError::SyntaxError.into());
        }

        let mut inputs: Vec<HashMap<Vec<u8>, f64>> = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let weight = options.weights.get(i).copied().unwrap_or(1.0);
            let members: HashMap<Vec<u8>, f64> = match self.get_value(key.as_ref()) {
                Some(Value::SortedSet(zset)) => zset
                    .iter()
                    .map(|(m, s)| (m.to_vec(), weighted(s, weight)))
                    .collect(),
                Some(Value::Set(set)) => set.iter().map(|m| (m.clone(), weight)).collect(),
                Some(_) => return wrong_type(),
                None => HashMap::new(),
            };
            inputs.push(members);
        }

        let mut inputs = inputs.into_iter();
        let mut acc = inputs.next().unwrap_or_default();
        for next in inputs {
            acc = match op {
                ZSetAlgebra::Union => {
                    for (member, score) in next {
                        acc.entry(member)
                            .and_modify(|s| *s = options.aggregate.combine(*s, score))
                            .or_insert(score);
                    }
                    acc
                }
                ZSetAlgebra::Inter => acc
                    .into_iter()
                    .filter_map(|(member, score)| {
                        next.get(&member)
                            .map(|other| (member, options.aggregate.combine(score, *other)))
                    })
                    .collect(),
            };
        }

        let len = acc.len();
        if acc.is_empty() {
            self.remove(&dst);
        } else {
            let mut zset = SortedSet::new();
            for (member, score) in acc {
                zset.insert(member, score);
            }
            self.insert(dst.clone(), StoredValue::new(Value::SortedSet(zset)));
            self.signal_ready(&dst);
        }
        Ok(len)
    }
}

fn weighted(score: f64, weight: f64) -> f64 {
    let product = score * weight;
    if product.is_nan() { 0.0 } else { product }
}
