//! Sorted set implementation
//!
//! Uses dual indexing: an ordered set of `(score, member)` pairs for
//! score/rank/lex range operations and a HashMap for member lookups.
//! Members with equal scores are ordered by their bytes, which is what
//! rank and lexicographic range queries rely on.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use ordered_float::OrderedFloat;

use crate::error::CommandError;

/// Score-ordered, member-unique collection
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    /// Member-to-score lookup table
    scores: HashMap<Vec<u8>, f64>,
    /// `(score, member)` in ascending order
    ordered: BTreeSet<(OrderedFloat<f64>, Vec<u8>)>,
}

/// One end of a score interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

/// A score interval as given to ZRANGEBYSCORE and friends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: ScoreBound,
    pub max: ScoreBound,
}

/// One end of a lexicographic interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    /// `-`
    NegInfinity,
    /// `+`
    PosInfinity,
    /// `[member`
    Inclusive(Vec<u8>),
    /// `(member`
    Exclusive(Vec<u8>),
}

/// A member interval as given to ZRANGEBYLEX and friends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexRange {
    pub min: LexBound,
    pub max: LexBound,
}

impl ScoreBound {
    /// Parse `1.5`, `(1.5`, `-inf`, `+inf`
    pub fn parse(token: &[u8]) -> Result<Self, CommandError> {
        let (exclusive, rest) = match token.first() {
            Some(b'(') => (true, &token[1..]),
            _ => (false, token),
        };
        let value = parse_score(rest)
            .ok_or_else(|| CommandError::invalid("min or max is not a float"))?;
        Ok(if exclusive {
            ScoreBound::Exclusive(value)
        } else {
            ScoreBound::Inclusive(value)
        })
    }

    fn admits_above(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
        }
    }

    fn admits_below(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            ScoreBound::Inclusive(v) | ScoreBound::Exclusive(v) => v,
        }
    }
}

impl ScoreRange {
    /// The whole real line
    pub fn all() -> Self {
        ScoreRange {
            min: ScoreBound::Inclusive(f64::NEG_INFINITY),
            max: ScoreBound::Inclusive(f64::INFINITY),
        }
    }

    /// Parse a `min max` pair
    pub fn parse(min: &[u8], max: &[u8]) -> Result<Self, CommandError> {
        Ok(ScoreRange {
            min: ScoreBound::parse(min)?,
            max: ScoreBound::parse(max)?,
        })
    }

    /// Whether a score lies in this range
    pub fn contains(&self, score: f64) -> bool {
        self.min.admits_above(score) && self.max.admits_below(score)
    }
}

impl LexBound {
    /// Parse `-`, `+`, `[member` or `(member`
    pub fn parse(token: &[u8]) -> Result<Self, CommandError> {
        match token {
            b"-" => Ok(LexBound::NegInfinity),
            b"+" => Ok(LexBound::PosInfinity),
            [b'[', rest @ ..] => Ok(LexBound::Inclusive(rest.to_vec())),
            [b'(', rest @ ..] => Ok(LexBound::Exclusive(rest.to_vec())),
            _ => Err(CommandError::invalid("min or max not valid string range item")),
        }
    }

    fn admits_above(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInfinity => true,
            LexBound::PosInfinity => false,
            LexBound::Inclusive(min) => member >= min.as_slice(),
            LexBound::Exclusive(min) => member > min.as_slice(),
        }
    }

    fn admits_below(&self, member: &[u8]) -> bool {
        match self {
            LexBound::NegInfinity => false,
            LexBound::PosInfinity => true,
            LexBound::Inclusive(max) => member <= max.as_slice(),
            LexBound::Exclusive(max) => member < max.as_slice(),
        }
    }
}

impl LexRange {
    /// Parse a `min max` pair
    pub fn parse(min: &[u8], max: &[u8]) -> Result<Self, CommandError> {
        Ok(LexRange {
            min: LexBound::parse(min)?,
            max: LexBound::parse(max)?,
        })
    }

    /// Whether a member lies in this range
    pub fn contains(&self, member: &[u8]) -> bool {
        self.min.admits_above(member) && self.max.admits_below(member)
    }
}

/// Parse a score, accepting `inf`/`+inf`/`-inf` and rejecting NaN
pub fn parse_score(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?;
    let value = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        other => other.parse::<f64>().ok()?,
    };
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

impl SortedSet {
    /// Create an empty sorted set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a member; returns the previous score
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> Option<f64> {
        let previous = self.scores.insert(member.clone(), score);
        if let Some(old) = previous {
            self.ordered.remove(&(OrderedFloat(old), member.clone()));
        }
        self.ordered.insert((OrderedFloat(score), member));
        previous
    }

    /// Remove a member, returning its score
    pub fn remove(&mut self, member: &[u8]) -> Option<f64> {
        let (owned, score) = self.scores.remove_entry(member)?;
        self.ordered.remove(&(OrderedFloat(score), owned));
        Some(score)
    }

    /// Score of a member
    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// 0-based ascending rank of a member
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = *self.scores.get(member)?;
        let key = (OrderedFloat(score), member.to_vec());
        Some(self.ordered.range(..key).count())
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Ascending iteration over `(member, score)`
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&[u8], f64)> + '_ {
        self.ordered.iter().map(|(s, m)| (m.as_slice(), s.into_inner()))
    }

    /// Members by ascending rank, `start..=stop` already normalised
    pub fn range_by_rank(&self, start: usize, stop: usize) -> Vec<(Vec<u8>, f64)> {
        if start > stop || start >= self.len() {
            return Vec::new();
        }
        self.iter()
            .skip(start)
            .take(stop - start + 1)
            .map(|(m, s)| (m.to_vec(), s))
            .collect()
    }

    /// Members whose score lies in `range`, ascending
    pub fn range_by_score(&self, range: &ScoreRange) -> Vec<(Vec<u8>, f64)> {
        let lower = (OrderedFloat(range.min.value()), Vec::new());
        self.ordered
            .range((Bound::Included(lower), Bound::Unbounded))
            .map(|(s, m)| (m, s.into_inner()))
            .skip_while(|(_, s)| !range.min.admits_above(*s))
            .take_while(|(_, s)| range.max.admits_below(*s))
            .map(|(m, s)| (m.clone(), s))
            .collect()
    }

    /// Members lying in a lexicographic range, ascending. Only meaningful
    /// when all members share one score.
    pub fn range_by_lex(&self, range: &LexRange) -> Vec<(Vec<u8>, f64)> {
        self.iter()
            .skip_while(|(m, _)| !range.min.admits_above(m))
            .take_while(|(m, _)| range.max.admits_below(m))
            .map(|(m, s)| (m.to_vec(), s))
            .collect()
    }

    /// Number of members with a score in `range`
    pub fn count_in_score_range(&self, range: &ScoreRange) -> usize {
        self.iter().filter(|(_, s)| range.contains(*s)).count()
    }

    /// Remove and return up to `count` lowest-ranked members
    pub fn pop_min(&mut self, count: usize) -> Vec<(Vec<u8>, f64)> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        while popped.len() < count {
            match self.ordered.pop_first() {
                Some((score, member)) => {
                    self.scores.remove(&member);
                    popped.push((member, score.into_inner()));
                }
                None => break,
            }
        }
        popped
    }

    /// Remove and return up to `count` highest-ranked members
    pub fn pop_max(&mut self, count: usize) -> Vec<(Vec<u8>, f64)> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        while popped.len() < count {
            match self.ordered.pop_last() {
                Some((score, member)) => {
                    self.scores.remove(&member);
                    popped.push((member, score.into_inner()));
                }
                None => break,
            }
        }
        popped
    }
}
