//! Stream implementation
//!
//! An append-only log of field/value entries keyed by strictly increasing
//! `{ms}-{seq}` IDs, plus the consumer groups reading from it.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::ops::Bound;
use std::str::FromStr;

use crate::error::CommandError;
use crate::storage::consumer_groups::ConsumerGroup;

/// Field/value pairs of one entry, in insertion order
pub type Fields = Vec<(Vec<u8>, Vec<u8>)>;

/// A stream ID
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Default)]
pub struct StreamId {
    millis: u64,
    seq: u64,
}

/// A stream entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Fields,
}

/// How XADD should pick the new entry's ID
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdSpec {
    /// `*`
    Auto,
    /// `ms-*`
    AutoSeq(u64),
    /// `ms-seq`
    Explicit(StreamId),
}

/// One end of an XRANGE interval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeBound {
    Inclusive(StreamId),
    Exclusive(StreamId),
}

/// Trimming policy for XADD/XTRIM
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimStrategy {
    /// Keep at most `threshold` entries
    MaxLen { threshold: usize, approximate: bool },
    /// Drop entries with an ID below `threshold`
    MinId { threshold: StreamId, approximate: bool },
}

/// Stream value
#[derive(Clone, Debug, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, Fields>,
    /// Last generated ID, kept even when the entry is gone
    last_id: StreamId,
    /// Number of entries ever added
    entries_added: u64,
    /// Greatest ID ever deleted
    max_deleted_id: StreamId,
    /// Consumer groups by name
    pub(crate) groups: BTreeMap<String, ConsumerGroup>,
}

impl StreamId {
    #[inline]
    pub const fn new(millis: u64, seq: u64) -> Self {
        StreamId { millis, seq }
    }

    #[inline]
    pub fn millis(&self) -> u64 {
        self.millis
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub const fn min() -> Self {
        StreamId::new(0, 0)
    }

    pub const fn max() -> Self {
        StreamId::new(u64::MAX, u64::MAX)
    }

    /// The smallest ID greater than this one
    pub fn successor(&self) -> Option<Self> {
        if self.seq < u64::MAX {
            Some(StreamId::new(self.millis, self.seq + 1))
        } else if self.millis < u64::MAX {
            Some(StreamId::new(self.millis + 1, 0))
        } else {
            None
        }
    }

    /// The greatest ID smaller than this one
    pub fn predecessor(&self) -> Option<Self> {
        if self.seq > 0 {
            Some(StreamId::new(self.millis, self.seq - 1))
        } else if self.millis > 0 {
            Some(StreamId::new(self.millis - 1, u64::MAX))
        } else {
            None
        }
    }

    /// Parse `ms-seq`, or `ms` with the given default sequence
    pub fn parse_with_default_seq(bytes: &[u8], default_seq: u64) -> Result<Self, CommandError> {
        let invalid = || CommandError::invalid("Invalid stream ID specified as stream command argument");
        let s = std::str::from_utf8(bytes).map_err(|_| invalid())?;
        match s.split_once('-') {
            Some((ms, seq)) => Ok(StreamId::new(
                ms.parse().map_err(|_| invalid())?,
                seq.parse().map_err(|_| invalid())?,
            )),
            None => Ok(StreamId::new(s.parse().map_err(|_| invalid())?, default_seq)),
        }
    }

    /// Parse a full ID, `ms` alone meaning `ms-0`
    pub fn parse(bytes: &[u8]) -> Result<Self, CommandError> {
        Self::parse_with_default_seq(bytes, 0)
    }
}

impl PartialOrd for StreamId {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamId {
    #[inline]
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.millis, self.seq).cmp(&(other.millis, other.seq))
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamId::parse(s.as_bytes())
    }
}

impl IdSpec {
    /// Parse the ID argument of XADD
    pub fn parse(bytes: &[u8]) -> Result<Self, CommandError> {
        if bytes == b"*" {
            return Ok(IdSpec::Auto);
        }
        if let Some(ms) = bytes.strip_suffix(b"-*") {
            let ms = std::str::from_utf8(ms)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| CommandError::invalid("Invalid stream ID specified as stream command argument"))?;
            return Ok(IdSpec::AutoSeq(ms));
        }
        Ok(IdSpec::Explicit(StreamId::parse(bytes)?))
    }
}

impl RangeBound {
    /// Parse the start argument of XRANGE (`-`, `(id`, `id`, `ms`)
    pub fn parse_start(bytes: &[u8]) -> Result<Self, CommandError> {
        match bytes {
            b"-" => Ok(RangeBound::Inclusive(StreamId::min())),
            b"+" => Ok(RangeBound::Inclusive(StreamId::max())),
            [b'(', rest @ ..] => Ok(RangeBound::Exclusive(StreamId::parse_with_default_seq(rest, 0)?)),
            _ => Ok(RangeBound::Inclusive(StreamId::parse_with_default_seq(bytes, 0)?)),
        }
    }

    /// Parse the end argument of XRANGE (`+`, `(id`, `id`, `ms`)
    pub fn parse_end(bytes: &[u8]) -> Result<Self, CommandError> {
        match bytes {
            b"+" => Ok(RangeBound::Inclusive(StreamId::max())),
            b"-" => Ok(RangeBound::Inclusive(StreamId::min())),
            [b'(', rest @ ..] => Ok(RangeBound::Exclusive(StreamId::parse_with_default_seq(rest, u64::MAX)?)),
            _ => Ok(RangeBound::Inclusive(StreamId::parse_with_default_seq(bytes, u64::MAX)?)),
        }
    }

    fn as_bound(&self) -> Bound<StreamId> {
        match *self {
            RangeBound::Inclusive(id) => Bound::Included(id),
            RangeBound::Exclusive(id) => Bound::Excluded(id),
        }
    }
}

impl Stream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last generated ID
    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Number of entries ever added
    pub fn entries_added(&self) -> u64 {
        self.entries_added
    }

    /// Greatest ID ever deleted
    pub fn max_deleted_id(&self) -> StreamId {
        self.max_deleted_id
    }

    /// The ID `*` would produce at `now_ms`
    pub fn next_auto_id(&self, now_ms: u64) -> Option<StreamId> {
        if now_ms > self.last_id.millis {
            Some(StreamId::new(now_ms, 0))
        } else {
            self.last_id.successor()
        }
    }

    /// Append an entry and return its ID
    pub fn add(&mut self, spec: IdSpec, fields: Fields, now_ms: u64) -> Result<StreamId, CommandError> {
        let too_small = || {
            CommandError::invalid("The ID specified in XADD is equal or smaller than the target stream top item")
        };
        let id = match spec {
            IdSpec::Auto => self
                .next_auto_id(now_ms)
                .ok_or_else(|| CommandError::invalid("The stream has exhausted the last possible ID, unable to add more items"))?,
            IdSpec::AutoSeq(ms) => {
                if ms < self.last_id.millis {
                    return Err(too_small());
                } else if ms == self.last_id.millis {
                    if self.last_id.seq == u64::MAX {
                        return Err(too_small());
                    }
                    StreamId::new(ms, self.last_id.seq + 1)
                } else {
                    StreamId::new(ms, 0)
                }
            }
            IdSpec::Explicit(id) => {
                if id == StreamId::min() {
                    return Err(CommandError::invalid("The ID specified in XADD must be greater than 0-0"));
                }
                id
            }
        };
        if id <= self.last_id {
            return Err(too_small());
        }
        self.entries.insert(id, fields);
        self.last_id = id;
        self.entries_added += 1;
        Ok(id)
    }

    /// Fields of one entry
    pub fn get(&self, id: &StreamId) -> Option<&Fields> {
        self.entries.get(id)
    }

    /// Whether an entry exists
    pub fn contains(&self, id: &StreamId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn first_entry(&self) -> Option<StreamEntry> {
        self.entries
            .first_key_value()
            .map(|(id, fields)| StreamEntry { id: *id, fields: fields.clone() })
    }

    pub fn last_entry(&self) -> Option<StreamEntry> {
        self.entries
            .last_key_value()
            .map(|(id, fields)| StreamEntry { id: *id, fields: fields.clone() })
    }

    /// Entries between `start` and `end`, ascending
    pub fn range(&self, start: RangeBound, end: RangeBound, count: Option<usize>) -> Vec<StreamEntry> {
        if !Self::valid_interval(start, end) {
            return Vec::new();
        }
        self.entries
            .range((start.as_bound(), end.as_bound()))
            .take(count.unwrap_or(usize::MAX))
            .map(|(id, fields)| StreamEntry { id: *id, fields: fields.clone() })
            .collect()
    }

    /// Entries between `start` and `end`, descending
    pub fn rev_range(&self, start: RangeBound, end: RangeBound, count: Option<usize>) -> Vec<StreamEntry> {
        if !Self::valid_interval(start, end) {
            return Vec::new();
        }
        self.entries
            .range((start.as_bound(), end.as_bound()))
            .rev()
            .take(count.unwrap_or(usize::MAX))
            .map(|(id, fields)| StreamEntry { id: *id, fields: fields.clone() })
            .collect()
    }

    /// Entries with an ID strictly greater than `after`, ascending
    pub fn entries_after(&self, after: StreamId, count: Option<usize>) -> Vec<StreamEntry> {
        self.entries
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take(count.unwrap_or(usize::MAX))
            .map(|(id, fields)| StreamEntry { id: *id, fields: fields.clone() })
            .collect()
    }

    /// Delete entries by ID, returning how many existed
    pub fn delete(&mut self, ids: &[StreamId]) -> usize {
        let mut deleted = 0;
        for id in ids {
            if self.entries.remove(id).is_some() {
                deleted += 1;
                if *id > self.max_deleted_id {
                    self.max_deleted_id = *id;
                }
            }
        }
        deleted
    }

    /// Trim the stream, returning the number of entries removed.
    ///
    /// Approximate trimming only removes whole storage nodes of
    /// `node_size` entries, so it may keep more than asked for.
    pub fn trim(&mut self, strategy: TrimStrategy, node_size: usize) -> usize {
        let (removable, approximate) = match strategy {
            TrimStrategy::MaxLen { threshold, approximate } => {
                (self.len().saturating_sub(threshold), approximate)
            }
            TrimStrategy::MinId { threshold, approximate } => {
                (self.entries.range(..threshold).count(), approximate)
            }
        };
        let to_remove = if approximate && node_size > 0 {
            (removable / node_size) * node_size
        } else {
            removable
        };
        for _ in 0..to_remove {
            if let Some((id, _)) = self.entries.pop_first() {
                if id > self.max_deleted_id {
                    self.max_deleted_id = id;
                }
            }
        }
        to_remove
    }

    /// Set the last generated ID (XSETID); it may not go below the top entry
    pub fn set_last_id(&mut self, id: StreamId) -> Result<(), CommandError> {
        if let Some((top, _)) = self.entries.last_key_value() {
            if id < *top {
                return Err(CommandError::invalid(
                    "The ID specified in XSETID is smaller than the target stream top item",
                ));
            }
        }
        self.last_id = id;
        Ok(())
    }

    /// Number of storage nodes the entries would occupy
    pub fn node_count(&self, node_size: usize) -> usize {
        if node_size == 0 {
            return usize::from(!self.is_empty());
        }
        self.len().div_ceil(node_size)
    }

    fn valid_interval(start: RangeBound, end: RangeBound) -> bool {
        match (start, end) {
            (RangeBound::Inclusive(s), RangeBound::Inclusive(e)) => s <= e,
            (RangeBound::Inclusive(s), RangeBound::Exclusive(e))
            | (RangeBound::Exclusive(s), RangeBound::Inclusive(e)) => s < e,
            (RangeBound::Exclusive(s), RangeBound::Exclusive(e)) => s < e && s.successor() != Some(e),
        }
    }
}
