//! Stream and consumer group operations

use crate::error::{CommandError, Result};
use crate::storage::consumer_groups::{
    ClaimOptions, ConsumerInfo, GroupReadStart, PendingEntryInfo, PendingQuery, PendingSummary,
};
use crate::storage::database::{wrong_type, Database};
use crate::storage::stream::{Fields, IdSpec, RangeBound, Stream, StreamEntry, StreamId, TrimStrategy};
use crate::storage::value::{StoredValue, Value};

/// Starting point of XGROUP CREATE / SETID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStartId {
    /// An explicit ID
    Id(StreamId),
    /// `$`: the stream's last ID
    Last,
}

/// XINFO STREAM reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub length: usize,
    pub radix_tree_keys: usize,
    pub radix_tree_nodes: usize,
    pub groups: usize,
    pub last_generated_id: StreamId,
    pub max_deleted_entry_id: StreamId,
    pub entries_added: u64,
    pub first_entry: Option<StreamEntry>,
    pub last_entry: Option<StreamEntry>,
}

/// XINFO GROUPS reply row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub consumers: usize,
    pub pending: usize,
    pub last_delivered_id: StreamId,
}

impl GroupStartId {
    pub fn parse(token: &[u8]) -> Result<Self> {
        if token == b"$" {
            Ok(GroupStartId::Last)
        } else {
            Ok(GroupStartId::Id(StreamId::parse(token)?))
        }
    }

    fn resolve(&self, stream: &Stream) -> StreamId {
        match *self {
            GroupStartId::Id(id) => id,
            GroupStartId::Last => stream.last_id(),
        }
    }
}

fn no_group(key: &[u8], group: &str) -> CommandError {
    CommandError::NoGroup {
        key: String::from_utf8_lossy(key).into_owned(),
        group: group.to_string(),
    }
}

impl Database {
    fn stream(&mut self, key: &[u8]) -> Result<Option<&Stream>> {
        match self.get_value(key) {
            Some(Value::Stream(stream)) => Ok(Some(stream)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    fn stream_mut(&mut self, key: &[u8]) -> Result<Option<&mut Stream>> {
        match self.get_value_mut(key) {
            Some(Value::Stream(stream)) => Ok(Some(stream)),
            Some(_) => wrong_type(),
            None => Ok(None),
        }
    }

    /// XADD. Returns `None` when NOMKSTREAM found no stream.
    pub fn xadd(
        &mut self,
        key: &[u8],
        id: IdSpec,
        fields: Fields,
        no_mkstream: bool,
        trim: Option<TrimStrategy>,
    ) -> Result<Option<StreamId>> {
        let now = self.now_ms();
        let node_size = self.stream_node_max_entries();
        if self.stream(key)?.is_none() {
            if no_mkstream {
                return Ok(None);
            }
            // Validate before creating so a rejected ID leaves no empty stream behind
            Stream::new().add(id, fields.clone(), now)?;
            self.insert(key.to_vec(), StoredValue::new(Value::Stream(Stream::new())));
        }
        let added = match self.stream_mut(key)? {
            Some(stream) => {
                let added = stream.add(id, fields, now)?;
                if let Some(strategy) = trim {
                    stream.trim(strategy, node_size);
                }
                added
            }
            None => return Ok(None),
        };
        self.after_write(key);
        self.signal_ready(key);
        Ok(Some(added))
    }

    pub fn xlen(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.stream(key)?.map_or(0, Stream::len))
    }

    /// XDEL: number of entries removed
    pub fn xdel(&mut self, key: &[u8], ids: &[StreamId]) -> Result<usize> {
        let deleted = match self.stream_mut(key)? {
            Some(stream) => stream.delete(ids),
            None => return Ok(0),
        };
        if deleted > 0 {
            self.after_write(key);
        }
        Ok(deleted)
    }

    /// XTRIM: number of entries removed
    pub fn xtrim(&mut self, key: &[u8], strategy: TrimStrategy) -> Result<usize> {
        let node_size = self.stream_node_max_entries();
        let removed = match self.stream_mut(key)? {
            Some(stream) => stream.trim(strategy, node_size),
            None => return Ok(0),
        };
        if removed > 0 {
            self.after_write(key);
        }
        Ok(removed)
    }

    /// XSETID
    pub fn xsetid(&mut self, key: &[u8], id: StreamId) -> Result<()> {
        match self.stream_mut(key)? {
            Some(stream) => stream.set_last_id(id)?,
            None => return Err(CommandError::NoSuchKey.into()),
        }
        self.after_write(key);
        Ok(())
    }

    /// XRANGE / XREVRANGE
    pub fn xrange(
        &mut self,
        key: &[u8],
        start: RangeBound,
        end: RangeBound,
        count: Option<usize>,
        reverse: bool,
    ) -> Result<Vec<StreamEntry>> {
        Ok(match self.stream(key)? {
            Some(stream) if reverse => stream.rev_range(start, end, count),
            Some(stream) => stream.range(start, end, count),
            None => Vec::new(),
        })
    }

    /// Entries after `after` (XREAD)
    pub fn xread(&mut self, key: &[u8], after: StreamId, count: Option<usize>) -> Result<Vec<StreamEntry>> {
        Ok(self
            .stream(key)?
            .map(|stream| stream.entries_after(after, count))
            .unwrap_or_default())
    }

    /// Last ID of a stream, `0-0` when absent (resolves `$` in XREAD)
    pub fn xlast_id(&mut self, key: &[u8]) -> Result<StreamId> {
        Ok(self.stream(key)?.map_or(StreamId::min(), Stream::last_id))
    }

    /// XGROUP CREATE
    pub fn xgroup_create(&mut self, key: &[u8], group: &str, start: GroupStartId, mkstream: bool) -> Result<()> {
        if self.stream(key)?.is_none() {
            if !mkstream {
                return Err(CommandError::invalid(
                    "The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.",
                )
                .into());
            }
            self.insert(key.to_vec(), StoredValue::new(Value::Stream(Stream::new())));
        }
        if let Some(stream) = self.stream_mut(key)? {
            let id = start.resolve(stream);
            stream.create_group(group, id)?;
        }
        self.after_write(key);
        Ok(())
    }

    /// XGROUP SETID
    pub fn xgroup_setid(&mut self, key: &[u8], group: &str, start: GroupStartId) -> Result<()> {
        let stream = self.stream_mut(key)?.ok_or_else(|| no_group(key, group))?;
        let id = start.resolve(stream);
        stream.group_mut(group).ok_or_else(|| no_group(key, group))?.last_delivered_id = id;
        self.after_write(key);
        Ok(())
    }

    /// XGROUP DESTROY
    pub fn xgroup_destroy(&mut self, key: &[u8], group: &str) -> Result<bool> {
        let destroyed = match self.stream_mut(key)? {
            Some(stream) => stream.destroy_group(group),
            None => return Err(no_group(key, group).into()),
        };
        if destroyed {
            self.after_write(key);
        }
        Ok(destroyed)
    }

    /// XGROUP CREATECONSUMER
    pub fn xgroup_create_consumer(&mut self, key: &[u8], group: &str, consumer: &str) -> Result<bool> {
        let now = self.now_ms();
        let created = self
            .stream_mut(key)?
            .and_then(|stream| stream.group_mut(group))
            .ok_or_else(|| no_group(key, group))?
            .create_consumer(consumer, now);
        self.after_write(key);
        Ok(created)
    }

    /// XGROUP DELCONSUMER: pending entries the consumer owned
    pub fn xgroup_del_consumer(&mut self, key: &[u8], group: &str, consumer: &str) -> Result<usize> {
        let pending = self
            .stream_mut(key)?
            .and_then(|stream| stream.group_mut(group))
            .ok_or_else(|| no_group(key, group))?
            .delete_consumer(consumer);
        self.after_write(key);
        Ok(pending)
    }

    /// XREADGROUP for one stream
    pub fn xreadgroup(
        &mut self,
        key: &[u8],
        group: &str,
        consumer: &str,
        start: GroupReadStart,
        count: Option<usize>,
        no_ack: bool,
    ) -> Result<Vec<StreamEntry>> {
        let now = self.now_ms();
        let entries = self
            .stream_mut(key)?
            .and_then(|stream| stream.read_group(group, consumer, start, count, no_ack, now))
            .ok_or_else(|| no_group(key, group))?;
        self.after_write(key);
        Ok(entries)
    }

    /// Whether `group` exists on the stream at `key`
    pub fn xgroup_exists(&mut self, key: &[u8], group: &str) -> Result<bool> {
        Ok(self.stream(key)?.is_some_and(|stream| stream.group(group).is_some()))
    }

    /// XACK
    pub fn xack(&mut self, key: &[u8], group: &str, ids: &[StreamId]) -> Result<usize> {
        let acked = match self.stream_mut(key)? {
            Some(stream) => stream.group_mut(group).map_or(0, |g| g.ack(ids)),
            None => return Ok(0),
        };
        if acked > 0 {
            self.after_write(key);
        }
        Ok(acked)
    }

    /// XCLAIM
    pub fn xclaim(
        &mut self,
        key: &[u8],
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[StreamId],
        options: &ClaimOptions,
    ) -> Result<Vec<StreamEntry>> {
        let now = self.now_ms();
        let claimed = self
            .stream_mut(key)?
            .and_then(|stream| stream.claim(group, consumer, min_idle_ms, ids, options, now))
            .ok_or_else(|| no_group(key, group))?;
        self.after_write(key);
        Ok(claimed)
    }

    /// XPENDING summary form
    pub fn xpending_summary(&mut self, key: &[u8], group: &str) -> Result<PendingSummary> {
        self.stream(key)?
            .and_then(|stream| stream.group(group))
            .map(|g| g.pending_summary())
            .ok_or_else(|| no_group(key, group).into())
    }

    /// XPENDING detailed form
    pub fn xpending_range(&mut self, key: &[u8], group: &str, query: &PendingQuery) -> Result<Vec<PendingEntryInfo>> {
        let now = self.now_ms();
        self.stream(key)?
            .and_then(|stream| stream.group(group))
            .map(|g| g.pending_range(query, now))
            .ok_or_else(|| no_group(key, group).into())
    }

    /// XINFO STREAM
    pub fn xinfo_stream(&mut self, key: &[u8]) -> Result<StreamInfo> {
        let node_size = self.stream_node_max_entries();
        let stream = self.stream(key)?.ok_or(CommandError::NoSuchKey)?;
        let keys = stream.node_count(node_size);
        Ok(StreamInfo {
            length: stream.len(),
            radix_tree_keys: keys,
            radix_tree_nodes: keys + 1,
            groups: stream.group_count(),
            last_generated_id: stream.last_id(),
            max_deleted_entry_id: stream.max_deleted_id(),
            entries_added: stream.entries_added(),
            first_entry: stream.first_entry(),
            last_entry: stream.last_entry(),
        })
    }

    /// XINFO GROUPS
    pub fn xinfo_groups(&mut self, key: &[u8]) -> Result<Vec<GroupInfo>> {
        let stream = self.stream(key)?.ok_or(CommandError::NoSuchKey)?;
        Ok(stream
            .groups()
            .map(|g| GroupInfo {
                name: g.name.clone(),
                consumers: g.consumer_count(),
                pending: g.pending_count(),
                last_delivered_id: g.last_delivered_id,
            })
            .collect())
    }

    /// XINFO CONSUMERS
    pub fn xinfo_consumers(&mut self, key: &[u8], group: &str) -> Result<Vec<ConsumerInfo>> {
        let now = self.now_ms();
        let stream = self.stream(key)?.ok_or(CommandError::NoSuchKey)?;
        stream
            .group(group)
            .map(|g| g.consumer_infos(now))
            .ok_or_else(|| no_group(key, group).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::database::tests::test_db;

    fn fields() -> Fields {
        vec![(b"field".to_vec(), b"value".to_vec())]
    }

    fn all() -> (RangeBound, RangeBound) {
        (RangeBound::Inclusive(StreamId::min()), RangeBound::Inclusive(StreamId::max()))
    }

    #[test]
    fn test_auto_ids_strictly_increase() {
        let (mut db, _) = test_db();
        let mut last = StreamId::min();
        for _ in 0..50 {
            let id = db.xadd(b"s", IdSpec::Auto, fields(), false, None).unwrap().unwrap();
            assert!(id > last);
            last = id;
        }
        assert_eq!(last, StreamId::new(1_000, 49));
    }

    #[test]
    fn test_nomkstream_and_rejected_id() {
        let (mut db, _) = test_db();
        assert_eq!(db.xadd(b"s", IdSpec::Auto, fields(), true, None).unwrap(), None);
        assert!(!db.contains(b"s"));
        assert!(db.xadd(b"s", IdSpec::Explicit(StreamId::min()), fields(), false, None).is_err());
        assert!(!db.contains(b"s"));
    }

    #[test]
    fn test_exact_trim_removes_overflow() {
        let (mut db, _) = test_db();
        for _ in 0..10 {
            db.xadd(b"s", IdSpec::Auto, fields(), false, None).unwrap();
        }
        let strategy = TrimStrategy::MaxLen { threshold: 4, approximate: false };
        assert_eq!(db.xtrim(b"s", strategy).unwrap(), 6);
        assert_eq!(db.xlen(b"s").unwrap(), 4);
    }

    #[test]
    fn test_emptied_stream_is_kept() {
        let (mut db, _) = test_db();
        let id = db.xadd(b"s", IdSpec::Auto, fields(), false, None).unwrap().unwrap();
        assert_eq!(db.xdel(b"s", &[id]).unwrap(), 1);
        assert_eq!(db.exists(&[b"s"]), 1);
        assert_eq!(db.key_type(b"s"), "stream");
    }

    #[test]
    fn test_group_lifecycle() {
        let (mut db, _) = test_db();
        let err = db.xgroup_create(b"s", "g", GroupStartId::Last, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        db.xgroup_create(b"s", "g", GroupStartId::Last, true).unwrap();
        assert!(db.xgroup_create(b"s", "g", GroupStartId::Last, false).unwrap_err().to_string().starts_with("BUSYGROUP"));

        let id = db.xadd(b"s", IdSpec::Auto, fields(), false, None).unwrap().unwrap();
        let got = db.xreadgroup(b"s", "g", "c1", GroupReadStart::NewEntries, None, false).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(db.xpending_summary(b"s", "g").unwrap().count, 1);
        assert_eq!(db.xack(b"s", "g", &[id, id]).unwrap(), 1);

        let err = db.xreadgroup(b"s", "nope", "c1", GroupReadStart::NewEntries, None, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(db.xgroup_create_consumer(b"s", "g", "c2").unwrap());
        assert_eq!(db.xinfo_consumers(b"s", "g").unwrap().len(), 2);
        assert_eq!(db.xgroup_del_consumer(b"s", "g", "c2").unwrap(), 0);
        assert!(db.xgroup_destroy(b"s", "g").unwrap());
        assert!(!db.xgroup_destroy(b"s", "g").unwrap());
    }

    #[test]
    fn test_xinfo_stream() {
        let (mut db, _) = test_db();
        for _ in 0..150 {
            db.xadd(b"s", IdSpec::Auto, fields(), false, None).unwrap();
        }
        let info = db.xinfo_stream(b"s").unwrap();
        assert_eq!(info.length, 150);
        assert_eq!(info.radix_tree_keys, 2);
        assert_eq!(info.first_entry.unwrap().id, StreamId::new(1_000, 0));
        assert_eq!(info.last_generated_id, StreamId::new(1_000, 149));

        let (start, end) = all();
        assert_eq!(db.xrange(b"s", start, end, Some(3), true).unwrap()[0].id, StreamId::new(1_000, 149));
    }
}
