//! Consumer Groups implementation for streams
//!
//! Provides coordinated consumption with acknowledgments,
//! pending entry lists, and ownership transfer.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CommandError;
use crate::storage::stream::{Fields, Stream, StreamEntry, StreamId};

/// Consumer group for coordinated stream consumption
#[derive(Debug, Clone)]
pub struct ConsumerGroup {
    /// Group name
    pub name: String,

    /// Last delivered ID for this group
    pub last_delivered_id: StreamId,

    /// Pending entries list (PEL), entries delivered but not acknowledged
    pending: BTreeMap<StreamId, PendingEntry>,

    /// Consumers in this group
    consumers: BTreeMap<String, Consumer>,
}

/// Individual consumer within a group
#[derive(Debug, Clone)]
pub struct Consumer {
    /// Consumer name
    pub name: String,

    /// IDs this consumer owns in the group PEL
    pending: BTreeSet<StreamId>,

    /// Last time the consumer interacted with the group
    pub seen_time_ms: u64,
}

/// Entry in the pending entries list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    /// Consumer that owns this entry
    pub consumer: String,

    /// Last delivery time
    pub delivery_time_ms: u64,

    /// Number of times this entry was delivered
    pub delivery_count: u64,
}

/// Result of XPENDING in summary form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSummary {
    /// Total number of pending messages
    pub count: usize,

    /// Smallest pending ID
    pub min_id: Option<StreamId>,

    /// Greatest pending ID
    pub max_id: Option<StreamId>,

    /// Per-consumer pending counts
    pub consumers: Vec<(String, usize)>,
}

/// Detailed pending entry information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntryInfo {
    pub id: StreamId,
    pub consumer: String,
    /// Milliseconds since last delivery
    pub idle_ms: u64,
    pub delivery_count: u64,
}

/// Filters for the detailed form of XPENDING
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingQuery {
    pub min_idle_ms: Option<u64>,
    pub start: Option<StreamId>,
    pub end: Option<StreamId>,
    pub count: usize,
    pub consumer: Option<String>,
}

/// Consumer statistics for XINFO CONSUMERS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub name: String,
    pub pending: usize,
    pub idle_ms: u64,
}

/// Options of XCLAIM
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimOptions {
    /// Set the idle time of claimed entries
    pub idle_ms: Option<u64>,
    /// Set the last delivery time to this absolute time
    pub time_ms: Option<u64>,
    /// Set the delivery counter
    pub retry_count: Option<u64>,
    /// Create PEL entries for IDs that are not pending yet
    pub force: bool,
    /// Return IDs only and leave the delivery counter alone
    pub just_id: bool,
}

/// What XREADGROUP should return for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupReadStart {
    /// `>`: entries never delivered to the group
    NewEntries,
    /// Pending history of the consumer after this ID
    History(StreamId),
}

impl ConsumerGroup {
    /// Create a new consumer group
    pub fn new(name: impl Into<String>, last_delivered_id: StreamId) -> Self {
        ConsumerGroup {
            name: name.into(),
            last_delivered_id,
            pending: BTreeMap::new(),
            consumers: BTreeMap::new(),
        }
    }

    /// Create a consumer, or refresh its seen time if it exists.
    /// Returns whether the consumer was created.
    pub fn create_consumer(&mut self, name: &str, now_ms: u64) -> bool {
        if let Some(consumer) = self.consumers.get_mut(name) {
            consumer.seen_time_ms = now_ms;
            return false;
        }
        self.consumers.insert(
            name.to_string(),
            Consumer {
                name: name.to_string(),
                pending: BTreeSet::new(),
                seen_time_ms: now_ms,
            },
        );
        true
    }

    /// Delete a consumer and return the number of pending messages it owned
    pub fn delete_consumer(&mut self, name: &str) -> usize {
        match self.consumers.remove(name) {
            Some(consumer) => {
                for id in &consumer.pending {
                    self.pending.remove(id);
                }
                consumer.pending.len()
            }
            None => 0,
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_entry(&self, id: &StreamId) -> Option<&PendingEntry> {
        self.pending.get(id)
    }

    /// Record delivery of new entries to a consumer
    fn deliver(&mut self, consumer: &str, ids: &[StreamId], now_ms: u64, no_ack: bool) {
        self.create_consumer(consumer, now_ms);
        for id in ids {
            if *id > self.last_delivered_id {
                self.last_delivered_id = *id;
            }
            if no_ack {
                continue;
            }
            let entry = PendingEntry {
                consumer: consumer.to_string(),
                delivery_time_ms: now_ms,
                delivery_count: 1,
            };
            if let Some(previous) = self.pending.insert(*id, entry) {
                self.detach(&previous.consumer, id);
            }
            self.attach(consumer, *id);
        }
    }

    /// Acknowledge entries, returning how many were actually pending
    pub fn ack(&mut self, ids: &[StreamId]) -> usize {
        let mut acked = 0;
        for id in ids {
            if let Some(entry) = self.pending.remove(id) {
                self.detach(&entry.consumer, id);
                acked += 1;
            }
        }
        acked
    }

    /// Summary form of XPENDING
    pub fn pending_summary(&self) -> PendingSummary {
        let consumers = self
            .consumers
            .values()
            .filter(|c| !c.pending.is_empty())
            .map(|c| (c.name.clone(), c.pending.len()))
            .collect();
        PendingSummary {
            count: self.pending.len(),
            min_id: self.pending.keys().next().copied(),
            max_id: self.pending.keys().next_back().copied(),
            consumers,
        }
    }

    /// Detailed form of XPENDING
    pub fn pending_range(&self, query: &PendingQuery, now_ms: u64) -> Vec<PendingEntryInfo> {
        let start = query.start.unwrap_or_else(StreamId::min);
        let end = query.end.unwrap_or_else(StreamId::max);
        if start > end {
            return Vec::new();
        }
        self.pending
            .range(start..=end)
            .filter(|(_, entry)| query.consumer.as_deref().map_or(true, |c| c == entry.consumer))
            .map(|(id, entry)| PendingEntryInfo {
                id: *id,
                consumer: entry.consumer.clone(),
                idle_ms: now_ms.saturating_sub(entry.delivery_time_ms),
                delivery_count: entry.delivery_count,
            })
            .filter(|info| query.min_idle_ms.map_or(true, |idle| info.idle_ms >= idle))
            .take(query.count)
            .collect()
    }

    /// Per-consumer statistics
    pub fn consumer_infos(&self, now_ms: u64) -> Vec<ConsumerInfo> {
        self.consumers
            .values()
            .map(|c| ConsumerInfo {
                name: c.name.clone(),
                pending: c.pending.len(),
                idle_ms: now_ms.saturating_sub(c.seen_time_ms),
            })
            .collect()
    }

    fn attach(&mut self, consumer: &str, id: StreamId) {
        if let Some(c) = self.consumers.get_mut(consumer) {
            c.pending.insert(id);
        }
    }

    fn detach(&mut self, consumer: &str, id: &StreamId) {
        if let Some(c) = self.consumers.get_mut(consumer) {
            c.pending.remove(id);
        }
    }
}

/// Group operations that need both the entries and the group state
impl Stream {
    /// Create a group; `BUSYGROUP` if the name is taken
    pub fn create_group(&mut self, name: &str, last_delivered_id: StreamId) -> Result<(), CommandError> {
        if self.groups.contains_key(name) {
            return Err(CommandError::BusyGroup);
        }
        self.groups
            .insert(name.to_string(), ConsumerGroup::new(name, last_delivered_id));
        Ok(())
    }

    pub fn destroy_group(&mut self, name: &str) -> bool {
        self.groups.remove(name).is_some()
    }

    pub fn group(&self, name: &str) -> Option<&ConsumerGroup> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ConsumerGroup> {
        self.groups.get_mut(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &ConsumerGroup> {
        self.groups.values()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// XREADGROUP for one stream. Returns `None` if the group is missing.
    ///
    /// History entries whose stream entry was deleted are returned with
    /// empty fields.
    pub fn read_group(
        &mut self,
        group: &str,
        consumer: &str,
        start: GroupReadStart,
        count: Option<usize>,
        no_ack: bool,
        now_ms: u64,
    ) -> Option<Vec<StreamEntry>> {
        let last_delivered = self.groups.get(group)?.last_delivered_id;
        match start {
            GroupReadStart::NewEntries => {
                let entries = self.entries_after(last_delivered, count);
                let ids: Vec<StreamId> = entries.iter().map(|e| e.id).collect();
                let group = self.groups.get_mut(group)?;
                group.deliver(consumer, &ids, now_ms, no_ack);
                Some(entries)
            }
            GroupReadStart::History(after) => {
                let group_state = self.groups.get_mut(group)?;
                group_state.create_consumer(consumer, now_ms);
                let ids: Vec<StreamId> = group_state
                    .consumers
                    .get(consumer)
                    .map(|c| {
                        c.pending
                            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                            .take(count.unwrap_or(usize::MAX))
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default();
                for id in &ids {
                    if let Some(entry) = group_state.pending.get_mut(id) {
                        entry.delivery_count += 1;
                        entry.delivery_time_ms = now_ms;
                    }
                }
                let entries = ids
                    .into_iter()
                    .map(|id| StreamEntry {
                        id,
                        fields: self.get(&id).cloned().unwrap_or_default(),
                    })
                    .collect();
                Some(entries)
            }
        }
    }

    /// XCLAIM. Returns `None` if the group is missing.
    ///
    /// Pending entries whose stream entry no longer exists are dropped from
    /// the PEL and not returned.
    pub fn claim(
        &mut self,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        ids: &[StreamId],
        options: &ClaimOptions,
        now_ms: u64,
    ) -> Option<Vec<StreamEntry>> {
        let snapshot: Vec<Option<Fields>> = ids.iter().map(|id| self.get(id).cloned()).collect();
        let group = self.groups.get_mut(group)?;
        group.create_consumer(consumer, now_ms);

        let delivery_time = match (options.time_ms, options.idle_ms) {
            (Some(time), _) => time,
            (None, Some(idle)) => now_ms.saturating_sub(idle),
            (None, None) => now_ms,
        };

        let mut claimed = Vec::new();
        for (id, fields) in ids.iter().zip(snapshot) {
            let Some(fields) = fields else {
                if let Some(stale) = group.pending.remove(id) {
                    group.detach(&stale.consumer, id);
                }
                continue;
            };

            let entry = match group.pending.get(id) {
                Some(entry) => entry.clone(),
                None if options.force => PendingEntry {
                    consumer: consumer.to_string(),
                    delivery_time_ms: 0,
                    delivery_count: 0,
                },
                None => continue,
            };
            if min_idle_ms > 0 && now_ms.saturating_sub(entry.delivery_time_ms) < min_idle_ms {
                continue;
            }

            let delivery_count = match options.retry_count {
                Some(n) => n,
                None if options.just_id => entry.delivery_count,
                None => entry.delivery_count + 1,
            };
            group.detach(&entry.consumer, id);
            group.pending.insert(
                *id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivery_time_ms: delivery_time,
                    delivery_count,
                },
            );
            group.attach(consumer, *id);
            claimed.push(StreamEntry { id: *id, fields });
        }
        Some(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::stream::IdSpec;

    fn stream_with(n: u64) -> Stream {
        let mut stream = Stream::new();
        for ms in 1..=n {
            stream
                .add(IdSpec::Explicit(StreamId::new(ms, 0)), vec![(b"f".to_vec(), b"v".to_vec())], 0)
                .unwrap();
        }
        stream
    }

    #[test]
    fn test_busygroup() {
        let mut stream = stream_with(1);
        stream.create_group("g", StreamId::min()).unwrap();
        assert_eq!(stream.create_group("g", StreamId::min()), Err(CommandError::BusyGroup));
        assert!(stream.destroy_group("g"));
        assert!(!stream.destroy_group("g"));
    }

    #[test]
    fn test_read_new_entries_then_ack() {
        let mut stream = stream_with(3);
        stream.create_group("g", StreamId::min()).unwrap();

        let got = stream
            .read_group("g", "alice", GroupReadStart::NewEntries, Some(2), false, 100)
            .unwrap();
        assert_eq!(got.len(), 2);
        let group = stream.group("g").unwrap();
        assert_eq!(group.last_delivered_id, StreamId::new(2, 0));
        assert_eq!(group.pending_count(), 2);

        let got = stream
            .read_group("g", "bob", GroupReadStart::NewEntries, None, false, 100)
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, StreamId::new(3, 0));

        let group = stream.group_mut("g").unwrap();
        assert_eq!(group.ack(&[StreamId::new(1, 0), StreamId::new(9, 0)]), 1);
        let summary = group.pending_summary();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.min_id, Some(StreamId::new(2, 0)));
        assert_eq!(summary.consumers, vec![("alice".to_string(), 1), ("bob".to_string(), 1)]);
    }

    #[test]
    fn test_history_read_and_noack() {
        let mut stream = stream_with(2);
        stream.create_group("g", StreamId::min()).unwrap();
        stream
            .read_group("g", "c", GroupReadStart::NewEntries, Some(1), false, 10)
            .unwrap();
        stream
            .read_group("g", "c", GroupReadStart::NewEntries, None, true, 10)
            .unwrap();

        let history = stream
            .read_group("g", "c", GroupReadStart::History(StreamId::min()), None, false, 20)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, StreamId::new(1, 0));
        let entry = stream.group("g").unwrap().pending_entry(&StreamId::new(1, 0)).unwrap();
        assert_eq!(entry.delivery_count, 2);
    }

    #[test]
    fn test_claim_moves_ownership_and_drops_deleted() {
        let mut stream = stream_with(2);
        stream.create_group("g", StreamId::min()).unwrap();
        stream
            .read_group("g", "alice", GroupReadStart::NewEntries, None, false, 0)
            .unwrap();
        stream.delete(&[StreamId::new(2, 0)]);

        let ids = [StreamId::new(1, 0), StreamId::new(2, 0)];
        let claimed = stream
            .claim("g", "bob", 50, &ids, &ClaimOptions::default(), 100)
            .unwrap();
        assert_eq!(claimed.len(), 1);

        let group = stream.group("g").unwrap();
        assert_eq!(group.pending_count(), 1);
        let entry = group.pending_entry(&StreamId::new(1, 0)).unwrap();
        assert_eq!(entry.consumer, "bob");
        assert_eq!(entry.delivery_count, 2);

        // Not idle long enough
        let claimed = stream
            .claim("g", "carol", 50, &ids[..1], &ClaimOptions::default(), 120)
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[test]
    fn test_delete_consumer_returns_pending() {
        let mut stream = stream_with(3);
        stream.create_group("g", StreamId::min()).unwrap();
        stream
            .read_group("g", "c", GroupReadStart::NewEntries, None, false, 0)
            .unwrap();
        let group = stream.group_mut("g").unwrap();
        assert_eq!(group.delete_consumer("c"), 3);
        assert_eq!(group.pending_count(), 0);
        assert_eq!(group.delete_consumer("c"), 0);
    }

    #[test]
    fn test_pending_range_filters() {
        let mut stream = stream_with(4);
        stream.create_group("g", StreamId::min()).unwrap();
        stream
            .read_group("g", "a", GroupReadStart::NewEntries, Some(2), false, 0)
            .unwrap();
        stream
            .read_group("g", "b", GroupReadStart::NewEntries, None, false, 50)
            .unwrap();
        let group = stream.group("g").unwrap();

        let query = PendingQuery { count: 10, consumer: Some("b".into()), ..Default::default() };
        let rows = group.pending_range(&query, 100);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.consumer == "b" && r.idle_ms == 50));

        let query = PendingQuery { count: 10, min_idle_ms: Some(80), ..Default::default() };
        assert_eq!(group.pending_range(&query, 100).len(), 2);
    }
}
