use std::collections::HashMap;

use serde::Serialize;
use shopsync_common::ChannelId;
use tracing::trace;

/// Every way a [`CounterStore`] can change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterAction {
    Set { channel_id: ChannelId, count: u32 },
    Increment { channel_id: ChannelId, by: u32 },
    Decrement { channel_id: ChannelId, by: u32 },
    Clear { channel_id: ChannelId },
    BulkSet(Vec<(ChannelId, u32)>),
    Remove { channel_id: ChannelId },
    ResetAll,
}

/// Unread counts per channel plus their sum.
///
/// `set_count` and `bulk_set` recompute the total from the whole map; the
/// single-channel operations adjust it by the same delta they apply to the
/// entry. Both paths always agree with [`recount`](Self::recount).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterStore {
    counts: HashMap<ChannelId, u32>,
    total: u64,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unread count of one channel; unknown channels read as zero.
    pub fn count(&self, channel_id: &ChannelId) -> u32 {
        self.counts.get(channel_id).copied().unwrap_or(0)
    }

    /// Sum of all unread counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Total recomputed from scratch, for consistency checks.
    pub fn recount(&self) -> u64 {
        self.counts.values().map(|&n| u64::from(n)).sum()
    }

    pub fn contains(&self, channel_id: &ChannelId) -> bool {
        self.counts.contains_key(channel_id)
    }

    pub fn counts(&self) -> impl Iterator<Item = (&ChannelId, u32)> {
        self.counts.iter().map(|(id, &n)| (id, n))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn apply(&mut self, action: CounterAction) {
        match action {
            CounterAction::Set { channel_id, count } => self.set_count(channel_id, count),
            CounterAction::Increment { channel_id, by } => self.increment(channel_id, by),
            CounterAction::Decrement { channel_id, by } => self.decrement(&channel_id, by),
            CounterAction::Clear { channel_id } => self.clear(&channel_id),
            CounterAction::BulkSet(entries) => self.bulk_set(entries),
            CounterAction::Remove { channel_id } => self.remove(&channel_id),
            CounterAction::ResetAll => self.reset_all(),
        }
    }

    pub fn set_count(&mut self, channel_id: ChannelId, count: u32) {
        self.counts.insert(channel_id, count);
        self.total = self.recount();
    }

    pub fn increment(&mut self, channel_id: ChannelId, by: u32) {
        let entry = self.counts.entry(channel_id).or_insert(0);
        let next = entry.saturating_add(by);
        self.total += u64::from(next - *entry);
        *entry = next;
    }

    /// Lower a count, stopping at zero.
    pub fn decrement(&mut self, channel_id: &ChannelId, by: u32) {
        let Some(entry) = self.counts.get_mut(channel_id) else {
            return;
        };
        let applied = by.min(*entry);
        *entry -= applied;
        self.total -= u64::from(applied);
    }

    /// Mark a channel as fully read.
    pub fn clear(&mut self, channel_id: &ChannelId) {
        if let Some(entry) = self.counts.get_mut(channel_id) {
            self.total -= u64::from(*entry);
            *entry = 0;
        }
    }

    /// Overwrite the listed channels; channels not listed keep their count.
    pub fn bulk_set(&mut self, entries: impl IntoIterator<Item = (ChannelId, u32)>) {
        for (channel_id, count) in entries {
            trace!("bulk set {} = {}", channel_id, count);
            self.counts.insert(channel_id, count);
        }
        self.total = self.recount();
    }

    /// Forget a channel entirely.
    pub fn remove(&mut self, channel_id: &ChannelId) {
        if let Some(last) = self.counts.remove(channel_id) {
            self.total -= u64::from(last);
        }
    }

    pub fn reset_all(&mut self) {
        self.counts.clear();
        self.total = 0;
    }
}
