use serde::{Deserialize, Serialize};

/// What to do with a mutation response when newer requests were issued for
/// the same collection while it was in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Only the response to the most recently issued request may replace the
    /// store; older responses are dropped.
    #[default]
    LatestRequestOnly,
    /// Every completed response replaces the store, so a slow stale response
    /// can overwrite newer local edits.
    LastResponseWins,
}

/// How counter pushes relate to the initial bulk seed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedOrdering {
    /// Counter events received before the seed lands are queued and replayed
    /// on top of it.
    #[default]
    BufferUntilSeeded,
    /// Counter events are applied as they arrive; the seed's bulk set then
    /// overwrites whatever they did to the seeded channels.
    Immediate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub reconcile: ReconcilePolicy,
    pub seed_ordering: SeedOrdering,
    /// Capacity of the outbound intent queue behind [`RealtimeHandle`](crate::RealtimeHandle).
    pub intent_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconcile: ReconcilePolicy::default(),
            seed_ordering: SeedOrdering::default(),
            intent_capacity: 64,
        }
    }
}
