use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use waifu_types::models::{ChannelId, PendingDrop};

/// Holds at most one unclaimed drop per channel.
///
/// Each channel slot moves `Empty -> Pending -> Empty`. Publishing over a
/// pending drop replaces it, and claiming removes it in one map operation, so
/// of any number of racing claims exactly one gets the character.
#[derive(Default)]
pub struct ClaimArbiter {
    pending: DashMap<ChannelId, PendingDrop>,
}

impl ClaimArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `drop` the channel's claimable drop. Returns the unclaimed drop it
    /// superseded, if any.
    pub fn publish(&self, drop: PendingDrop) -> Option<PendingDrop> {
        self.pending.insert(drop.channel_id, drop)
    }

    /// Take the channel's pending drop, leaving the slot empty.
    pub fn claim(&self, channel_id: ChannelId) -> Option<PendingDrop> {
        self.pending.remove(&channel_id).map(|(_, drop)| drop)
    }

    /// Put back a drop whose claim could not be completed. A drop published
    /// in the meantime wins and `drop` is discarded.
    pub fn restore(&self, drop: PendingDrop) -> bool {
        match self.pending.entry(drop.channel_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(drop);
                true
            }
        }
    }

    pub fn peek(&self, channel_id: ChannelId) -> Option<PendingDrop> {
        self.pending.get(&channel_id).map(|d| d.clone())
    }
}
