//! Per-channel drop trigger.
//!
//! Every qualifying message in a channel draws a random number against a
//! shrinking modulus. With `c` messages already seen since the last drop and a
//! threshold `T`, the message triggers a drop with probability `1 / (T - c)`,
//! so the `T`-th message after a drop always triggers one while the exact
//! moment stays unpredictable.

use std::num::NonZeroU64;

use dashmap::DashMap;
use rand::RngCore;

use waifu_types::models::ChannelId;

/// Decide whether a message triggers a drop.
///
/// `seen` is the number of qualifying messages since the last drop, not
/// counting this one, and is always below `threshold`.
pub fn should_drop(seen: u64, threshold: u64, draw: u64) -> bool {
    debug_assert!(seen < threshold);
    let remaining = threshold - seen;
    draw % remaining == 0 || seen + 1 == threshold
}

pub struct DropScheduler {
    threshold: NonZeroU64,
    counters: DashMap<ChannelId, u64>,
}

impl DropScheduler {
    pub fn new(threshold: NonZeroU64) -> Self {
        Self {
            threshold,
            counters: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold.get()
    }

    /// Count one qualifying message in `channel_id` and report whether it
    /// triggers a drop. On trigger the counter goes back to zero.
    ///
    /// Read, draw, decide and reset-or-increment all happen under the
    /// channel's map entry lock; other channels are not blocked.
    pub fn observe<R: RngCore + ?Sized>(&self, channel_id: ChannelId, rng: &mut R) -> bool {
        let mut counter = self.counters.entry(channel_id).or_insert(0);

        let fire = should_drop(*counter, self.threshold.get(), rng.next_u64());
        *counter = if fire { 0 } else { *counter + 1 };

        fire
    }

    /// Messages counted in `channel_id` since its last drop.
    pub fn count(&self, channel_id: ChannelId) -> u64 {
        self.counters.get(&channel_id).map_or(0, |c| *c)
    }
}
