//! Tombstone tracking.
//!
//! Deletions propagate through sync as tombstones: plain records naming the
//! deleted message and where it lived. The log is append-only and
//! per-process; the host reloads it at startup and persists it however it
//! likes. Readers always receive copies.

use std::sync::Mutex;
use std::time::Duration;

use grapevine_core::{ChannelId, MessageId, SpaceId, Timestamp, Tombstone};

/// Default horizon for `cleanup`: 30 days.
pub const DEFAULT_TOMBSTONE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Append-only per-process tombstone log.
#[derive(Default)]
pub struct TombstoneLog {
    entries: Mutex<Vec<Tombstone>>,
}

impl TombstoneLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log from host-persisted tombstones.
    pub fn preload(&self, tombstones: Vec<Tombstone>) {
        let mut entries = self.entries.lock().unwrap();
        entries.extend(tombstones);
    }

    /// Record a deletion. Duplicate `{message, space, channel}` records are
    /// collapsed.
    pub fn record(&self, tombstone: Tombstone) {
        let mut entries = self.entries.lock().unwrap();
        let exists = entries.iter().any(|t| {
            t.message_id == tombstone.message_id
                && t.space_id == tombstone.space_id
                && t.channel_id == tombstone.channel_id
        });
        if !exists {
            entries.push(tombstone);
        }
    }

    /// Deleted message ids for one channel, in recording order.
    pub fn deleted_ids(&self, space_id: &SpaceId, channel_id: &ChannelId) -> Vec<MessageId> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|t| &t.space_id == space_id && &t.channel_id == channel_id)
            .map(|t| t.message_id.clone())
            .collect()
    }

    /// A copy of every tombstone, for host persistence.
    pub fn all(&self) -> Vec<Tombstone> {
        self.entries.lock().unwrap().clone()
    }

    /// Drop tombstones older than `max_age` relative to `now`. Returns how
    /// many were removed.
    pub fn cleanup(&self, now: Timestamp, max_age: Duration) -> usize {
        let horizon = now.saturating_sub(max_age.as_millis() as Timestamp);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|t| t.deleted_at >= horizon);
        before - entries.len()
    }
}
