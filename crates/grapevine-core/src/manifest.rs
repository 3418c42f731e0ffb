//! Manifests and summaries: per-channel state descriptions.
//!
//! A [`Summary`] is the cheap advertisement (counts, boundary timestamps,
//! manifest hash) used in `sync-request`/`sync-info`. A [`Manifest`] is the
//! full digest listing used in `sync-initiate`/`sync-manifest` to drive the
//! diff.

use serde::{Deserialize, Serialize};

use crate::canonical::id_hash;
use crate::digest::{MessageDigest, ReactionDigest};
use crate::hash::ManifestHash;
use crate::types::{ChannelId, SpaceId, Timestamp};

/// Ordered digest listing for one channel at a point in time.
///
/// `digests` are sorted by `created_date` ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub space_id: SpaceId,
    pub channel_id: ChannelId,
    pub message_count: u32,
    pub oldest_timestamp: Timestamp,
    pub newest_timestamp: Timestamp,
    pub digests: Vec<MessageDigest>,
    pub reaction_digests: Vec<ReactionDigest>,
}

/// Compact channel advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub message_count: u32,
    pub member_count: u32,
    pub oldest_message_timestamp: Timestamp,
    pub newest_message_timestamp: Timestamp,
    /// 64 hex chars: the 32-byte XOR accumulator over message id hashes.
    pub manifest_hash: String,
}

/// Compute the set-valued manifest hash directly from a digest list.
///
/// Used when a summary is built from a freshly loaded message list rather
/// than an incrementally maintained accumulator. XOR commutes, so the result
/// is independent of digest order and equal to the accumulator for the same
/// id set.
pub fn manifest_hash_of_digests(digests: &[MessageDigest]) -> ManifestHash {
    let mut acc = ManifestHash::EMPTY;
    for digest in digests {
        acc.toggle(&id_hash(&digest.message_id));
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;

    fn digest(id: &str, created: Timestamp) -> MessageDigest {
        MessageDigest {
            message_id: MessageId::from(id),
            created_date: created,
            content_hash: String::new(),
            modified_date: None,
        }
    }

    #[test]
    fn test_hash_of_digests_matches_accumulator() {
        let digests = vec![digest("m1", 1000), digest("m2", 2000)];

        let mut acc = ManifestHash::EMPTY;
        acc.toggle(&id_hash(&MessageId::from("m1")));
        acc.toggle(&id_hash(&MessageId::from("m2")));

        assert_eq!(manifest_hash_of_digests(&digests), acc);
    }

    #[test]
    fn test_hash_of_digests_order_independent() {
        let fwd = vec![digest("m1", 1000), digest("m2", 2000), digest("m3", 3000)];
        let rev: Vec<_> = fwd.iter().rev().cloned().collect();
        assert_eq!(
            manifest_hash_of_digests(&fwd).to_hex(),
            manifest_hash_of_digests(&rev).to_hex()
        );
    }

    #[test]
    fn test_empty_digest_list_hashes_to_zero() {
        assert_eq!(manifest_hash_of_digests(&[]).to_hex(), "0".repeat(64));
    }
}
