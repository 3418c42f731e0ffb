//! Diff computation between local and remote state.
//!
//! Diffs are pure comparisons over digest sets. The message diff implements
//! the newest-modified-wins rule: a message both sides hold with differing
//! content hashes is only flagged when the other side's copy is strictly
//! newer; otherwise we keep ours and the other side flags it reciprocally
//! when it diffs against our manifest.

use std::collections::{HashMap, HashSet};

use grapevine_core::{Address, Manifest, MemberDigest, MessageDigest, MessageId, PeerId};

/// Result of comparing two message manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDiff {
    /// Ids present in theirs, absent in ours.
    pub missing_ids: Vec<MessageId>,
    /// Ids in both whose content hashes differ, where their copy is newer.
    pub outdated_ids: Vec<MessageId>,
    /// Ids present in ours, absent in theirs.
    pub extra_ids: Vec<MessageId>,
}

impl MessageDiff {
    /// True when the manifests describe identical message sets.
    pub fn is_empty(&self) -> bool {
        self.missing_ids.is_empty() && self.outdated_ids.is_empty() && self.extra_ids.is_empty()
    }
}

/// Result of comparing two member digest sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberDiff {
    /// Addresses present in theirs, absent in ours.
    pub missing_addresses: Vec<Address>,
    /// Addresses in both whose display name or icon hash differs.
    pub outdated_addresses: Vec<Address>,
    /// Addresses present in ours, absent in theirs.
    pub extra_addresses: Vec<Address>,
}

impl MemberDiff {
    /// True when both sides hold identical member digests.
    pub fn is_empty(&self) -> bool {
        self.missing_addresses.is_empty()
            && self.outdated_addresses.is_empty()
            && self.extra_addresses.is_empty()
    }
}

/// Compare two manifests.
///
/// Iteration follows each manifest's digest order (created date ascending),
/// so the returned id lists are deterministic.
pub fn compute_message_diff(ours: &Manifest, theirs: &Manifest) -> MessageDiff {
    let our_digests: HashMap<&MessageId, &MessageDigest> =
        ours.digests.iter().map(|d| (&d.message_id, d)).collect();
    let their_digests: HashMap<&MessageId, &MessageDigest> =
        theirs.digests.iter().map(|d| (&d.message_id, d)).collect();

    let mut diff = MessageDiff::default();

    for their in &theirs.digests {
        match our_digests.get(&their.message_id) {
            None => diff.missing_ids.push(their.message_id.clone()),
            Some(our) if our.content_hash != their.content_hash => {
                // Newest-modified wins: only their strictly newer copy
                // counts as outdating ours.
                if their.effective_date() > our.effective_date() {
                    diff.outdated_ids.push(their.message_id.clone());
                }
            }
            Some(_) => {}
        }
    }

    for our in &ours.digests {
        if !their_digests.contains_key(&our.message_id) {
            diff.extra_ids.push(our.message_id.clone());
        }
    }

    diff
}

/// Compare two member digest sets by address.
///
/// A member in both sets is outdated when either the display name hash or
/// the icon hash differs. There is no newest rule for members: during sync
/// the local record always wins locally.
pub fn compute_member_diff(ours: &[MemberDigest], theirs: &[MemberDigest]) -> MemberDiff {
    let our_map: HashMap<&Address, &MemberDigest> =
        ours.iter().map(|d| (&d.address, d)).collect();
    let their_map: HashMap<&Address, &MemberDigest> =
        theirs.iter().map(|d| (&d.address, d)).collect();

    let mut diff = MemberDiff::default();

    for their in theirs {
        match our_map.get(&their.address) {
            None => diff.missing_addresses.push(their.address.clone()),
            Some(our)
                if our.display_name_hash != their.display_name_hash
                    || our.icon_hash != their.icon_hash =>
            {
                diff.outdated_addresses.push(their.address.clone());
            }
            Some(_) => {}
        }
    }

    for our in ours {
        if !their_map.contains_key(&our.address) {
            diff.extra_addresses.push(our.address.clone());
        }
    }

    diff
}

/// Peer ids we hold that the remote does not: plain set difference.
pub fn compute_peer_diff(ours: &[PeerId], theirs: &[PeerId]) -> Vec<PeerId> {
    let their_set: HashSet<&PeerId> = theirs.iter().collect();
    let mut missing: Vec<PeerId> = ours
        .iter()
        .filter(|id| !their_set.contains(id))
        .copied()
        .collect();
    missing.sort_unstable();
    missing
}
