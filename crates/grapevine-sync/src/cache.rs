//! The per-channel payload cache.
//!
//! For every `(space, channel)` pair the cache holds an in-memory snapshot:
//! message and member maps, their digest maps, the boundary timestamps, and
//! a 32-byte XOR accumulator over message id hashes. Snapshots are built
//! lazily from storage and then maintained incrementally in O(1) by the
//! host's update hooks.
//!
//! The cache exclusively owns its maps and its accumulator: everything
//! returned to callers is a defensive copy.
//!
//! Invariants maintained here:
//! - the digest maps always key exactly the entity maps;
//! - the accumulator equals the XOR of `id_hash(id)` over the message map;
//! - the boundary timestamps are the min/max created date, or both 0 when
//!   the channel is empty.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use grapevine_core::{
    build_member_digest, build_message_digest, build_reaction_digests, id_hash, Address,
    ChannelId, CoreError, Manifest, ManifestHash, Member, MemberDigest, Message, MessageDigest,
    MessageId, SpaceId, Summary, Timestamp,
};
use grapevine_store::{MessageQuery, Storage};

use crate::error::Result;

type CacheKey = (SpaceId, ChannelId);

/// One channel's snapshot.
struct ChannelCache {
    message_map: HashMap<MessageId, Message>,
    digest_map: HashMap<MessageId, MessageDigest>,
    member_map: HashMap<Address, Member>,
    member_digest_map: HashMap<Address, MemberDigest>,
    oldest_timestamp: Timestamp,
    newest_timestamp: Timestamp,
    manifest_hash: ManifestHash,
}

impl ChannelCache {
    fn build(messages: Vec<Message>, members: Vec<Member>) -> std::result::Result<Self, CoreError> {
        let mut cache = Self {
            message_map: HashMap::with_capacity(messages.len()),
            digest_map: HashMap::with_capacity(messages.len()),
            member_map: HashMap::with_capacity(members.len()),
            member_digest_map: HashMap::with_capacity(members.len()),
            oldest_timestamp: 0,
            newest_timestamp: 0,
            manifest_hash: ManifestHash::EMPTY,
        };
        for message in messages {
            cache.upsert_message(message)?;
        }
        for member in members {
            cache.upsert_member(member);
        }
        Ok(cache)
    }

    fn upsert_message(&mut self, message: Message) -> std::result::Result<(), CoreError> {
        let digest = build_message_digest(&message)?;
        let id = message.message_id.clone();

        if !self.message_map.contains_key(&id) {
            self.manifest_hash.toggle(&id_hash(&id));
        }
        if self.message_map.is_empty() {
            self.oldest_timestamp = message.created_date;
            self.newest_timestamp = message.created_date;
        } else {
            self.oldest_timestamp = self.oldest_timestamp.min(message.created_date);
            self.newest_timestamp = self.newest_timestamp.max(message.created_date);
        }

        self.message_map.insert(id.clone(), message);
        self.digest_map.insert(id, digest);
        Ok(())
    }

    fn remove_message(&mut self, message_id: &MessageId) {
        let Some(removed) = self.message_map.remove(message_id) else {
            return;
        };
        self.digest_map.remove(message_id);
        self.manifest_hash.toggle(&id_hash(message_id));

        // O(n) boundary recomputation only when a boundary message left.
        if removed.created_date == self.oldest_timestamp
            || removed.created_date == self.newest_timestamp
        {
            self.recompute_boundaries();
        }
    }

    fn recompute_boundaries(&mut self) {
        if self.message_map.is_empty() {
            self.oldest_timestamp = 0;
            self.newest_timestamp = 0;
            return;
        }
        let mut oldest = Timestamp::MAX;
        let mut newest = Timestamp::MIN;
        for message in self.message_map.values() {
            oldest = oldest.min(message.created_date);
            newest = newest.max(message.created_date);
        }
        self.oldest_timestamp = oldest;
        self.newest_timestamp = newest;
    }

    fn upsert_member(&mut self, member: Member) {
        let digest = build_member_digest(&member);
        let address = member.address.clone();
        self.member_map.insert(address.clone(), member);
        self.member_digest_map.insert(address, digest);
    }

    fn summary(&self) -> Summary {
        Summary {
            message_count: self.message_map.len() as u32,
            member_count: self.member_map.len() as u32,
            oldest_message_timestamp: self.oldest_timestamp,
            newest_message_timestamp: self.newest_timestamp,
            manifest_hash: self.manifest_hash.to_hex(),
        }
    }

    fn sorted_digests(&self) -> Vec<MessageDigest> {
        let mut digests: Vec<MessageDigest> = self.digest_map.values().cloned().collect();
        digests.sort_by(|a, b| {
            (a.created_date, &a.message_id).cmp(&(b.created_date, &b.message_id))
        });
        digests
    }

    fn manifest(&self, space_id: &SpaceId, channel_id: &ChannelId) -> Manifest {
        let digests = self.sorted_digests();
        let reaction_digests = digests
            .iter()
            .filter_map(|d| self.message_map.get(&d.message_id))
            .flat_map(|m| build_reaction_digests(&m.message_id, &m.reactions))
            .collect();

        Manifest {
            space_id: space_id.clone(),
            channel_id: channel_id.clone(),
            message_count: self.message_map.len() as u32,
            oldest_timestamp: self.oldest_timestamp,
            newest_timestamp: self.newest_timestamp,
            digests,
            reaction_digests,
        }
    }
}

/// The payload cache: lazily built per-channel snapshots.
pub struct PayloadCache<S> {
    store: Arc<S>,
    max_messages: usize,
    entries: RwLock<HashMap<CacheKey, ChannelCache>>,
}

impl<S: Storage> PayloadCache<S> {
    /// Create a cache over the given storage. `max_messages` caps how many
    /// messages one channel snapshot loads.
    pub fn new(store: Arc<S>, max_messages: usize) -> Self {
        Self {
            store,
            max_messages,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Ensure the `(space, channel)` snapshot exists, loading it from
    /// storage when absent. This is the only suspending cache operation.
    pub async fn load(&self, space_id: &SpaceId, channel_id: &ChannelId) -> Result<()> {
        let key = (space_id.clone(), channel_id.clone());
        if self.entries.read().unwrap().contains_key(&key) {
            return Ok(());
        }

        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        while messages.len() < self.max_messages {
            let mut query = MessageQuery::new(
                space_id.clone(),
                channel_id.clone(),
                self.max_messages - messages.len(),
            );
            if let Some(c) = cursor.take() {
                query = query.after(c);
            }
            let page = self.store.get_messages(query).await?;
            messages.extend(page.messages);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        let members = self.store.get_space_members(space_id).await?;

        let cache = ChannelCache::build(messages, members).map_err(crate::error::SyncError::from)?;
        self.entries.write().unwrap().insert(key, cache);
        Ok(())
    }

    /// Drop one channel's snapshot.
    pub fn invalidate(&self, space_id: &SpaceId, channel_id: &ChannelId) {
        self.entries
            .write()
            .unwrap()
            .remove(&(space_id.clone(), channel_id.clone()));
    }

    /// Drop every snapshot belonging to a space.
    pub fn invalidate_space(&self, space_id: &SpaceId) {
        self.entries
            .write()
            .unwrap()
            .retain(|(space, _), _| space != space_id);
    }

    /// Whether a snapshot currently exists.
    pub fn is_loaded(&self, space_id: &SpaceId, channel_id: &ChannelId) -> bool {
        self.entries
            .read()
            .unwrap()
            .contains_key(&(space_id.clone(), channel_id.clone()))
    }

    /// Insert or replace a message in an existing snapshot. O(1).
    ///
    /// A miss (snapshot not loaded) is a no-op: the next `load` rebuilds the
    /// snapshot from storage, which is already authoritative.
    pub fn upsert_message(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        message: Message,
    ) -> Result<()> {
        let key = (space_id.clone(), channel_id.clone());
        let mut entries = self.entries.write().unwrap();
        if let Some(cache) = entries.get_mut(&key) {
            cache
                .upsert_message(message)
                .map_err(crate::error::SyncError::from)?;
        }
        Ok(())
    }

    /// Remove a message from an existing snapshot. O(1) unless the message
    /// sat on a timestamp boundary, in which case boundaries are recomputed
    /// in O(n).
    pub fn remove_message(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) {
        let key = (space_id.clone(), channel_id.clone());
        let mut entries = self.entries.write().unwrap();
        if let Some(cache) = entries.get_mut(&key) {
            cache.remove_message(message_id);
        }
    }

    /// Insert or replace a member in an existing snapshot. O(1).
    pub fn upsert_member(&self, space_id: &SpaceId, channel_id: &ChannelId, member: Member) {
        let key = (space_id.clone(), channel_id.clone());
        let mut entries = self.entries.write().unwrap();
        if let Some(cache) = entries.get_mut(&key) {
            cache.upsert_member(member);
        }
    }

    /// O(1) summary of a loaded snapshot.
    pub fn summary(&self, space_id: &SpaceId, channel_id: &ChannelId) -> Option<Summary> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&(space_id.clone(), channel_id.clone()))
            .map(ChannelCache::summary)
    }

    /// Full manifest of a loaded snapshot: O(n log n) for the digest sort.
    pub fn manifest(&self, space_id: &SpaceId, channel_id: &ChannelId) -> Option<Manifest> {
        let entries = self.entries.read().unwrap();
        entries
            .get(&(space_id.clone(), channel_id.clone()))
            .map(|c| c.manifest(space_id, channel_id))
    }

    /// Member digests of a loaded snapshot. O(m).
    pub fn member_digests(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
    ) -> Option<Vec<MemberDigest>> {
        let entries = self.entries.read().unwrap();
        entries.get(&(space_id.clone(), channel_id.clone())).map(|c| {
            let mut digests: Vec<MemberDigest> = c.member_digest_map.values().cloned().collect();
            digests.sort_by(|a, b| a.address.cmp(&b.address));
            digests
        })
    }

    /// Copies of the named messages, ordered by `(created_date, id)`.
    pub fn messages_by_ids(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        ids: &HashSet<MessageId>,
    ) -> Option<Vec<Message>> {
        let entries = self.entries.read().unwrap();
        entries.get(&(space_id.clone(), channel_id.clone())).map(|c| {
            let mut messages: Vec<Message> = c
                .message_map
                .values()
                .filter(|m| ids.contains(&m.message_id))
                .cloned()
                .collect();
            messages.sort_by(|a, b| {
                (a.created_date, &a.message_id).cmp(&(b.created_date, &b.message_id))
            });
            messages
        })
    }

    /// Copies of the named members, ordered by address.
    pub fn members_by_addresses(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        addresses: &HashSet<Address>,
    ) -> Option<Vec<Member>> {
        let entries = self.entries.read().unwrap();
        entries.get(&(space_id.clone(), channel_id.clone())).map(|c| {
            let mut members: Vec<Member> = c
                .member_map
                .values()
                .filter(|m| addresses.contains(&m.address))
                .cloned()
                .collect();
            members.sort_by(|a, b| a.address.cmp(&b.address));
            members
        })
    }
}
