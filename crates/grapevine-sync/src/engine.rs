//! The protocol orchestrator.
//!
//! [`SyncEngine`] ties the components together: it builds each of the five
//! control payloads from the payload cache and session state, and applies
//! received deltas through storage. Inbound deltas never touch the payload
//! cache; the host invalidates or incrementally updates it after its own
//! writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use grapevine_core::{
    Address, ChannelId, InboxAddress, Manifest, Member, MemberDigest, Message, MessageId, PeerId,
    SpaceId, Summary, Tombstone,
};
use grapevine_store::Storage;

use crate::cache::PayloadCache;
use crate::delta::{assemble_delta_payloads, DeltaParts, DEFAULT_MAX_CHUNK_SIZE};
use crate::diff::{compute_member_diff, compute_message_diff, compute_peer_diff};
use crate::error::{Result, SyncError};
use crate::messages::{
    MemberDelta, MessageDelta, PeerEntry, PeerMapDelta, ReactionDelta, ReactionEntry, SyncDelta,
    SyncInfo, SyncInitiate, SyncManifest, SyncRequest,
};
use crate::session::{now_millis, InitiateSyncHook, SessionConfig, SessionManager, SyncCandidate};
use crate::tombstone::{TombstoneLog, DEFAULT_TOMBSTONE_MAX_AGE};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cap on messages loaded per `(space, channel)` snapshot.
    pub max_messages: usize,
    /// Candidate collection window after a `sync-request`.
    pub request_expiry: Duration,
    /// Wait after the first candidate before selecting.
    pub aggressive_sync_timeout: Duration,
    /// Byte cap per serialized delta chunk.
    pub max_chunk_size: usize,
    /// Horizon for `cleanup_tombstones`.
    pub tombstone_max_age: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_messages: 1000,
            request_expiry: Duration::from_secs(30),
            aggressive_sync_timeout: Duration::from_secs(1),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            tombstone_max_age: DEFAULT_TOMBSTONE_MAX_AGE,
        }
    }
}

/// What applying one `sync-delta` produced.
#[derive(Debug, Clone, Default)]
pub struct AppliedDelta {
    /// Peer-map entries for the encryption layer; opaque to the core.
    pub peer_map_delta: Option<PeerMapDelta>,
    /// Whether this payload closed the transfer (and its session).
    pub is_final: bool,
}

/// The delta-sync engine for one client.
pub struct SyncEngine<S> {
    store: Arc<S>,
    cache: PayloadCache<S>,
    sessions: SessionManager,
    tombstones: TombstoneLog,
    config: SyncConfig,
}

impl<S: Storage> SyncEngine<S> {
    /// Create an engine over the given storage.
    pub fn new(store: Arc<S>, config: SyncConfig, on_initiate: Option<InitiateSyncHook>) -> Self {
        let cache = PayloadCache::new(Arc::clone(&store), config.max_messages);
        let sessions = SessionManager::new(
            SessionConfig {
                request_expiry: config.request_expiry,
                aggressive_timeout: config.aggressive_sync_timeout,
            },
            on_initiate,
        );
        Self {
            store,
            cache,
            sessions,
            tombstones: TombstoneLog::new(),
            config,
        }
    }

    /// The storage backend this engine writes through.
    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Outbound: the five control payloads
    // ─────────────────────────────────────────────────────────────────────────

    /// Step 1: open a session and build the broadcast `sync-request`.
    pub async fn build_sync_request(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        our_inbox: &InboxAddress,
    ) -> Result<SyncRequest> {
        let summary = self.channel_summary(space_id, channel_id).await?;
        let expiry = self.sessions.open(space_id);
        Ok(SyncRequest {
            inbox_address: our_inbox.clone(),
            expiry,
            summary,
        })
    }

    /// Step 2: answer a peer's `sync-request`.
    ///
    /// Returns `None` when we have nothing at all, or nothing the requester
    /// seems to lack: silence means "cannot help".
    pub async fn build_sync_info(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        our_inbox: &InboxAddress,
        their_summary: &Summary,
    ) -> Result<Option<SyncInfo>> {
        let ours = self.channel_summary(space_id, channel_id).await?;

        if ours.message_count == 0 && ours.member_count == 0 {
            return Ok(None);
        }
        if ours.manifest_hash == their_summary.manifest_hash
            && ours.member_count == their_summary.member_count
        {
            return Ok(None);
        }

        let more_messages = ours.message_count > their_summary.message_count;
        let more_members = ours.member_count > their_summary.member_count;
        let newer_messages =
            ours.newest_message_timestamp > their_summary.newest_message_timestamp;
        let older_messages = ours.oldest_message_timestamp != 0
            && (their_summary.oldest_message_timestamp == 0
                || ours.oldest_message_timestamp < their_summary.oldest_message_timestamp);
        let different_hash = ours.manifest_hash != their_summary.manifest_hash;

        if more_messages || more_members || newer_messages || older_messages || different_hash {
            Ok(Some(SyncInfo {
                inbox_address: our_inbox.clone(),
                summary: ours,
            }))
        } else {
            Ok(None)
        }
    }

    /// Record a `sync-info` reply against our open session.
    pub fn add_candidate(&self, space_id: &SpaceId, candidate: SyncCandidate) -> bool {
        self.sessions.add_candidate(space_id, candidate)
    }

    /// Step 3: pick the best candidate and build the `sync-initiate`.
    ///
    /// With no candidates the session is deleted and `None` returned.
    pub async fn build_sync_initiate(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        our_inbox: &InboxAddress,
        our_peer_ids: Vec<PeerId>,
    ) -> Result<Option<(SyncCandidate, SyncInitiate)>> {
        let Some(target) = self.sessions.begin_sync(space_id) else {
            return Ok(None);
        };

        self.cache.load(space_id, channel_id).await?;
        let manifest = self.channel_manifest(space_id, channel_id)?;
        let member_digests = self.channel_member_digests(space_id, channel_id)?;

        let payload = SyncInitiate {
            inbox_address: our_inbox.clone(),
            manifest: Some(manifest),
            member_digests: Some(member_digests),
            peer_ids: Some(our_peer_ids),
        };
        Ok(Some((target, payload)))
    }

    /// Step 4: answer a `sync-initiate` with our full manifest.
    pub async fn build_sync_manifest(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        our_peer_ids: Vec<PeerId>,
        our_inbox: &InboxAddress,
    ) -> Result<SyncManifest> {
        self.cache.load(space_id, channel_id).await?;
        Ok(SyncManifest {
            inbox_address: our_inbox.clone(),
            manifest: self.channel_manifest(space_id, channel_id)?,
            member_digests: self.channel_member_digests(space_id, channel_id)?,
            peer_ids: our_peer_ids,
        })
    }

    /// Step 5: build the chunked delta sequence for a peer whose manifest we
    /// received.
    ///
    /// The diff is evaluated from the remote's standpoint: what it lacks
    /// becomes `new_messages`, what it holds an older copy of becomes
    /// `updated_messages`. A message both sides hold where the remote's copy
    /// is newer is left alone; the remote pushes its copy reciprocally.
    pub async fn build_sync_delta(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        their_manifest: &Manifest,
        their_member_digests: &[MemberDigest],
        their_peer_ids: &[PeerId],
        our_peer_entries: &[PeerEntry],
    ) -> Result<Vec<SyncDelta>> {
        self.cache.load(space_id, channel_id).await?;
        let our_manifest = self.channel_manifest(space_id, channel_id)?;

        let diff = compute_message_diff(their_manifest, &our_manifest);
        let new_messages =
            self.materialize_messages(space_id, channel_id, &diff.missing_ids)?;
        let updated_messages =
            self.materialize_messages(space_id, channel_id, &diff.outdated_ids)?;

        let reaction_delta =
            self.build_reaction_delta(space_id, channel_id, &our_manifest, their_manifest)?;

        let our_member_digests = self.channel_member_digests(space_id, channel_id)?;
        let member_diff = compute_member_diff(their_member_digests, &our_member_digests);
        let mut wanted_addresses: HashSet<Address> =
            member_diff.missing_addresses.iter().cloned().collect();
        wanted_addresses.extend(member_diff.outdated_addresses.iter().cloned());
        let members = self
            .cache
            .members_by_addresses(space_id, channel_id, &wanted_addresses)
            .ok_or_else(|| invariant("member lookup on unloaded cache"))?;

        let our_peer_ids: Vec<PeerId> = our_peer_entries.iter().map(|e| e.peer_id).collect();
        let missing_peers: HashSet<PeerId> =
            compute_peer_diff(&our_peer_ids, their_peer_ids).into_iter().collect();
        let peer_entries: Vec<PeerEntry> = our_peer_entries
            .iter()
            .filter(|e| missing_peers.contains(&e.peer_id))
            .cloned()
            .collect();

        let parts = DeltaParts {
            new_messages,
            updated_messages,
            deleted_message_ids: self.tombstones.deleted_ids(space_id, channel_id),
            reaction_delta,
            member_delta: MemberDelta {
                members,
                removed_addresses: member_diff.extra_addresses,
            },
            peer_map_delta: PeerMapDelta {
                entries: peer_entries,
            },
        };
        assemble_delta_payloads(parts, self.config.max_chunk_size)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound: applying received deltas
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply one received `sync-delta`. Storage errors surface unchanged.
    ///
    /// The peer-map delta is returned untouched for the encryption layer.
    /// On a final payload the space's session is deleted.
    pub async fn apply_sync_delta(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        delta: &SyncDelta,
    ) -> Result<AppliedDelta> {
        if let Some(message_delta) = &delta.message_delta {
            self.apply_message_delta(space_id, channel_id, message_delta)
                .await?;
        }
        if let Some(reaction_delta) = &delta.reaction_delta {
            self.apply_reaction_delta(space_id, channel_id, reaction_delta)
                .await?;
        }
        if let Some(member_delta) = &delta.member_delta {
            self.apply_member_delta(space_id, member_delta).await?;
        }

        if delta.is_final {
            self.sessions.complete(space_id);
        }
        Ok(AppliedDelta {
            peer_map_delta: delta.peer_map_delta.clone(),
            is_final: delta.is_final,
        })
    }

    /// Persist new and updated messages; delete tombstoned ids.
    pub async fn apply_message_delta(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        delta: &MessageDelta,
    ) -> Result<()> {
        for message in delta.new_messages.iter().chain(&delta.updated_messages) {
            self.store.save_message(message).await?;
        }
        for message_id in &delta.deleted_message_ids {
            self.store.delete_message(message_id).await?;
            // Recording the deletion locally keeps it propagating to the
            // peers we sync with later.
            self.tombstones.record(Tombstone {
                message_id: message_id.clone(),
                space_id: space_id.clone(),
                channel_id: channel_id.clone(),
                deleted_at: now_millis(),
            });
        }
        Ok(())
    }

    /// Replace reaction member sets per message.
    ///
    /// An absent reaction is added; an entry with an empty member set drops
    /// the reaction; counts always equal the member set size. Entries for
    /// unknown messages are skipped.
    pub async fn apply_reaction_delta(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        delta: &ReactionDelta,
    ) -> Result<()> {
        for entry in &delta.reactions {
            let Some(mut message) = self
                .store
                .get_message(space_id, channel_id, &entry.message_id)
                .await?
            else {
                tracing::debug!(message = %entry.message_id, "reaction delta for unknown message");
                continue;
            };

            let position = message
                .reactions
                .iter()
                .position(|r| r.emoji_id == entry.emoji_id);
            match position {
                Some(index) if entry.member_ids.is_empty() => {
                    message.reactions.remove(index);
                }
                Some(index) => {
                    message.reactions[index] =
                        grapevine_core::Reaction::new(entry.emoji_id.clone(), entry.member_ids.clone());
                }
                None if entry.member_ids.is_empty() => continue,
                None => {
                    message.reactions.push(grapevine_core::Reaction::new(
                        entry.emoji_id.clone(),
                        entry.member_ids.clone(),
                    ));
                }
            }
            self.store.save_message(&message).await?;
        }
        Ok(())
    }

    /// Save delivered members and remove the reported removals.
    pub async fn apply_member_delta(
        &self,
        space_id: &SpaceId,
        delta: &MemberDelta,
    ) -> Result<()> {
        for member in &delta.members {
            self.store.save_space_member(space_id, member).await?;
        }
        for address in &delta.removed_addresses {
            self.store.remove_space_member(space_id, address).await?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host hooks: cache maintenance, sessions, tombstones
    // ─────────────────────────────────────────────────────────────────────────

    /// Incremental cache update after the host stored a message.
    pub fn upsert_cached_message(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        message: Message,
    ) -> Result<()> {
        self.cache.upsert_message(space_id, channel_id, message)
    }

    /// Incremental cache update after the host deleted a message. Also
    /// records the tombstone that will carry the deletion to peers.
    pub fn remove_cached_message(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) {
        self.cache.remove_message(space_id, channel_id, message_id);
        self.tombstones.record(Tombstone {
            message_id: message_id.clone(),
            space_id: space_id.clone(),
            channel_id: channel_id.clone(),
            deleted_at: now_millis(),
        });
    }

    /// Incremental cache update after the host stored a member.
    pub fn upsert_cached_member(&self, space_id: &SpaceId, channel_id: &ChannelId, member: Member) {
        self.cache.upsert_member(space_id, channel_id, member);
    }

    /// Drop one channel snapshot, or every snapshot of a space.
    pub fn invalidate(&self, space_id: &SpaceId, channel_id: Option<&ChannelId>) {
        match channel_id {
            Some(channel) => self.cache.invalidate(space_id, channel),
            None => self.cache.invalidate_space(space_id),
        }
    }

    /// Cancel the space's session and clear its timer.
    pub fn cancel_sync(&self, space_id: &SpaceId) {
        self.sessions.cancel(space_id);
    }

    /// Whether a live session exists (reaps an expired one).
    pub fn has_active_session(&self, space_id: &SpaceId) -> bool {
        self.sessions.has_active_session(space_id)
    }

    /// Seed the tombstone log from host persistence.
    pub fn preload_tombstones(&self, tombstones: Vec<Tombstone>) {
        self.tombstones.preload(tombstones);
    }

    /// A copy of the tombstone log, for host persistence.
    pub fn tombstones(&self) -> Vec<Tombstone> {
        self.tombstones.all()
    }

    /// Drop tombstones older than the configured horizon.
    pub fn cleanup_tombstones(&self) -> usize {
        self.tombstones
            .cleanup(now_millis(), self.config.tombstone_max_age)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn channel_summary(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
    ) -> Result<Summary> {
        self.cache.load(space_id, channel_id).await?;
        self.cache
            .summary(space_id, channel_id)
            .ok_or_else(|| invariant("summary on unloaded cache"))
    }

    fn channel_manifest(&self, space_id: &SpaceId, channel_id: &ChannelId) -> Result<Manifest> {
        self.cache
            .manifest(space_id, channel_id)
            .ok_or_else(|| invariant("manifest on unloaded cache"))
    }

    fn channel_member_digests(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
    ) -> Result<Vec<MemberDigest>> {
        self.cache
            .member_digests(space_id, channel_id)
            .ok_or_else(|| invariant("member digests on unloaded cache"))
    }

    fn materialize_messages(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        ids: &[MessageId],
    ) -> Result<Vec<Message>> {
        let wanted: HashSet<MessageId> = ids.iter().cloned().collect();
        let messages = self
            .cache
            .messages_by_ids(space_id, channel_id, &wanted)
            .ok_or_else(|| invariant("message lookup on unloaded cache"))?;
        if messages.len() != wanted.len() {
            return Err(invariant("diff referenced a message missing from the cache"));
        }
        Ok(messages)
    }

    /// Reactions of ours the remote does not hold exactly.
    fn build_reaction_delta(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        our_manifest: &Manifest,
        their_manifest: &Manifest,
    ) -> Result<ReactionDelta> {
        let theirs: HashSet<(&MessageId, &str, u32, &str)> = their_manifest
            .reaction_digests
            .iter()
            .map(|d| {
                (
                    &d.message_id,
                    d.emoji_id.as_str(),
                    d.count,
                    d.members_hash.as_str(),
                )
            })
            .collect();

        let differing: Vec<_> = our_manifest
            .reaction_digests
            .iter()
            .filter(|d| {
                !theirs.contains(&(
                    &d.message_id,
                    d.emoji_id.as_str(),
                    d.count,
                    d.members_hash.as_str(),
                ))
            })
            .collect();
        if differing.is_empty() {
            return Ok(ReactionDelta::default());
        }

        let wanted: HashSet<MessageId> =
            differing.iter().map(|d| d.message_id.clone()).collect();
        let messages = self
            .cache
            .messages_by_ids(space_id, channel_id, &wanted)
            .ok_or_else(|| invariant("reaction lookup on unloaded cache"))?;
        let by_id: HashMap<&MessageId, &Message> =
            messages.iter().map(|m| (&m.message_id, m)).collect();

        let mut reactions = Vec::with_capacity(differing.len());
        for digest in differing {
            let Some(message) = by_id.get(&digest.message_id) else {
                continue;
            };
            let Some(reaction) = message
                .reactions
                .iter()
                .find(|r| r.emoji_id == digest.emoji_id)
            else {
                continue;
            };
            reactions.push(ReactionEntry {
                message_id: digest.message_id.clone(),
                emoji_id: reaction.emoji_id.clone(),
                member_ids: reaction.member_ids.clone(),
            });
        }
        Ok(ReactionDelta { reactions })
    }
}

fn invariant(message: &str) -> SyncError {
    SyncError::InvariantViolation(message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapevine_core::MessageContent;
    use grapevine_store::MemoryStore;

    fn space() -> SpaceId {
        SpaceId::from("s1")
    }

    fn channel() -> ChannelId {
        ChannelId::from("general")
    }

    fn inbox(name: &str) -> InboxAddress {
        InboxAddress::from(name)
    }

    fn message(id: &str, created: u64) -> Message {
        Message {
            message_id: MessageId::from(id),
            space_id: space(),
            channel_id: channel(),
            created_date: created,
            modified_date: created,
            content: MessageContent::Post {
                sender_id: Address::from("alice"),
                text: format!("text {id}"),
                reply_id: None,
            },
            reactions: vec![],
            mentions: vec![],
            nonce: "n".into(),
            digest_algorithm: "sha-256".into(),
            last_modified_hash: String::new(),
        }
    }

    fn member(address: &str) -> Member {
        Member {
            address: Address::from(address),
            inbox_address: Some(inbox(&format!("{address}-inbox"))),
            display_name: Some(address.to_owned()),
            profile_image: None,
        }
    }

    async fn engine_with(
        messages: &[Message],
        members: &[Member],
    ) -> SyncEngine<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for m in messages {
            store.save_message(m).await.unwrap();
        }
        for m in members {
            store.save_space_member(&space(), m).await.unwrap();
        }
        SyncEngine::new(store, SyncConfig::default(), None)
    }

    #[tokio::test]
    async fn test_request_opens_session_and_carries_summary() {
        let engine = engine_with(&[message("m1", 1000)], &[member("alice")]).await;
        let request = engine
            .build_sync_request(&space(), &channel(), &inbox("me"))
            .await
            .unwrap();

        assert_eq!(request.summary.message_count, 1);
        assert_eq!(request.summary.member_count, 1);
        assert!(request.expiry > now_millis());
        assert!(engine.has_active_session(&space()));
    }

    #[tokio::test]
    async fn test_sync_info_nothing_to_offer() {
        let engine = engine_with(&[], &[]).await;
        let theirs = Summary {
            message_count: 5,
            member_count: 5,
            oldest_message_timestamp: 1,
            newest_message_timestamp: 9,
            manifest_hash: "ab".repeat(32),
        };
        let info = engine
            .build_sync_info(&space(), &channel(), &inbox("me"), &theirs)
            .await
            .unwrap();
        assert!(info.is_none());
    }

    #[tokio::test]
    async fn test_sync_info_hash_match_is_silent() {
        let engine = engine_with(&[message("m1", 1000)], &[member("alice")]).await;
        let ours = engine
            .build_sync_request(&space(), &channel(), &inbox("me"))
            .await
            .unwrap()
            .summary;

        let info = engine
            .build_sync_info(&space(), &channel(), &inbox("me"), &ours)
            .await
            .unwrap();
        assert!(info.is_none());
    }

    #[tokio::test]
    async fn test_sync_info_reports_more_messages() {
        let engine = engine_with(
            &[message("m1", 1000), message("m2", 2000)],
            &[member("alice")],
        )
        .await;
        let theirs = Summary {
            message_count: 1,
            member_count: 1,
            oldest_message_timestamp: 1000,
            newest_message_timestamp: 1000,
            manifest_hash: "cd".repeat(32),
        };

        let info = engine
            .build_sync_info(&space(), &channel(), &inbox("me"), &theirs)
            .await
            .unwrap()
            .expect("should offer help");
        assert_eq!(info.summary.message_count, 2);
    }

    #[tokio::test]
    async fn test_initiate_without_candidates_returns_none() {
        let engine = engine_with(&[message("m1", 1000)], &[]).await;
        engine
            .build_sync_request(&space(), &channel(), &inbox("me"))
            .await
            .unwrap();

        let initiate = engine
            .build_sync_initiate(&space(), &channel(), &inbox("me"), vec![])
            .await
            .unwrap();
        assert!(initiate.is_none());
        assert!(!engine.has_active_session(&space()));
    }

    #[tokio::test]
    async fn test_initiate_targets_best_candidate() {
        let engine = engine_with(&[message("m1", 1000)], &[]).await;
        engine
            .build_sync_request(&space(), &channel(), &inbox("me"))
            .await
            .unwrap();

        let weak = SyncCandidate {
            inbox_address: inbox("weak"),
            summary: Summary {
                message_count: 1,
                member_count: 0,
                oldest_message_timestamp: 0,
                newest_message_timestamp: 0,
                manifest_hash: "0".repeat(64),
            },
        };
        let strong = SyncCandidate {
            inbox_address: inbox("strong"),
            summary: Summary {
                message_count: 4,
                member_count: 2,
                oldest_message_timestamp: 0,
                newest_message_timestamp: 0,
                manifest_hash: "0".repeat(64),
            },
        };
        engine.add_candidate(&space(), weak);
        engine.add_candidate(&space(), strong);

        let (target, payload) = engine
            .build_sync_initiate(&space(), &channel(), &inbox("me"), vec![PeerId(1)])
            .await
            .unwrap()
            .expect("have candidates");
        assert_eq!(target.inbox_address.as_str(), "strong");
        assert_eq!(payload.manifest.unwrap().message_count, 1);
        assert_eq!(payload.peer_ids.unwrap(), vec![PeerId(1)]);
    }

    #[tokio::test]
    async fn test_reaction_apply_add_replace_drop() {
        let engine = engine_with(&[message("m1", 1000)], &[]).await;

        // Add a reaction the message lacks.
        engine
            .apply_reaction_delta(
                &space(),
                &channel(),
                &ReactionDelta {
                    reactions: vec![ReactionEntry {
                        message_id: MessageId::from("m1"),
                        emoji_id: "heart".into(),
                        member_ids: vec![Address::from("bob"), Address::from("carol")],
                    }],
                },
            )
            .await
            .unwrap();
        let stored = engine
            .store
            .get_message(&space(), &channel(), &MessageId::from("m1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.reactions.len(), 1);
        assert_eq!(stored.reactions[0].count, 2);

        // Replace the member set.
        engine
            .apply_reaction_delta(
                &space(),
                &channel(),
                &ReactionDelta {
                    reactions: vec![ReactionEntry {
                        message_id: MessageId::from("m1"),
                        emoji_id: "heart".into(),
                        member_ids: vec![Address::from("bob")],
                    }],
                },
            )
            .await
            .unwrap();
        let stored = engine
            .store
            .get_message(&space(), &channel(), &MessageId::from("m1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.reactions[0].member_ids, vec![Address::from("bob")]);
        assert_eq!(stored.reactions[0].count, 1);

        // Empty member set drops the reaction.
        engine
            .apply_reaction_delta(
                &space(),
                &channel(),
                &ReactionDelta {
                    reactions: vec![ReactionEntry {
                        message_id: MessageId::from("m1"),
                        emoji_id: "heart".into(),
                        member_ids: vec![],
                    }],
                },
            )
            .await
            .unwrap();
        let stored = engine
            .store
            .get_message(&space(), &channel(), &MessageId::from("m1"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.reactions.is_empty());
    }

    #[tokio::test]
    async fn test_message_delta_apply_records_tombstones() {
        let engine = engine_with(&[message("m1", 1000)], &[]).await;
        engine
            .apply_message_delta(
                &space(),
                &channel(),
                &MessageDelta {
                    new_messages: vec![message("m2", 2000)],
                    updated_messages: vec![],
                    deleted_message_ids: vec![MessageId::from("m1")],
                    is_last: true,
                },
            )
            .await
            .unwrap();

        assert!(engine
            .store
            .get_message(&space(), &channel(), &MessageId::from("m1"))
            .await
            .unwrap()
            .is_none());
        assert!(engine
            .store
            .get_message(&space(), &channel(), &MessageId::from("m2"))
            .await
            .unwrap()
            .is_some());
        assert_eq!(engine.tombstones().len(), 1);
    }

    #[tokio::test]
    async fn test_final_delta_closes_session() {
        let engine = engine_with(&[message("m1", 1000)], &[]).await;
        engine
            .build_sync_request(&space(), &channel(), &inbox("me"))
            .await
            .unwrap();
        assert!(engine.has_active_session(&space()));

        let applied = engine
            .apply_sync_delta(
                &space(),
                &channel(),
                &SyncDelta {
                    is_final: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(applied.is_final);
        assert!(!engine.has_active_session(&space()));
    }

    #[tokio::test]
    async fn test_member_delta_removals_round_trip() {
        let engine = engine_with(&[], &[member("alice"), member("bob")]).await;
        engine
            .apply_member_delta(
                &space(),
                &MemberDelta {
                    members: vec![member("carol")],
                    removed_addresses: vec![Address::from("bob")],
                },
            )
            .await
            .unwrap();

        let members = engine.store.get_space_members(&space()).await.unwrap();
        let addresses: Vec<&str> = members.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(addresses, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_cleanup_tombstones_respects_horizon() {
        let engine = engine_with(&[], &[]).await;
        engine.preload_tombstones(vec![Tombstone {
            message_id: MessageId::from("ancient"),
            space_id: space(),
            channel_id: channel(),
            deleted_at: 1,
        }]);
        engine.remove_cached_message(&space(), &channel(), &MessageId::from("recent"));

        assert_eq!(engine.cleanup_tombstones(), 1);
        let remaining = engine.tombstones();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id.as_str(), "recent");
    }
}
