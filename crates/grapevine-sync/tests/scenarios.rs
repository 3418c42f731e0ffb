//! End-to-end sync scenarios over in-memory stores.
//!
//! Two engines play requester and responder; payloads travel by function
//! call instead of a transport, which keeps every step observable.

use std::sync::Arc;

use grapevine_core::{ChannelId, InboxAddress, Manifest, MessageId, PeerId, SpaceId};
use grapevine_store::{MemoryStore, MessageQuery, Storage};
use grapevine_sync::{SyncCandidate, SyncConfig, SyncDelta, SyncEngine};
use grapevine_testkit::{member, MessageBuilder, TestSpace};

fn space() -> SpaceId {
    SpaceId::from("s1")
}

fn channel() -> ChannelId {
    ChannelId::from("general")
}

fn inbox(name: &str) -> InboxAddress {
    InboxAddress::from(name)
}

fn empty_manifest() -> Manifest {
    Manifest {
        space_id: space(),
        channel_id: channel(),
        message_count: 0,
        oldest_timestamp: 0,
        newest_timestamp: 0,
        digests: vec![],
        reaction_digests: vec![],
    }
}

fn engine_over(store: MemoryStore) -> SyncEngine<MemoryStore> {
    SyncEngine::new(Arc::new(store), SyncConfig::default(), None)
}

async fn apply_all(
    engine: &SyncEngine<MemoryStore>,
    deltas: &[SyncDelta],
) -> grapevine_sync::AppliedDelta {
    let mut last = grapevine_sync::AppliedDelta::default();
    for delta in deltas {
        last = engine
            .apply_sync_delta(&space(), &channel(), delta)
            .await
            .unwrap();
    }
    last
}

async fn all_message_ids(store: &MemoryStore) -> Vec<String> {
    let page = store
        .get_messages(MessageQuery::new(space(), channel(), 10_000))
        .await
        .unwrap();
    page.messages
        .iter()
        .map(|m| m.message_id.as_str().to_owned())
        .collect()
}

#[tokio::test]
async fn equal_manifests_yield_single_final_payload() {
    let fixture = TestSpace::new();
    fixture.seed_posts(3).await;
    let engine = engine_over(fixture.store);

    let ours = engine
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("me"))
        .await
        .unwrap();

    let deltas = engine
        .build_sync_delta(
            &space(),
            &channel(),
            &ours.manifest,
            &ours.member_digests,
            &[],
            &[],
        )
        .await
        .unwrap();

    assert_eq!(deltas.len(), 1);
    let only = &deltas[0];
    assert!(only.is_final);
    assert!(only.message_delta.is_none());
    assert!(only.reaction_delta.is_none());
    assert!(only.member_delta.is_none());
    assert!(only.peer_map_delta.is_none());
}

#[tokio::test]
async fn chunked_transfer_against_empty_peer() {
    // Six ~1 MiB messages, reactions on the even-indexed ones, 5 MiB cap.
    let store = MemoryStore::new();
    for n in 1..=6u64 {
        let mut builder = MessageBuilder::new(&format!("m{n}"), 1000 * n)
            .text("x".repeat(1024 * 1024));
        if n % 2 == 0 {
            builder = builder.reaction("heart", &["alice", "bob"]);
        }
        store.save_message(&builder.build()).await.unwrap();
    }
    store
        .save_space_member(&space(), &member("alice"))
        .await
        .unwrap();
    let engine = engine_over(store);

    let deltas = engine
        .build_sync_delta(&space(), &channel(), &empty_manifest(), &[], &[], &[])
        .await
        .unwrap();

    // At least two message chunks plus the trailing member payload.
    assert!(deltas.len() >= 3);
    assert_eq!(deltas.iter().filter(|d| d.is_final).count(), 1);
    assert!(deltas.last().unwrap().is_final);
    assert!(deltas.last().unwrap().member_delta.is_some());

    // New messages partition all six, in order.
    let mut shipped = Vec::new();
    for delta in &deltas {
        if let Some(md) = &delta.message_delta {
            assert!(md.updated_messages.is_empty());
            shipped.extend(md.new_messages.iter().map(|m| m.message_id.as_str().to_owned()));
        }
    }
    assert_eq!(shipped, ["m1", "m2", "m3", "m4", "m5", "m6"]);

    // The reaction delta appears exactly once, on the last message chunk.
    let carriers: Vec<&SyncDelta> = deltas
        .iter()
        .filter(|d| d.reaction_delta.is_some())
        .collect();
    assert_eq!(carriers.len(), 1);
    let carrier_md = carriers[0].message_delta.as_ref().unwrap();
    assert!(carrier_md.is_last);
    assert_eq!(
        carriers[0].reaction_delta.as_ref().unwrap().reactions.len(),
        3
    );
}

#[tokio::test]
async fn apply_then_diff_is_empty() {
    let fixture = TestSpace::new();
    fixture.seed_posts(4).await;
    fixture.seed_members(&["alice", "bob"]).await;
    let sender = engine_over(fixture.store);
    let receiver = engine_over(MemoryStore::new());

    // The receiver advertises its (empty) state; the sender answers with
    // everything it holds.
    let receiver_state = receiver
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("receiver"))
        .await
        .unwrap();
    let deltas = sender
        .build_sync_delta(
            &space(),
            &channel(),
            &receiver_state.manifest,
            &receiver_state.member_digests,
            &[],
            &[],
        )
        .await
        .unwrap();
    apply_all(&receiver, &deltas).await;

    // The receiver's storage changed under its cache: rebuild the snapshot.
    receiver.invalidate(&space(), Some(&channel()));
    let receiver_state = receiver
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("receiver"))
        .await
        .unwrap();
    let sender_state = sender
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("sender"))
        .await
        .unwrap();

    let forward =
        grapevine_sync::compute_message_diff(&sender_state.manifest, &receiver_state.manifest);
    let backward =
        grapevine_sync::compute_message_diff(&receiver_state.manifest, &sender_state.manifest);
    assert!(forward.is_empty());
    assert!(backward.is_empty());

    let members = grapevine_sync::compute_member_diff(
        &sender_state.member_digests,
        &receiver_state.member_digests,
    );
    assert!(members.is_empty());
}

#[tokio::test]
async fn applying_a_delta_twice_is_idempotent() {
    let fixture = TestSpace::new();
    fixture.seed_posts(3).await;
    fixture.seed_members(&["alice"]).await;
    let sender = engine_over(fixture.store);
    let receiver = engine_over(MemoryStore::new());

    let deltas = sender
        .build_sync_delta(&space(), &channel(), &empty_manifest(), &[], &[], &[])
        .await
        .unwrap();

    apply_all(&receiver, &deltas).await;
    let ids_once = all_message_ids(receiver.store()).await;

    apply_all(&receiver, &deltas).await;
    let ids_twice = all_message_ids(receiver.store()).await;

    assert_eq!(ids_once, ids_twice);
    assert_eq!(ids_once, ["m1", "m2", "m3"]);
}

#[tokio::test]
async fn five_step_flow_converges_requester() {
    // Requester holds nothing; the peer holds 3 messages and a member.
    let peer_fixture = TestSpace::new();
    peer_fixture.seed_posts(3).await;
    peer_fixture.seed_members(&["alice"]).await;
    let peer = engine_over(peer_fixture.store);
    let requester = engine_over(MemoryStore::new());

    // Step 1: requester broadcasts.
    let request = requester
        .build_sync_request(&space(), &channel(), &inbox("requester"))
        .await
        .unwrap();
    assert!(requester.has_active_session(&space()));

    // Step 2: the peer answers with its summary.
    let info = peer
        .build_sync_info(&space(), &channel(), &inbox("peer"), &request.summary)
        .await
        .unwrap()
        .expect("peer has plenty to offer");
    assert_eq!(info.summary.message_count, 3);

    // The reply becomes a candidate.
    assert!(requester.add_candidate(
        &space(),
        SyncCandidate {
            inbox_address: info.inbox_address.clone(),
            summary: info.summary.clone(),
        },
    ));

    // Step 3: requester initiates with the chosen candidate.
    let (target, initiate) = requester
        .build_sync_initiate(&space(), &channel(), &inbox("requester"), vec![PeerId(7)])
        .await
        .unwrap()
        .expect("one candidate collected");
    assert_eq!(target.inbox_address.as_str(), "peer");

    // Step 4: peer answers with its manifest...
    let peer_manifest = peer
        .build_sync_manifest(&space(), &channel(), vec![PeerId(7)], &inbox("peer"))
        .await
        .unwrap();

    // ...and step 5: the peer also pushes what the requester lacks.
    let deltas = peer
        .build_sync_delta(
            &space(),
            &channel(),
            initiate.manifest.as_ref().unwrap(),
            initiate.member_digests.as_deref().unwrap(),
            initiate.peer_ids.as_deref().unwrap(),
            &[],
        )
        .await
        .unwrap();

    let applied = apply_all(&requester, &deltas).await;
    assert!(applied.is_final);
    // The final delta closed the requester's session.
    assert!(!requester.has_active_session(&space()));

    // The requester now holds everything the peer advertised.
    requester.invalidate(&space(), Some(&channel()));
    let converged = requester
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("requester"))
        .await
        .unwrap();
    let diff = grapevine_sync::compute_message_diff(&converged.manifest, &peer_manifest.manifest);
    assert!(diff.is_empty());
    assert_eq!(converged.member_digests.len(), 1);
}

#[tokio::test]
async fn deletions_propagate_as_tombstones() {
    let fixture = TestSpace::new();
    fixture.seed_posts(2).await;
    let sender = engine_over(fixture.store);

    // The host deletes m2 from storage and tells the engine.
    sender
        .store()
        .delete_message(&MessageId::from("m2"))
        .await
        .unwrap();
    sender.remove_cached_message(&space(), &channel(), &MessageId::from("m2"));

    // A receiver that still holds both messages gets the deletion.
    let receiver_fixture = TestSpace::new();
    receiver_fixture.seed_posts(2).await;
    let receiver = engine_over(receiver_fixture.store);
    let receiver_state = receiver
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("receiver"))
        .await
        .unwrap();

    let deltas = sender
        .build_sync_delta(
            &space(),
            &channel(),
            &receiver_state.manifest,
            &receiver_state.member_digests,
            &[],
            &[],
        )
        .await
        .unwrap();
    apply_all(&receiver, &deltas).await;

    assert_eq!(all_message_ids(receiver.store()).await, ["m1"]);
    // The receiver recorded the tombstone, so the deletion keeps moving.
    assert_eq!(receiver.tombstones().len(), 1);
}

#[tokio::test]
async fn peer_map_delta_passes_through_untouched() {
    let fixture = TestSpace::new();
    fixture.seed_posts(1).await;
    let sender = engine_over(fixture.store);

    let ours = sender
        .build_sync_manifest(&space(), &channel(), vec![], &inbox("sender"))
        .await
        .unwrap();

    let entries = vec![
        grapevine_sync::PeerEntry {
            peer_id: PeerId(1),
            key_material: "key-one".into(),
        },
        grapevine_sync::PeerEntry {
            peer_id: PeerId(2),
            key_material: "key-two".into(),
        },
    ];
    // The remote already knows peer 1.
    let deltas = sender
        .build_sync_delta(
            &space(),
            &channel(),
            &ours.manifest,
            &ours.member_digests,
            &[PeerId(1)],
            &entries,
        )
        .await
        .unwrap();

    let receiver = engine_over(MemoryStore::new());
    let applied = apply_all(&receiver, &deltas).await;

    let delivered = applied.peer_map_delta.expect("peer delta for the host");
    assert_eq!(delivered.entries.len(), 1);
    assert_eq!(delivered.entries[0].peer_id, PeerId(2));
    assert_eq!(delivered.entries[0].key_material, "key-two");
}
