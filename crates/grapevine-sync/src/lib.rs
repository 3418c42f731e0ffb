//! # Grapevine Sync
//!
//! The delta-sync core of the Grapevine messaging client: lets two clients
//! holding overlapping collections of channel messages, members, and
//! group-keying peer entries converge with minimal bandwidth.
//!
//! ## Key Properties
//!
//! - **Idempotent**: applying the same delta twice leaves storage unchanged
//! - **Commutative state hash**: the per-channel manifest hash is an XOR
//!   accumulator, so update order never matters
//! - **Bandwidth-efficient**: full records travel only for what the peer
//!   actually lacks, chunked under a byte budget
//!
//! ## Message Flow
//!
//! ```text
//! Requester                          Candidates          Chosen peer
//!   |-------- sync-request ------------->|                   |
//!   |<------- sync-info -----------------|                   |
//!   |  (collect, pick best candidate)                        |
//!   |-------- sync-initiate -------------------------------->|
//!   |<------- sync-manifest ---------------------------------|
//!   |<------- sync-delta (chunk 1..n, last is final) --------|
//!   |-------- sync-delta (what the peer lacked) ------------>|
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use grapevine_store::MemoryStore;
//! use grapevine_sync::{SyncConfig, SyncEngine};
//!
//! async fn example() {
//!     let store = Arc::new(MemoryStore::new());
//!     let engine = SyncEngine::new(store, SyncConfig::default(), None);
//!
//!     // let request = engine.build_sync_request(&space, &channel, &inbox).await?;
//!     // transport.broadcast(request);
//! }
//! ```

pub mod cache;
pub mod delta;
pub mod diff;
pub mod engine;
pub mod error;
pub mod messages;
pub mod session;
pub mod tombstone;

pub use cache::PayloadCache;
pub use delta::{assemble_delta_payloads, chunk_messages, DeltaParts, DEFAULT_MAX_CHUNK_SIZE};
pub use diff::{compute_member_diff, compute_message_diff, compute_peer_diff, MemberDiff, MessageDiff};
pub use engine::{AppliedDelta, SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use messages::{
    MemberDelta, MessageDelta, PeerEntry, PeerMapDelta, ReactionDelta, ReactionEntry, SyncDelta,
    SyncInfo, SyncInitiate, SyncManifest, SyncPayload, SyncRequest,
};
pub use session::{InitiateSyncHook, SessionConfig, SessionManager, SyncCandidate};
pub use tombstone::{TombstoneLog, DEFAULT_TOMBSTONE_MAX_AGE};
