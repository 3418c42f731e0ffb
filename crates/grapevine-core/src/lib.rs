//! # Grapevine Core
//!
//! Pure primitives for the Grapevine delta-sync core: identifiers, the
//! channel message model, digests, manifests, and canonical hashing.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over messaging data structures.
//!
//! ## Key Types
//!
//! - [`Message`] - A channel message with tagged content and reactions
//! - [`MessageDigest`] / [`ReactionDigest`] / [`MemberDigest`] - Compact
//!   hashed summaries exchanged during sync
//! - [`Manifest`] / [`Summary`] - Per-channel state descriptions
//! - [`ManifestHash`] - Commutative 32-byte XOR accumulator over id hashes
//!
//! ## Canonicalization
//!
//! Every hash is SHA-256 over a deterministic canonical string. See the
//! [`canonical`] module for the per-variant canonical forms.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod message;
pub mod types;

pub use canonical::{content_hash, id_hash, members_hash, reactions_hash};
pub use digest::{
    build_member_digest, build_message_digest, build_reaction_digests, MemberDigest,
    MessageDigest, ReactionDigest,
};
pub use error::CoreError;
pub use hash::{ManifestHash, Sha256Hash};
pub use manifest::{manifest_hash_of_digests, Manifest, Summary};
pub use message::{Member, Message, MessageContent, Reaction, Tombstone};
pub use types::{Address, ChannelId, InboxAddress, MessageId, PeerId, SpaceId, Timestamp};
