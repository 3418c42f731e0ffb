//! Delta chunking and payload assembly.
//!
//! The transfer ships full message records, so payloads are chunked under a
//! byte budget. Assembly follows fixed ordering rules:
//!
//! 1. New and updated messages are chunked together, in source order.
//! 2. Deleted message ids ride only on the last message chunk.
//! 3. A non-empty reaction delta rides only on the last message chunk.
//! 4. Member and peer-map changes ride a trailing payload, which is also
//!    emitted when there were no message chunks at all.
//! 5. Exactly one payload in the sequence carries `is_final`, and it is the
//!    last one.

use std::collections::HashSet;

use grapevine_core::{Message, MessageId};

use crate::error::Result;
use crate::messages::{MemberDelta, MessageDelta, PeerMapDelta, ReactionDelta, SyncDelta};

/// Default byte cap per serialized delta chunk: 5 MiB.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Split messages into chunks whose serialized sizes stay under the cap.
///
/// The walk is greedy and order-preserving. A single message larger than the
/// cap is emitted alone in an over-budget chunk: the core never splits a
/// message, downstream transports must accept or shard it.
pub fn chunk_messages(messages: &[Message], max_chunk_size: usize) -> Result<Vec<Vec<Message>>> {
    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_size = 0usize;

    for message in messages {
        let size = serde_json::to_vec(message)?.len();
        if !current.is_empty() && current_size + size > max_chunk_size {
            chunks.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current.push(message.clone());
        current_size += size;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Everything a transfer needs to ship, before chunking.
#[derive(Debug, Clone, Default)]
pub struct DeltaParts {
    /// Messages the recipient lacks, in source order.
    pub new_messages: Vec<Message>,
    /// Messages the recipient holds an older copy of, in source order.
    pub updated_messages: Vec<Message>,
    /// Locally deleted ids for this channel.
    pub deleted_message_ids: Vec<MessageId>,
    /// Reaction member-set updates.
    pub reaction_delta: ReactionDelta,
    /// Member records and removals.
    pub member_delta: MemberDelta,
    /// Peer-map entries the recipient lacks.
    pub peer_map_delta: PeerMapDelta,
}

/// Assemble the ordered `sync-delta` payload sequence.
pub fn assemble_delta_payloads(parts: DeltaParts, max_chunk_size: usize) -> Result<Vec<SyncDelta>> {
    let new_ids: HashSet<MessageId> = parts
        .new_messages
        .iter()
        .map(|m| m.message_id.clone())
        .collect();

    let mut all = parts.new_messages;
    all.extend(parts.updated_messages);

    let mut chunks = chunk_messages(&all, max_chunk_size)?;

    // Deletions and reaction updates ride the last message chunk; when the
    // diff produced no message chunks, synthesize an empty one to carry them.
    let has_deletions = !parts.deleted_message_ids.is_empty();
    let has_reactions = !parts.reaction_delta.reactions.is_empty();
    if chunks.is_empty() && (has_deletions || has_reactions) {
        chunks.push(Vec::new());
    }

    let mut payloads: Vec<SyncDelta> = Vec::new();
    let chunk_count = chunks.len();
    for (index, chunk) in chunks.into_iter().enumerate() {
        let is_last = index + 1 == chunk_count;

        let (new_messages, updated_messages): (Vec<Message>, Vec<Message>) = chunk
            .into_iter()
            .partition(|m| new_ids.contains(&m.message_id));

        let message_delta = MessageDelta {
            new_messages,
            updated_messages,
            deleted_message_ids: if is_last {
                parts.deleted_message_ids.clone()
            } else {
                Vec::new()
            },
            is_last,
        };

        payloads.push(SyncDelta {
            message_delta: Some(message_delta),
            reaction_delta: (is_last && has_reactions)
                .then(|| parts.reaction_delta.clone()),
            ..Default::default()
        });
    }

    let has_member_changes = !parts.member_delta.is_empty();
    let has_peer_changes = !parts.peer_map_delta.entries.is_empty();

    if has_member_changes || has_peer_changes || payloads.is_empty() {
        payloads.push(SyncDelta {
            member_delta: has_member_changes.then_some(parts.member_delta),
            peer_map_delta: has_peer_changes.then_some(parts.peer_map_delta),
            is_final: true,
            ..Default::default()
        });
    } else if let Some(last) = payloads.last_mut() {
        last.is_final = true;
    }

    Ok(payloads)
}
