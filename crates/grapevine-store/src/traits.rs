//! The Storage trait: the abstract interface the sync core consumes.
//!
//! The core never persists anything itself; every durable read and write
//! goes through this trait. Implementations include the host's database and
//! [`crate::MemoryStore`] for tests.

use async_trait::async_trait;
use grapevine_core::{Address, ChannelId, Member, Message, MessageId, SpaceId};

use crate::error::Result;

/// Paging direction for message retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Oldest first (ascending created date). The default.
    #[default]
    Forward,
    /// Newest first.
    Backward,
}

/// A paged message query for one channel.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub space_id: SpaceId,
    pub channel_id: ChannelId,
    /// Maximum messages to return in this page.
    pub limit: usize,
    /// Resume after the message this cursor names; None starts from the edge.
    pub cursor: Option<String>,
    pub direction: Direction,
}

impl MessageQuery {
    /// A forward query from the start of the channel.
    pub fn new(space_id: SpaceId, channel_id: ChannelId, limit: usize) -> Self {
        Self {
            space_id,
            channel_id,
            limit,
            cursor: None,
            direction: Direction::Forward,
        }
    }

    /// Continue from a cursor returned by a previous page.
    pub fn after(mut self, cursor: String) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// One page of messages plus continuation cursors.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    /// Messages ordered by `(created_date, message_id)` in query direction.
    pub messages: Vec<Message>,
    /// Cursor for the next page, absent when this page reached the end.
    pub next_cursor: Option<String>,
    /// Cursor for the preceding page, absent at the starting edge.
    pub prev_cursor: Option<String>,
}

/// The async storage interface.
///
/// # Design Notes
///
/// - **Saves are upserts**: `save_message`/`save_space_member` replace any
///   existing record with the same key.
/// - **Deletes are idempotent**: removing an absent record succeeds.
/// - All errors are surfaced to the caller unchanged; the sync core performs
///   no retries.
#[async_trait]
pub trait Storage: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Message Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Retrieve one page of a channel's messages.
    async fn get_messages(&self, query: MessageQuery) -> Result<MessagePage>;

    /// Retrieve a single message by id.
    async fn get_message(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<Message>>;

    /// Insert or replace a message.
    async fn save_message(&self, message: &Message) -> Result<()>;

    /// Delete a message by id. Succeeds even when absent.
    async fn delete_message(&self, message_id: &MessageId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Member Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// All known members of a space.
    async fn get_space_members(&self, space_id: &SpaceId) -> Result<Vec<Member>>;

    /// Insert or replace a member record.
    async fn save_space_member(&self, space_id: &SpaceId, member: &Member) -> Result<()>;

    /// Remove a member record. Succeeds even when absent.
    async fn remove_space_member(&self, space_id: &SpaceId, address: &Address) -> Result<()>;
}
