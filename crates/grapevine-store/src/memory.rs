//! In-memory implementation of the Storage trait.
//!
//! Primarily for tests: same semantics as a real backend, no persistence.
//! Thread-safe via RwLock.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use grapevine_core::{Address, ChannelId, Member, Message, MessageId, SpaceId};

use crate::error::Result;
use crate::traits::{Direction, MessagePage, MessageQuery, Storage};

/// In-memory store. All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Messages indexed by id.
    messages: HashMap<MessageId, Message>,

    /// Members per space, indexed by address.
    members: HashMap<SpaceId, HashMap<Address, Member>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages across all channels. Test helper.
    pub fn message_count(&self) -> usize {
        self.inner.read().unwrap().messages.len()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn get_messages(&self, query: MessageQuery) -> Result<MessagePage> {
        let inner = self.inner.read().unwrap();

        // Collect the channel's messages in deterministic order.
        let mut channel: Vec<&Message> = inner
            .messages
            .values()
            .filter(|m| m.space_id == query.space_id && m.channel_id == query.channel_id)
            .collect();
        channel.sort_by(|a, b| {
            (a.created_date, &a.message_id).cmp(&(b.created_date, &b.message_id))
        });
        if query.direction == Direction::Backward {
            channel.reverse();
        }

        // A cursor names the last message of the previous page.
        let start = match &query.cursor {
            Some(cursor) => channel
                .iter()
                .position(|m| m.message_id.as_str() == cursor.as_str())
                .map(|i| i + 1)
                .unwrap_or(channel.len()),
            None => 0,
        };

        let page: Vec<Message> = channel
            .iter()
            .skip(start)
            .take(query.limit)
            .map(|m| (*m).clone())
            .collect();

        let next_cursor = if start + page.len() < channel.len() {
            page.last().map(|m| m.message_id.as_str().to_owned())
        } else {
            None
        };
        let prev_cursor = if start > 0 {
            page.first().map(|m| m.message_id.as_str().to_owned())
        } else {
            None
        };

        Ok(MessagePage {
            messages: page,
            next_cursor,
            prev_cursor,
        })
    }

    async fn get_message(
        &self,
        space_id: &SpaceId,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<Option<Message>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .messages
            .get(message_id)
            .filter(|m| &m.space_id == space_id && &m.channel_id == channel_id)
            .cloned())
    }

    async fn save_message(&self, message: &Message) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .messages
            .insert(message.message_id.clone(), message.clone());
        Ok(())
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.messages.remove(message_id);
        Ok(())
    }

    async fn get_space_members(&self, space_id: &SpaceId) -> Result<Vec<Member>> {
        let inner = self.inner.read().unwrap();
        let mut members: Vec<Member> = inner
            .members
            .get(space_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(members)
    }

    async fn save_space_member(&self, space_id: &SpaceId, member: &Member) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .members
            .entry(space_id.clone())
            .or_default()
            .insert(member.address.clone(), member.clone());
        Ok(())
    }

    async fn remove_space_member(&self, space_id: &SpaceId, address: &Address) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(space) = inner.members.get_mut(space_id) {
            space.remove(address);
        }
        Ok(())
    }
}
