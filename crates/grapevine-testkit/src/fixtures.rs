//! Test fixtures and builders.
//!
//! Common setup code for integration tests. Everything is deterministic
//! unless a test explicitly asks for random material.

use rand::Rng;

use grapevine_core::{
    Address, ChannelId, Member, Message, MessageContent, MessageId, Reaction, SpaceId, Timestamp,
};
use grapevine_store::{MemoryStore, Storage};

/// A test fixture naming one space and channel over a fresh memory store.
pub struct TestSpace {
    pub space_id: SpaceId,
    pub channel_id: ChannelId,
    pub store: MemoryStore,
}

impl TestSpace {
    /// Create a fixture for the conventional `s1 / general` channel.
    pub fn new() -> Self {
        Self {
            space_id: SpaceId::from("s1"),
            channel_id: ChannelId::from("general"),
            store: MemoryStore::new(),
        }
    }

    /// Seed the store with posts `m1..=mN` created at `1000 * n`.
    pub async fn seed_posts(&self, count: usize) -> Vec<Message> {
        let mut messages = Vec::with_capacity(count);
        for n in 1..=count {
            let message = self.post(&format!("m{n}"), 1000 * n as Timestamp);
            self.store.save_message(&message).await.unwrap();
            messages.push(message);
        }
        messages
    }

    /// Seed the store with members named after the given addresses.
    pub async fn seed_members(&self, addresses: &[&str]) -> Vec<Member> {
        let mut members = Vec::with_capacity(addresses.len());
        for address in addresses {
            let m = member(address);
            self.store.save_space_member(&self.space_id, &m).await.unwrap();
            members.push(m);
        }
        members
    }

    /// A post in this fixture's channel.
    pub fn post(&self, id: &str, created: Timestamp) -> Message {
        MessageBuilder::new(id, created)
            .space(self.space_id.clone())
            .channel(self.channel_id.clone())
            .build()
    }
}

impl Default for TestSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for test messages.
pub struct MessageBuilder {
    id: String,
    created: Timestamp,
    modified: Option<Timestamp>,
    space_id: SpaceId,
    channel_id: ChannelId,
    sender: Address,
    text: String,
    reactions: Vec<Reaction>,
}

impl MessageBuilder {
    /// A post with the given id and creation time.
    pub fn new(id: &str, created: Timestamp) -> Self {
        Self {
            id: id.to_owned(),
            created,
            modified: None,
            space_id: SpaceId::from("s1"),
            channel_id: ChannelId::from("general"),
            sender: Address::from("alice"),
            text: format!("text {id}"),
            reactions: Vec::new(),
        }
    }

    pub fn space(mut self, space_id: SpaceId) -> Self {
        self.space_id = space_id;
        self
    }

    pub fn channel(mut self, channel_id: ChannelId) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.sender = Address::from(sender);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Mark the message edited at `modified`.
    pub fn modified(mut self, modified: Timestamp) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn reaction(mut self, emoji: &str, members: &[&str]) -> Self {
        self.reactions.push(reaction(emoji, members));
        self
    }

    pub fn build(self) -> Message {
        Message {
            message_id: MessageId::from(self.id.as_str()),
            space_id: self.space_id,
            channel_id: self.channel_id,
            created_date: self.created,
            modified_date: self.modified.unwrap_or(self.created),
            content: MessageContent::Post {
                sender_id: self.sender,
                text: self.text,
                reply_id: None,
            },
            reactions: self.reactions,
            mentions: vec![],
            nonce: random_nonce(),
            digest_algorithm: "sha-256".into(),
            last_modified_hash: String::new(),
        }
    }
}

/// A plain post message.
pub fn post(id: &str, created: Timestamp) -> Message {
    MessageBuilder::new(id, created).build()
}

/// A member whose inbox and display name derive from the address.
pub fn member(address: &str) -> Member {
    Member {
        address: Address::from(address),
        inbox_address: Some(format!("{address}-inbox").into()),
        display_name: Some(address.to_owned()),
        profile_image: None,
    }
}

/// A reaction by the given members.
pub fn reaction(emoji: &str, members: &[&str]) -> Reaction {
    Reaction::new(emoji, members.iter().map(|m| Address::from(*m)).collect())
}

fn random_nonce() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    bytes.map(|b| format!("{b:02x}")).join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapevine_store::Storage;

    #[tokio::test]
    async fn test_seeded_posts_are_retrievable() {
        let fixture = TestSpace::new();
        let seeded = fixture.seed_posts(3).await;
        assert_eq!(seeded.len(), 3);

        let loaded = fixture
            .store
            .get_message(&fixture.space_id, &fixture.channel_id, &seeded[0].message_id)
            .await
            .unwrap();
        assert_eq!(loaded.unwrap().created_date, 1000);
    }

    #[test]
    fn test_builder_defaults() {
        let m = MessageBuilder::new("m1", 1000)
            .modified(2000)
            .reaction("heart", &["bob"])
            .build();
        assert_eq!(m.created_date, 1000);
        assert_eq!(m.modified_date, 2000);
        assert_eq!(m.reactions[0].count, 1);
        assert_eq!(m.nonce.len(), 16);
    }
}
