//! The channel message model.
//!
//! Messages are authoritative records owned by the storage layer; the sync
//! core only reads them, digests them, and ships full copies in deltas.
//! Content is a tagged union: every variant carries the sender and its own
//! payload fields, and each variant has its own canonical form (see
//! [`crate::canonical`]).

use serde::{Deserialize, Serialize};

use crate::types::{Address, ChannelId, InboxAddress, MessageId, SpaceId, Timestamp};

/// A complete channel message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub message_id: MessageId,
    /// The space this message belongs to.
    pub space_id: SpaceId,
    /// The channel this message belongs to.
    pub channel_id: ChannelId,
    /// Creation time (Unix ms). Never changes after creation.
    pub created_date: Timestamp,
    /// Last modification time (Unix ms). Equals `created_date` until the
    /// message is edited.
    pub modified_date: Timestamp,
    /// The tagged content payload.
    pub content: MessageContent,
    /// Reactions attached to this message.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Addresses mentioned in the message.
    #[serde(default)]
    pub mentions: Vec<Address>,
    /// Per-message nonce assigned by the encryption layer. Opaque here.
    pub nonce: String,
    /// Name of the digest algorithm the sender used.
    pub digest_algorithm: String,
    /// Hash recorded at the sender's last modification. Opaque here.
    pub last_modified_hash: String,
}

/// The tagged content union.
///
/// Unknown tags deserialize to [`MessageContent::Unknown`] so that a single
/// unrecognised message does not poison a whole payload; hashing such a
/// message fails with `UnsupportedContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageContent {
    /// A plain text post, optionally replying to another message.
    #[serde(rename_all = "camelCase")]
    Post {
        sender_id: Address,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_id: Option<MessageId>,
    },

    /// An embedded image and/or video.
    #[serde(rename_all = "camelCase")]
    Embed {
        sender_id: Address,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_id: Option<MessageId>,
    },

    /// A sticker reference.
    #[serde(rename_all = "camelCase")]
    Sticker {
        sender_id: Address,
        sticker_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_id: Option<MessageId>,
    },

    /// An edit of an earlier message.
    #[serde(rename_all = "camelCase")]
    EditMessage {
        sender_id: Address,
        original_id: MessageId,
        edited_text: String,
        edited_at: Timestamp,
    },

    /// A removal of an earlier message.
    #[serde(rename_all = "camelCase")]
    RemoveMessage {
        sender_id: Address,
        remove_id: MessageId,
    },

    /// The sender joined the space.
    #[serde(rename_all = "camelCase")]
    Join { sender_id: Address },

    /// The sender left the space.
    #[serde(rename_all = "camelCase")]
    Leave { sender_id: Address },

    /// The sender kicked another member.
    #[serde(rename_all = "camelCase")]
    Kick { sender_id: Address },

    /// A system event rendered as text.
    #[serde(rename_all = "camelCase")]
    Event { sender_id: Address, text: String },

    /// A profile update.
    #[serde(rename_all = "camelCase")]
    UpdateProfile {
        sender_id: Address,
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_icon: Option<String>,
    },

    /// A mute or unmute of a member.
    #[serde(rename_all = "camelCase")]
    Mute {
        sender_id: Address,
        target: Address,
        action: String,
        mute_id: String,
    },

    /// A pin or unpin of a message.
    #[serde(rename_all = "camelCase")]
    Pin {
        sender_id: Address,
        target_message_id: MessageId,
        action: String,
    },

    /// A reaction added to a message.
    #[serde(rename_all = "camelCase")]
    Reaction {
        sender_id: Address,
        message_id: MessageId,
        reaction: String,
    },

    /// A reaction removed from a message.
    #[serde(rename_all = "camelCase")]
    RemoveReaction {
        sender_id: Address,
        message_id: MessageId,
        reaction: String,
    },

    /// The sender deleted the conversation.
    #[serde(rename_all = "camelCase")]
    DeleteConversation { sender_id: Address },

    /// A content tag this build does not recognise.
    #[serde(other)]
    Unknown,
}

/// A reaction on a message: one emoji, the set of members who placed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// The emoji identifier.
    pub emoji_id: String,
    /// Members who placed this reaction.
    pub member_ids: Vec<Address>,
    /// Always `member_ids.len()`; carried on the wire for display caches.
    pub count: u32,
}

impl Reaction {
    /// Build a reaction with `count` derived from the member set.
    pub fn new(emoji_id: impl Into<String>, member_ids: Vec<Address>) -> Self {
        let count = member_ids.len() as u32;
        Self {
            emoji_id: emoji_id.into(),
            member_ids,
            count,
        }
    }
}

/// A space member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// The member's stable address.
    pub address: Address,
    /// Inbox for direct delivery; absent for members we only know indirectly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbox_address: Option<InboxAddress>,
    /// Display name chosen by the member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Profile image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

/// Record that a specific message was deleted, enabling deletions to
/// propagate via sync. `{message_id, space_id, channel_id}` uniquely
/// identifies a deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub message_id: MessageId,
    pub space_id: SpaceId,
    pub channel_id: ChannelId,
    /// When the deletion happened (Unix ms); drives cleanup.
    pub deleted_at: Timestamp,
}

impl MessageContent {
    /// The sender of this content, when known.
    pub fn sender_id(&self) -> Option<&Address> {
        match self {
            MessageContent::Post { sender_id, .. }
            | MessageContent::Embed { sender_id, .. }
            | MessageContent::Sticker { sender_id, .. }
            | MessageContent::EditMessage { sender_id, .. }
            | MessageContent::RemoveMessage { sender_id, .. }
            | MessageContent::Join { sender_id }
            | MessageContent::Leave { sender_id }
            | MessageContent::Kick { sender_id }
            | MessageContent::Event { sender_id, .. }
            | MessageContent::UpdateProfile { sender_id, .. }
            | MessageContent::Mute { sender_id, .. }
            | MessageContent::Pin { sender_id, .. }
            | MessageContent::Reaction { sender_id, .. }
            | MessageContent::RemoveReaction { sender_id, .. }
            | MessageContent::DeleteConversation { sender_id } => Some(sender_id),
            MessageContent::Unknown => None,
        }
    }
}
