//! Digest builders.
//!
//! Digests are the compact hashed summaries exchanged during sync: enough to
//! decide whether two peers hold the same entity, small enough to ship for a
//! whole channel at once. All hashes are hex-encoded SHA-256.

use serde::{Deserialize, Serialize};

use crate::canonical::{content_hash, members_hash};
use crate::error::CoreError;
use crate::hash::Sha256Hash;
use crate::message::{Member, Message, Reaction};
use crate::types::{Address, InboxAddress, MessageId, Timestamp};

/// Identity and content summary of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDigest {
    pub message_id: MessageId,
    pub created_date: Timestamp,
    /// Hex SHA-256 of the canonical content string.
    pub content_hash: String,
    /// Present only when the message has been modified since creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<Timestamp>,
}

impl MessageDigest {
    /// The timestamp used for newest-modified-wins comparisons.
    pub fn effective_date(&self) -> Timestamp {
        self.modified_date.unwrap_or(self.created_date)
    }
}

/// Summary of one reaction on one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionDigest {
    pub message_id: MessageId,
    pub emoji_id: String,
    pub count: u32,
    /// Hex SHA-256 of the sorted member ids joined with `,`.
    pub members_hash: String,
}

/// Summary of one space member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDigest {
    pub address: Address,
    /// Empty string when the member has no known inbox.
    pub inbox_address: InboxAddress,
    /// Hex SHA-256 of the display name (of `""` when unset).
    pub display_name_hash: String,
    /// Hex SHA-256 of the profile image reference (of `""` when unset).
    pub icon_hash: String,
}

/// Build the digest for a message.
///
/// `modified_date` is recorded only when it differs from `created_date`.
pub fn build_message_digest(message: &Message) -> Result<MessageDigest, CoreError> {
    let modified_date =
        (message.modified_date != message.created_date).then_some(message.modified_date);

    Ok(MessageDigest {
        message_id: message.message_id.clone(),
        created_date: message.created_date,
        content_hash: content_hash(&message.content)?.to_hex(),
        modified_date,
    })
}

/// Build one digest per reaction. Empty input yields an empty list.
pub fn build_reaction_digests(
    message_id: &MessageId,
    reactions: &[Reaction],
) -> Vec<ReactionDigest> {
    reactions
        .iter()
        .map(|r| ReactionDigest {
            message_id: message_id.clone(),
            emoji_id: r.emoji_id.clone(),
            count: r.member_ids.len() as u32,
            members_hash: members_hash(&r.member_ids).to_hex(),
        })
        .collect()
}

/// Build the digest for a member. A missing inbox address digests as the
/// empty string.
pub fn build_member_digest(member: &Member) -> MemberDigest {
    let hash_of = |field: &Option<String>| {
        Sha256Hash::hash(field.as_deref().unwrap_or("").as_bytes()).to_hex()
    };

    MemberDigest {
        address: member.address.clone(),
        inbox_address: member
            .inbox_address
            .clone()
            .unwrap_or_else(|| InboxAddress::from("")),
        display_name_hash: hash_of(&member.display_name),
        icon_hash: hash_of(&member.profile_image),
    }
}
