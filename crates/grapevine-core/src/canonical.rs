//! Canonical strings and hashes.
//!
//! Every digest in the sync protocol is SHA-256 over a canonical string.
//! The canonical form must be byte-identical across implementations: fields
//! are joined with `:`, list entries with `\n`, and missing optional fields
//! canonicalise as empty strings.

use crate::error::CoreError;
use crate::hash::Sha256Hash;
use crate::message::{MessageContent, Reaction};
use crate::types::{Address, MessageId};

/// Hash of a message id, the unit of the XOR manifest accumulator.
pub fn id_hash(message_id: &MessageId) -> Sha256Hash {
    Sha256Hash::hash(message_id.as_str().as_bytes())
}

/// Hash of the canonical string for a content variant.
///
/// Fails with [`CoreError::UnsupportedContent`] when the variant is unknown
/// to this build; such a message cannot be synced until the host upgrades.
pub fn content_hash(content: &MessageContent) -> Result<Sha256Hash, CoreError> {
    Ok(Sha256Hash::hash(canonical_content(content)?.as_bytes()))
}

/// Hash of a message's reaction list.
///
/// Reactions are sorted by emoji id ascending, member ids sorted within each
/// reaction, one line per reaction, lines joined with `\n`.
pub fn reactions_hash(reactions: &[Reaction]) -> Sha256Hash {
    let mut sorted: Vec<&Reaction> = reactions.iter().collect();
    sorted.sort_by(|a, b| a.emoji_id.cmp(&b.emoji_id));

    let lines: Vec<String> = sorted
        .iter()
        .map(|r| {
            let mut members: Vec<&str> = r.member_ids.iter().map(Address::as_str).collect();
            members.sort_unstable();
            format!("{}:{}", r.emoji_id, members.join(","))
        })
        .collect();
    Sha256Hash::hash(lines.join("\n").as_bytes())
}

/// Hash of a reaction's member set: sorted member ids joined with `,`.
pub fn members_hash(member_ids: &[Address]) -> Sha256Hash {
    let mut members: Vec<&str> = member_ids.iter().map(Address::as_str).collect();
    members.sort_unstable();
    Sha256Hash::hash(members.join(",").as_bytes())
}

/// Build the canonical string for a content variant.
fn canonical_content(content: &MessageContent) -> Result<String, CoreError> {
    let text = match content {
        MessageContent::Post {
            sender_id,
            text,
            reply_id,
        } => with_reply(format!("{sender_id}:post:{text}"), reply_id),

        MessageContent::Embed {
            sender_id,
            image_url,
            video_url,
            reply_id,
        } => with_reply(
            format!(
                "{sender_id}:embed:{}:{}",
                opt(image_url),
                opt(video_url)
            ),
            reply_id,
        ),

        MessageContent::Sticker {
            sender_id,
            sticker_id,
            reply_id,
        } => with_reply(format!("{sender_id}:sticker:{sticker_id}"), reply_id),

        MessageContent::EditMessage {
            sender_id,
            original_id,
            edited_text,
            edited_at,
        } => format!("{sender_id}:edit-message:{original_id}:{edited_text}:{edited_at}"),

        MessageContent::RemoveMessage {
            sender_id,
            remove_id,
        } => format!("{sender_id}:remove-message:{remove_id}"),

        MessageContent::Join { sender_id } => format!("{sender_id}:join"),
        MessageContent::Leave { sender_id } => format!("{sender_id}:leave"),
        MessageContent::Kick { sender_id } => format!("{sender_id}:kick"),

        MessageContent::Event { sender_id, text } => format!("{sender_id}:event:{text}"),

        MessageContent::UpdateProfile {
            sender_id,
            display_name,
            user_icon,
        } => format!(
            "{sender_id}:update-profile:{display_name}:{}",
            opt(user_icon)
        ),

        MessageContent::Mute {
            sender_id,
            target,
            action,
            mute_id,
        } => format!("{sender_id}:mute:{target}:{action}:{mute_id}"),

        MessageContent::Pin {
            sender_id,
            target_message_id,
            action,
        } => format!("{sender_id}:pin:{target_message_id}:{action}"),

        MessageContent::Reaction {
            sender_id,
            message_id,
            reaction,
        } => format!("{sender_id}:reaction:{message_id}:{reaction}"),

        MessageContent::RemoveReaction {
            sender_id,
            message_id,
            reaction,
        } => format!("{sender_id}:remove-reaction:{message_id}:{reaction}"),

        MessageContent::DeleteConversation { sender_id } => {
            format!("{sender_id}:delete-conversation")
        }

        MessageContent::Unknown => return Err(CoreError::UnsupportedContent),
    };
    Ok(text)
}

fn with_reply(base: String, reply_id: &Option<MessageId>) -> String {
    match reply_id {
        Some(id) => format!("{base}:reply:{id}"),
        None => base,
    }
}

fn opt(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("")
}
