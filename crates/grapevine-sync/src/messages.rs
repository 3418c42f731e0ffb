//! Sync protocol control payloads.
//!
//! Five payloads carry the whole protocol. Their JSON shapes are
//! wire-visible and must stay bit-compatible: tags are kebab-case under
//! `"type"`, fields are camelCase, optional fields are omitted when absent.

use serde::{Deserialize, Serialize};

use grapevine_core::{
    Address, InboxAddress, Manifest, Member, MemberDigest, Message, MessageId, PeerId, Summary,
    Timestamp,
};

/// A control payload, tagged by `"type"` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncPayload {
    /// Broadcast asking peers what they hold for a channel.
    SyncRequest(SyncRequest),
    /// A candidate's answer: "I have something you may want".
    SyncInfo(SyncInfo),
    /// Sent to the chosen candidate with our full manifest.
    SyncInitiate(SyncInitiate),
    /// The candidate's full manifest in return.
    SyncManifest(SyncManifest),
    /// One chunk of the actual data transfer.
    SyncDelta(SyncDelta),
}

/// Opens a sync round: advertises our summary and a reply window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Where candidates should send their `sync-info`.
    pub inbox_address: InboxAddress,
    /// Unix ms after which replies are ignored.
    pub expiry: Timestamp,
    pub summary: Summary,
}

/// A candidate's summary of what it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub inbox_address: InboxAddress,
    pub summary: Summary,
}

/// Starts the transfer with the selected candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInitiate {
    pub inbox_address: InboxAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Manifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_digests: Option<Vec<MemberDigest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_ids: Option<Vec<PeerId>>,
}

/// The responder's manifest, member digests, and known peer ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    pub inbox_address: InboxAddress,
    pub manifest: Manifest,
    pub member_digests: Vec<MemberDigest>,
    pub peer_ids: Vec<PeerId>,
}

/// One chunk of the data transfer. Exactly one payload per transfer has
/// `is_final == true`, and it is the last one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_delta: Option<MessageDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_delta: Option<ReactionDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_delta: Option<MemberDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_map_delta: Option<PeerMapDelta>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
}

/// Full message records for one chunk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelta {
    /// Messages the recipient does not hold at all.
    #[serde(default)]
    pub new_messages: Vec<Message>,
    /// Messages the recipient holds an older copy of.
    #[serde(default)]
    pub updated_messages: Vec<Message>,
    /// Ids deleted locally; attached only to the last message chunk.
    #[serde(default)]
    pub deleted_message_ids: Vec<MessageId>,
    /// True on the last chunk of the message sequence.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_last: bool,
}

impl MessageDelta {
    /// True when the delta carries nothing.
    pub fn is_empty(&self) -> bool {
        self.new_messages.is_empty()
            && self.updated_messages.is_empty()
            && self.deleted_message_ids.is_empty()
    }
}

/// Reaction member-set updates, one entry per `(message, emoji)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionDelta {
    #[serde(default)]
    pub reactions: Vec<ReactionEntry>,
}

/// The authoritative member set for one reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEntry {
    pub message_id: MessageId,
    pub emoji_id: String,
    /// Empty means the reaction has been fully withdrawn.
    pub member_ids: Vec<Address>,
}

/// Member records the recipient lacks or holds differently.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDelta {
    #[serde(default)]
    pub members: Vec<Member>,
    /// Addresses present remotely but unknown locally.
    #[serde(default)]
    pub removed_addresses: Vec<Address>,
}

impl MemberDelta {
    /// True when the delta carries nothing.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.removed_addresses.is_empty()
    }
}

/// Group-keying entries the recipient lacks. Key material is opaque to the
/// sync core; the encryption layer validates it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMapDelta {
    #[serde(default)]
    pub entries: Vec<PeerEntry>,
}

/// One peer-map entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub peer_id: PeerId,
    /// Opaque public key material.
    pub key_material: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> Summary {
        Summary {
            message_count: 2,
            member_count: 1,
            oldest_message_timestamp: 1000,
            newest_message_timestamp: 2000,
            manifest_hash: "0".repeat(64),
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let payload = SyncPayload::SyncRequest(SyncRequest {
            inbox_address: InboxAddress::from("inbox-1"),
            expiry: 99_000,
            summary: summary(),
        });
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "sync-request");
        assert_eq!(json["inboxAddress"], "inbox-1");
        assert_eq!(json["expiry"], 99_000);
        assert_eq!(json["summary"]["messageCount"], 2);
        assert_eq!(json["summary"]["manifestHash"].as_str().unwrap().len(), 64);
        assert_eq!(json["summary"]["oldestMessageTimestamp"], 1000);
    }

    #[test]
    fn test_initiate_omits_absent_fields() {
        let payload = SyncPayload::SyncInitiate(SyncInitiate {
            inbox_address: InboxAddress::from("inbox-1"),
            manifest: None,
            member_digests: None,
            peer_ids: Some(vec![PeerId(1), PeerId(2)]),
        });
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "sync-initiate");
        assert!(json.get("manifest").is_none());
        assert!(json.get("memberDigests").is_none());
        assert_eq!(json["peerIds"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_delta_final_flag_only_when_set() {
        let plain = SyncDelta::default();
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("isFinal").is_none());

        let fin = SyncDelta {
            is_final: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&fin).unwrap();
        assert_eq!(json["isFinal"], true);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = SyncPayload::SyncInfo(SyncInfo {
            inbox_address: InboxAddress::from("inbox-2"),
            summary: summary(),
        });
        let json = serde_json::to_string(&payload).unwrap();
        let back: SyncPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
