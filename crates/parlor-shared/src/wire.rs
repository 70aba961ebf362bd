//! Control-plane frame envelope.
//!
//! Every frame travelling over the live connection is JSON with a `type`
//! discriminator. [`Frame::decode`] is the single entry point that turns raw
//! text into a typed variant; anything that does not parse is a protocol
//! error the caller logs and drops.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MessageState, UserRef};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Frame {
    /// Client -> server. Registers the sender in a room. Signed.
    Join {
        room: String,
        user: UserRef,
        signature: String,
    },

    /// Server -> client. Reply to `join`: everyone else currently in the room.
    RoomInfo {
        room: String,
        participants: Vec<UserRef>,
    },

    /// Server -> room. A participant's connection went away.
    UserLeft { room: String, user: UserRef },

    /// Client -> server -> targeted peer. SDP offer. Signed.
    Offer {
        id: String,
        offer: Value,
        target: UserRef,
        room: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<UserRef>,
        public_key: String,
        signature: String,
    },

    /// Client -> server -> targeted peer. SDP answer. Unsigned; the DTLS
    /// handshake that follows authenticates the peer.
    Answer {
        id: String,
        answer: Value,
        target: UserRef,
        room: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<UserRef>,
    },

    /// Client -> server -> targeted peer. ICE candidate. Unsigned.
    IceCandidate {
        id: String,
        candidate: Value,
        target: UserRef,
        room: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<UserRef>,
    },

    /// Client -> server -> room. A chat message to persist and fan out.
    /// The inner message carries its own signature.
    Broadcast {
        room: String,
        message: ChatMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<UserRef>,
    },

    /// Server -> originator. The broadcast with this id was persisted.
    Ack { id: String },

    /// Server -> room. A message was deleted upstream; drop it from caches.
    DeleteMsg { room: String, message_id: String },
}

impl Frame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Discriminator string, mainly for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Join { .. } => "join",
            Frame::RoomInfo { .. } => "room-info",
            Frame::UserLeft { .. } => "user-left",
            Frame::Offer { .. } => "offer",
            Frame::Answer { .. } => "answer",
            Frame::IceCandidate { .. } => "ice-candidate",
            Frame::Broadcast { .. } => "broadcast",
            Frame::Ack { .. } => "ack",
            Frame::DeleteMsg { .. } => "delete-msg",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Client-generated short opaque id, globally unique across rooms.
    pub id: String,
    /// Milliseconds since the epoch, client clock.
    pub timestamp: i64,
    /// Sender display name.
    pub sender: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MessageState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<WireAttachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: i64,
    /// Data URL (`data:<mime>;base64,<payload>`). Present when carrying bytes;
    /// the server decodes it for storage and re-encodes on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Server-assigned attachment id, present on hydrated reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (mime_type, payload) = rest.split_once(";base64,")?;
    let bytes = BASE64.decode(payload).ok()?;
    Some((mime_type.to_string(), bytes))
}

/// Generate a fresh client-side message id: 10 alphanumeric characters.
pub fn short_message_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}
