use serde::{Deserialize, Serialize};

/// Room lookup key: the registry speaks names, cached clients may hold the
/// numeric id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomKey {
    Id(i64),
    Name(String),
}

impl From<i64> for RoomKey {
    fn from(id: i64) -> Self {
        RoomKey::Id(id)
    }
}

impl From<&str> for RoomKey {
    fn from(name: &str) -> Self {
        RoomKey::Name(name.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub name: String,
    pub message_count: i64,
}

/// An attachment row with its raw bytes, as served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub id: i64,
    pub message_id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub data: Vec<u8>,
}

/// Attachment metadata joined with its parent message and room, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecentAttachment {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: i64,
    pub room: String,
    pub sender: String,
    pub public_key: Option<String>,
    pub timestamp: i64,
}
