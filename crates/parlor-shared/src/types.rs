use serde::{Deserialize, Serialize};

// Identity on the wire = display name + hex-encoded 32-byte public key.
// The key is the routing address; the name is decoration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub name: String,
    pub public_key: String,
}

impl UserRef {
    pub fn new(name: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_key: public_key.into(),
        }
    }

    pub fn short_key(&self) -> &str {
        let end = self.public_key.len().min(8);
        &self.public_key[..end]
    }
}

/// Delivery state of a chat message as tracked by clients.
///
/// A message persisted by the server is `Saved` by definition; `Sent` and
/// `Failed` only ever exist in client-local caches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageState {
    Sent,
    Saved,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_uses_uppercase_wire_names() {
        assert_eq!(
            serde_json::to_string(&MessageState::Saved).unwrap(),
            "\"SAVED\""
        );
        assert_eq!(
            serde_json::from_str::<MessageState>("\"SENT\"").unwrap(),
            MessageState::Sent
        );
    }

    #[test]
    fn short_key_truncates() {
        let user = UserRef::new("alice", "abcdef0123456789");
        assert_eq!(user.short_key(), "abcdef01");
    }
}
