//! Canonical byte sequences for signing.
//!
//! Each signable frame variant canonicalizes as the JSON encoding of an array
//! whose first element is a variant tag. The field list and order below are
//! part of the wire contract: both ends must produce identical bytes or every
//! signature breaks. The `signature` field itself and transient routing
//! fields (`sender`, `target`, receive-side annotations) are never included.
//! Strings are UTF-8, timestamps plain decimal.

use serde_json::{json, Value};

use crate::types::UserRef;
use crate::wire::ChatMessage;

fn to_bytes(value: Value) -> Vec<u8> {
    // A Value only ever has string keys, so this cannot fail.
    serde_json::to_vec(&value).expect("canonical JSON array serializes")
}

/// `["message", id, timestamp, sender, content, publicKey]`
pub fn chat_message(msg: &ChatMessage) -> Vec<u8> {
    to_bytes(json!([
        "message",
        msg.id,
        msg.timestamp,
        msg.sender,
        msg.content,
        msg.public_key.as_deref().unwrap_or(""),
    ]))
}

/// `["join", room, name, publicKey]`
pub fn join(room: &str, user: &UserRef) -> Vec<u8> {
    to_bytes(json!(["join", room, user.name, user.public_key]))
}

/// `["offer", id, room, offer, publicKey]`
pub fn offer(id: &str, room: &str, offer: &Value, public_key: &str) -> Vec<u8> {
    to_bytes(json!(["offer", id, room, offer, public_key]))
}

/// `["http", METHOD, path, body]` for signed HTTP requests.
pub fn http_request(method: &str, path: &str, body: &[u8]) -> Vec<u8> {
    to_bytes(json!([
        "http",
        method,
        path,
        String::from_utf8_lossy(body),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChatMessage {
        ChatMessage {
            id: "m1".into(),
            timestamp: 1700000000123,
            sender: "alice".into(),
            content: "hi".into(),
            public_key: Some("aabb".into()),
            signature: Some("ignored".into()),
            state: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn chat_message_bytes_are_stable() {
        let expected = br#"["message","m1",1700000000123,"alice","hi","aabb"]"#;
        assert_eq!(chat_message(&sample()), expected);
    }

    #[test]
    fn signature_field_does_not_affect_bytes() {
        let mut msg = sample();
        let before = chat_message(&msg);
        msg.signature = Some("something else entirely".into());
        msg.state = Some(crate::types::MessageState::Failed);
        assert_eq!(chat_message(&msg), before);
    }

    #[test]
    fn join_bytes() {
        let user = UserRef::new("bob", "ccdd");
        assert_eq!(join("r1", &user), br#"["join","r1","bob","ccdd"]"#);
    }

    #[test]
    fn offer_includes_sdp_value() {
        let sdp = json!({"sdp": "v=0", "type": "offer"});
        let bytes = offer("o1", "r1", &sdp, "aabb");
        // serde_json maps are ordered, so nested objects canonicalize too
        assert_eq!(
            bytes,
            br#"["offer","o1","r1",{"sdp":"v=0","type":"offer"},"aabb"]"#
        );
    }

    #[test]
    fn http_request_bytes() {
        let bytes = http_request("POST", "/api/delete-message", b"{\"id\":1}");
        assert_eq!(
            bytes,
            br#"["http","POST","/api/delete-message","{\"id\":1}"]"#
        );
    }
}
