//! HTTP client for the hub's history and signed user endpoints.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use parlor_shared::wire::ChatMessage;
use parlor_shared::KeyPair;

use crate::error::Result;

pub struct ApiClient {
    base_url: String,
    http: Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageIdsResponse {
    message_ids: Vec<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct MessagesByIdRequest<'a> {
    ids: &'a [String],
}

#[derive(Serialize)]
struct SendMessagesRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagesResponse {
    all_ok: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMessageRequest<'a> {
    message_id: &'a str,
    room_name: &'a str,
}

#[derive(Deserialize)]
struct DeleteMessageResponse {
    deleted: bool,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            http: Client::new(),
        }
    }

    /// Server-side id set for a room, optionally windowed to the last N days.
    pub async fn message_ids(&self, room: &str, days_of_history: Option<i64>) -> Result<Vec<String>> {
        let mut request = self
            .http
            .get(format!("{}/api/rooms/{room}/message-ids", self.base_url));
        if let Some(days) = days_of_history {
            request = request.query(&[("daysOfHistory", days)]);
        }
        let response: MessageIdsResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.message_ids)
    }

    /// Body-posted so large id lists survive; room-scoped on the server.
    pub async fn messages_by_ids(&self, room: &str, ids: &[String]) -> Result<Vec<ChatMessage>> {
        let response: MessagesResponse = self
            .http
            .post(format!(
                "{}/api/rooms/{room}/get-messages-by-id",
                self.base_url
            ))
            .json(&MessagesByIdRequest { ids })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.messages)
    }

    pub async fn send_messages(
        &self,
        room: &str,
        messages: &[ChatMessage],
        identity: &KeyPair,
    ) -> Result<bool> {
        let path = format!("/api/rooms/{room}/send-messages");
        let body = serde_json::to_vec(&SendMessagesRequest { messages })?;
        let response = self.signed_post(&path, body, identity).await?;
        let parsed: SendMessagesResponse = response.json().await?;
        Ok(parsed.all_ok)
    }

    pub async fn delete_message(
        &self,
        room: &str,
        message_id: &str,
        identity: &KeyPair,
    ) -> Result<bool> {
        let body = serde_json::to_vec(&DeleteMessageRequest {
            message_id,
            room_name: room,
        })?;
        let response = self
            .signed_post("/api/delete-message", body, identity)
            .await?;
        let parsed: DeleteMessageResponse = response.json().await?;
        Ok(parsed.deleted)
    }

    async fn signed_post(
        &self,
        path: &str,
        body: Vec<u8>,
        identity: &KeyPair,
    ) -> Result<reqwest::Response> {
        let signature = identity.sign_http_request("POST", path, &body);
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("public-key", identity.public_key_hex())
            .header("signature", signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        response.error_for_status().map_err(Into::into)
    }
}
