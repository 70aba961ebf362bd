//! Admin mutators. Every handler verifies the HTTP signature first and then
//! requires the signer to be the configured admin key.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Uri},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use parlor_shared::wire::{short_message_id, ChatMessage};
use parlor_shared::KeyPair;

use crate::api::AppState;
use crate::error::ServerError;
use crate::http_sig;

/// Room wiped and repopulated by the smoke-test seeder.
const TEST_ROOM: &str = "test";

const TEST_SENDERS: &[&str] = &["ada", "grace", "edsger", "barbara", "dennis"];

const MS_PER_DAY: i64 = 86_400_000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/get-room-info", post(get_room_info))
        .route("/api/admin/delete-room", post(delete_room))
        .route(
            "/api/admin/get-recent-attachments",
            post(get_recent_attachments),
        )
        .route("/api/admin/create-test-data", post(create_test_data))
        .route("/api/admin/block-user", post(block_user))
        .route("/api/admin/attachments/{id}/delete", post(delete_attachment))
}

fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    body: &[u8],
) -> Result<String, ServerError> {
    let signer = http_sig::verify_signed_request(headers, "POST", path, body)?;
    http_sig::require_admin(&signer, &state.config)?;
    Ok(signer)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRoomRequest {
    room_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentAttachmentsRequest {
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockUserRequest {
    public_key: String,
}

async fn get_room_info(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    authorize(&state, &headers, uri.path(), &body)?;
    let rooms = state.store.room_summaries()?;
    Ok(Json(json!({ "rooms": rooms })))
}

async fn delete_room(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    authorize(&state, &headers, uri.path(), &body)?;
    let req: DeleteRoomRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?;
    let deleted = state.store.delete_room(&req.room_name)?;
    info!(room = %req.room_name, deleted, "admin deleted room");
    Ok(Json(json!({ "deleted": deleted })))
}

async fn get_recent_attachments(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    authorize(&state, &headers, uri.path(), &body)?;
    let limit = serde_json::from_slice::<RecentAttachmentsRequest>(&body)
        .ok()
        .and_then(|req| req.limit)
        .unwrap_or(100);
    let attachments = state.store.recent_attachments(limit)?;
    Ok(Json(json!({ "attachments": attachments })))
}

/// Remove everything the key ever wrote, then deny it persistence. The block
/// lands even when the content sweep fails; the sweep error is surfaced.
async fn block_user(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    authorize(&state, &headers, uri.path(), &body)?;
    let req: BlockUserRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?;

    let sweep = state.store.delete_user_content(&req.public_key);
    state.store.block_user(&req.public_key)?;
    let removed = sweep?;
    info!(key = %req.public_key, removed, "admin blocked user");
    Ok(Json(json!({ "blocked": true, "messagesRemoved": removed })))
}

async fn delete_attachment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    authorize(&state, &headers, uri.path(), &body)?;
    let deleted = state.store.delete_attachment(id)?;
    info!(id, deleted, "admin deleted attachment");
    Ok(Json(json!({ "deleted": deleted })))
}

async fn create_test_data(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    authorize(&state, &headers, uri.path(), &body)?;
    state.store.wipe_room(TEST_ROOM)?;
    let messages = build_test_messages(Utc::now().timestamp_millis());
    let created = state.store.save_messages(TEST_ROOM, &messages)?;
    info!(created, "seeded test room");
    Ok(Json(json!({ "created": created })))
}

/// 70 messages spanning the last 7 days, 10 per day at random intra-day
/// offsets, signed with a throwaway key so they pass verification like any
/// other persisted message.
fn build_test_messages(now_ms: i64) -> Vec<ChatMessage> {
    let key_pair = KeyPair::generate();
    let mut rng = rand::thread_rng();
    let mut messages = Vec::with_capacity(70);
    for day in 0..7i64 {
        for slot in 0..10usize {
            let offset_ms: i64 = rng.gen_range(0..MS_PER_DAY);
            let sender = TEST_SENDERS[slot % TEST_SENDERS.len()];
            let mut msg = ChatMessage {
                id: short_message_id(),
                timestamp: now_ms - day * MS_PER_DAY - offset_ms,
                sender: sender.to_string(),
                content: format!(
                    "Smoke test message {} from {sender}",
                    day * 10 + slot as i64 + 1
                ),
                public_key: None,
                signature: None,
                state: None,
                attachments: Vec::new(),
            };
            key_pair.sign_chat_message(&mut msg);
            messages.push(msg);
        }
    }
    messages
}
