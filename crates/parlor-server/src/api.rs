//! HTTP surface: history reads, signed user mutators, and the live-connection
//! upgrade path. Admin mutators live in [`crate::admin`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum::http::HeaderMap;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parlor_shared::signature;
use parlor_shared::wire::ChatMessage;
use parlor_store::{RoomKey, Store};

use crate::admin;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http_sig;
use crate::hub;
use crate::registry::RoomRegistry;

/// Days-of-history requests below this are clamped up.
const MIN_HISTORY_DAYS: i64 = 2;

const MS_PER_DAY: i64 = 86_400_000;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub registry: RoomRegistry,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<Store>, config: Arc<ServerConfig>) -> Self {
        Self {
            store,
            registry: RoomRegistry::new(),
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(hub::ws_handler))
        .route("/api/rooms/{room}/message-ids", get(message_ids))
        .route("/api/rooms/{room}/get-messages-by-id", post(messages_by_id))
        .route("/api/rooms/{room}/send-messages", post(send_messages))
        .route("/api/messages", get(message_history))
        .route("/api/attachments/{id}", get(attachment_bytes))
        .route("/api/delete-message", post(delete_message))
        .merge(admin::routes())
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Attach the live-connection upgrade path to an externally constructed
/// router, for hosts that run their own HTTP server.
pub fn attach_ws(router: Router<AppState>) -> Router<AppState> {
    router.route("/ws", get(hub::ws_handler))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);
    info!(addr = %addr, "Starting HTTP API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageIdsQuery {
    days_of_history: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageIdsResponse {
    message_ids: Vec<String>,
}

#[derive(Deserialize)]
struct MessagesByIdRequest {
    ids: Vec<String>,
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    room_name: String,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
struct SendMessagesRequest {
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagesResponse {
    all_ok: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMessageRequest {
    message_id: String,
    room_name: String,
}

async fn message_ids(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Query(query): Query<MessageIdsQuery>,
) -> Result<Json<MessageIdsResponse>, ServerError> {
    let since = query.days_of_history.map(|days| {
        let days = days.max(MIN_HISTORY_DAYS);
        Utc::now().timestamp_millis() - days * MS_PER_DAY
    });
    let message_ids = state
        .store
        .message_ids_for_room(&RoomKey::Name(room), since)?;
    Ok(Json(MessageIdsResponse { message_ids }))
}

async fn messages_by_id(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Json(req): Json<MessagesByIdRequest>,
) -> Result<Json<MessagesResponse>, ServerError> {
    let messages = state
        .store
        .messages_by_ids(&req.ids, &RoomKey::Name(room))?;
    Ok(Json(MessagesResponse { messages }))
}

/// Bulk persistence over HTTP; used by clients to resend unacknowledged
/// messages. Each message carries its own signature; blocked senders and
/// duplicate ids both read as success so nothing is leaked.
async fn send_messages(
    State(state): State<AppState>,
    Path(room): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SendMessagesResponse>, ServerError> {
    http_sig::verify_signed_request(&headers, "POST", uri.path(), &body)?;
    let req: SendMessagesRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?;

    let mut all_ok = true;
    let mut accepted = Vec::with_capacity(req.messages.len());
    for msg in req.messages {
        if signature::verify_chat_message(&msg).is_err() {
            all_ok = false;
            continue;
        }
        if let Some(key) = msg.public_key.as_deref() {
            if state.store.is_blocked(key)? {
                continue;
            }
        }
        accepted.push(msg);
    }
    state.store.save_messages(&room, &accepted)?;
    Ok(Json(SendMessagesResponse { all_ok }))
}

async fn message_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagesResponse>, ServerError> {
    let messages = state.store.messages_for_room(
        &query.room_name,
        query.limit.unwrap_or(100),
        query.offset.unwrap_or(0),
    )?;
    Ok(Json(MessagesResponse { messages }))
}

async fn attachment_bytes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ServerError> {
    let attachment = state.store.attachment(id)?;
    let headers = [
        (header::CONTENT_TYPE, attachment.mime_type.clone()),
        (header::CONTENT_LENGTH, attachment.data.len().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", attachment.name),
        ),
    ];
    Ok((headers, attachment.data).into_response())
}

async fn delete_message(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServerError> {
    let requester = http_sig::verify_signed_request(&headers, "POST", uri.path(), &body)?;
    let req: DeleteMessageRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))?;

    let deleted = state.store.delete_message(
        &req.message_id,
        &requester,
        state.config.admin_public_key.as_deref(),
    )?;
    if deleted {
        hub::send_delete_msg(&state, &req.room_name, &req.message_id, &requester).await;
    }
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
