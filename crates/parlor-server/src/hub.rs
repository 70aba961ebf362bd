//! Per-connection lifecycle and frame dispatch.
//!
//! Each accepted WebSocket runs one dispatch loop: decode a frame, route it,
//! never let a handler error escape. A connection is OPENING until its signed
//! `join` is accepted, then JOINED; the terminal cleanup step (remove
//! participant, notify room) lives in [`disconnect`] so close and error paths
//! share it.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parlor_shared::signature;
use parlor_shared::types::UserRef;
use parlor_shared::wire::Frame;

use crate::api::AppState;
use crate::broadcast;
use crate::registry::Member;

/// What a connection knows once its join was accepted.
#[derive(Debug, Clone)]
pub struct Session {
    pub room: String,
    pub user: UserRef,
}

/// Dispatch-side handle for one live connection.
pub struct ConnHandle {
    pub conn_id: Uuid,
    pub tx: mpsc::UnboundedSender<Frame>,
    pub session: Option<Session>,
}

impl ConnHandle {
    pub fn new(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            tx,
            session: None,
        }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    // Writer task: everything outbound funnels through one channel so
    // fan-out from other connections never touches the socket directly.
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame.encode() {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode outbound frame"),
            }
        }
    });

    let mut conn = ConnHandle::new(tx);
    debug!(conn_id = %conn.conn_id, "connection opened");

    loop {
        let next = match state.config.idle_timeout {
            Some(limit) => match timeout(limit, ws_rx.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(conn_id = %conn.conn_id, "closing idle connection");
                    break;
                }
            },
            None => ws_rx.next().await,
        };
        let Some(result) = next else { break };
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id = %conn.conn_id, error = %e, "websocket read error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match Frame::decode(text.as_str()) {
                Ok(frame) => process_frame(&mut conn, frame, &state).await,
                Err(e) => {
                    warn!(conn_id = %conn.conn_id, error = %e, "dropping undecodable frame")
                }
            },
            Message::Close(_) => break,
            // binary, ping, pong: nothing to dispatch
            _ => {}
        }
    }

    disconnect(&mut conn, &state).await;
    debug!(conn_id = %conn.conn_id, "connection closed");
}

/// Route one inbound frame. Errors are logged and the frame dropped; nothing
/// here may take the connection down.
pub async fn process_frame(conn: &mut ConnHandle, frame: Frame, state: &AppState) {
    match frame {
        Frame::Join {
            room,
            user,
            signature: sig,
        } => {
            if let Err(e) = signature::verify_join(&room, &user, &sig) {
                warn!(room = %room, user = %user.short_key(), error = %e, "rejecting join");
                return;
            }
            // A joined connection may switch rooms; that is a leave + join.
            if conn.session.is_some() {
                disconnect(conn, state).await;
            }
            let member = Member {
                user: user.clone(),
                conn_id: conn.conn_id,
                tx: conn.tx.clone(),
            };
            let participants = state.registry.join(&room, member).await;
            info!(room = %room, user = %user.short_key(), "participant joined");
            send(conn, Frame::RoomInfo {
                room: room.clone(),
                participants,
            });
            conn.session = Some(Session { room, user });
        }

        Frame::Offer {
            id,
            offer,
            target,
            room: _,
            sender: _,
            public_key,
            signature: sig,
        } => {
            let Some(session) = conn.session.clone() else {
                drop_unjoined("offer");
                return;
            };
            if let Err(e) = signature::verify_offer(&id, &session.room, &offer, &public_key, &sig) {
                warn!(id = %id, error = %e, "rejecting offer");
                return;
            }
            let target_key = target.public_key.clone();
            forward(
                state,
                &session,
                &target_key,
                Frame::Offer {
                    id,
                    offer,
                    target,
                    room: session.room.clone(),
                    sender: Some(session.user.clone()),
                    public_key,
                    signature: sig,
                },
            )
            .await;
        }

        Frame::Answer {
            id,
            answer,
            target,
            room: _,
            sender: _,
        } => {
            let Some(session) = conn.session.clone() else {
                drop_unjoined("answer");
                return;
            };
            let target_key = target.public_key.clone();
            forward(
                state,
                &session,
                &target_key,
                Frame::Answer {
                    id,
                    answer,
                    target,
                    room: session.room.clone(),
                    sender: Some(session.user.clone()),
                },
            )
            .await;
        }

        Frame::IceCandidate {
            id,
            candidate,
            target,
            room: _,
            sender: _,
        } => {
            let Some(session) = conn.session.clone() else {
                drop_unjoined("ice-candidate");
                return;
            };
            let target_key = target.public_key.clone();
            forward(
                state,
                &session,
                &target_key,
                Frame::IceCandidate {
                    id,
                    candidate,
                    target,
                    room: session.room.clone(),
                    sender: Some(session.user.clone()),
                },
            )
            .await;
        }

        Frame::Broadcast { message, .. } => {
            let Some(session) = conn.session.clone() else {
                drop_unjoined("broadcast");
                return;
            };
            broadcast::handle_broadcast(&session, conn.conn_id, message, state).await;
        }

        // Server-originated frame types arriving inbound are protocol noise.
        other => {
            debug!(kind = other.kind(), "dropping unexpected inbound frame");
        }
    }
}

/// Targeted signaling forward: the target is looked up in the *sender's*
/// room; a missing or foreign target drops the frame silently.
async fn forward(state: &AppState, session: &Session, target_key: &str, frame: Frame) {
    match state.registry.member(&session.room, target_key).await {
        Some(member) => {
            if member.tx.send(frame).is_err() {
                debug!(target = %target_key, "target connection already gone");
            }
        }
        None => {
            debug!(room = %session.room, target = %target_key, "signaling target not in room");
        }
    }
}

fn send(conn: &ConnHandle, frame: Frame) {
    if conn.tx.send(frame).is_err() {
        debug!(conn_id = %conn.conn_id, "connection writer already gone");
    }
}

fn drop_unjoined(kind: &str) {
    debug!(kind, "dropping frame from connection that has not joined");
}

/// Terminal cleanup: deregister and tell the room. Safe to call twice.
pub async fn disconnect(conn: &mut ConnHandle, state: &AppState) {
    let Some(session) = conn.session.take() else {
        return;
    };
    let removed = state
        .registry
        .leave(&session.room, &session.user.public_key, conn.conn_id)
        .await;
    if removed {
        info!(room = %session.room, user = %session.user.short_key(), "participant left");
        let frame = Frame::UserLeft {
            room: session.room.clone(),
            user: session.user.clone(),
        };
        for member in state.registry.members(&session.room).await {
            if member.tx.send(frame.clone()).is_err() {
                debug!(user = %member.user.short_key(), "stale member during user-left fan-out");
            }
        }
    }
}

/// Fan a delete-msg notice to every live member of a room except the
/// requester, so caches update without polling.
pub async fn send_delete_msg(state: &AppState, room: &str, message_id: &str, requester_key: &str) {
    let frame = Frame::DeleteMsg {
        room: room.to_string(),
        message_id: message_id.to_string(),
    };
    for member in state.registry.members(room).await {
        if member.user.public_key != requester_key {
            let _ = member.tx.send(frame.clone());
        }
    }
}
