//! Chat message pipeline: verify, filter, persist, acknowledge, fan out.
//!
//! Runs inline in the connection's dispatch loop, so broadcasts from one
//! originator complete in arrival order.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parlor_shared::signature;
use parlor_shared::types::MessageState;
use parlor_shared::wire::{ChatMessage, Frame};

use crate::api::AppState;
use crate::hub::Session;

pub async fn handle_broadcast(
    session: &Session,
    conn_id: Uuid,
    mut message: ChatMessage,
    state: &AppState,
) {
    let Some(public_key) = message.public_key.clone() else {
        debug!(id = %message.id, "broadcast without public key dropped");
        return;
    };

    if let Err(e) = signature::verify_chat_message(&message) {
        warn!(id = %message.id, error = %e, "broadcast failed signature check");
        return;
    }

    match state.store.is_blocked(&public_key) {
        Ok(false) => {}
        Ok(true) => {
            // Silent from the sender's perspective: no ack, no error.
            info!(id = %message.id, "dropping broadcast from blocked key");
            return;
        }
        Err(e) => {
            error!(id = %message.id, error = %e, "block list lookup failed");
            return;
        }
    }

    let persisted = state
        .store
        .get_or_create_room(&session.room)
        .and_then(|room_id| state.store.persist_message(room_id, &message));
    match persisted {
        Ok(inserted) => {
            if !inserted {
                debug!(id = %message.id, "duplicate broadcast id, existing row wins");
            }
        }
        Err(e) => {
            // No ack: the sender's copy stays SENT and it will resend.
            error!(id = %message.id, error = %e, "failed to persist broadcast");
            return;
        }
    }

    message.state = Some(MessageState::Saved);
    let frame = Frame::Broadcast {
        room: session.room.clone(),
        message: message.clone(),
        sender: Some(session.user.clone()),
    };

    for member in state.registry.members(&session.room).await {
        let sent = if member.conn_id == conn_id {
            member.tx.send(Frame::Ack {
                id: message.id.clone(),
            })
        } else {
            member.tx.send(frame.clone())
        };
        if sent.is_err() {
            debug!(user = %member.user.short_key(), "stale member during broadcast fan-out");
        }
    }
}
