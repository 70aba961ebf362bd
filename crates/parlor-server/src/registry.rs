//! In-memory map of live rooms and their participants.
//!
//! Persisted room rows are untouched by anything here: the registry tracks
//! only live connections and is reclaimed as rooms empty out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use parlor_shared::types::UserRef;
use parlor_shared::wire::Frame;

/// A live (connection, identity) binding inside a room.
#[derive(Debug, Clone)]
pub struct Member {
    pub user: UserRef,
    pub conn_id: Uuid,
    pub tx: mpsc::UnboundedSender<Frame>,
}

#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, HashMap<String, Member>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member, creating the room entry on demand. A second
    /// connection joining under the same key supersedes the earlier slot
    /// (last-writer-wins); the earlier connection stays open but unroutable.
    ///
    /// Returns a snapshot of the *other* participants, taken before insert,
    /// for the room-info reply.
    pub async fn join(&self, room: &str, member: Member) -> Vec<UserRef> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms.entry(room.to_string()).or_default();
        let others = entry
            .values()
            .filter(|m| m.user.public_key != member.user.public_key)
            .map(|m| m.user.clone())
            .collect();
        entry.insert(member.user.public_key.clone(), member);
        others
    }

    /// Remove a member, but only if the slot still belongs to `conn_id`:
    /// a superseded connection closing must not evict its successor.
    /// The room entry is dropped when its last member leaves.
    pub async fn leave(&self, room: &str, public_key: &str, conn_id: Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.get_mut(room) else {
            return false;
        };
        let owned = entry
            .get(public_key)
            .map(|m| m.conn_id == conn_id)
            .unwrap_or(false);
        if owned {
            entry.remove(public_key);
            if entry.is_empty() {
                rooms.remove(room);
            }
        }
        owned
    }

    /// Defensive copy of a room's participant set.
    pub async fn participants(&self, room: &str) -> Vec<UserRef> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|entry| entry.values().map(|m| m.user.clone()).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the members (with their connection handles) for fan-out.
    pub async fn members(&self, room: &str) -> Vec<Member> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Look one member up by public key for targeted signaling forwards.
    pub async fn member(&self, room: &str, public_key: &str) -> Option<Member> {
        let rooms = self.rooms.read().await;
        rooms.get(room)?.get(public_key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, key: &str) -> (Member, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Member {
                user: UserRef::new(name, key),
                conn_id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn join_returns_prior_participants_only() {
        let registry = RoomRegistry::new();
        let (alice, _rx_a) = member("alice", "aa");
        let (bob, _rx_b) = member("bob", "bb");

        assert!(registry.join("r1", alice).await.is_empty());
        let seen = registry.join("r1", bob).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "alice");
        assert_eq!(registry.participants("r1").await.len(), 2);
    }

    #[tokio::test]
    async fn same_key_last_writer_wins() {
        let registry = RoomRegistry::new();
        let (first, _rx1) = member("alice", "aa");
        let first_conn = first.conn_id;
        let (second, _rx2) = member("alice-again", "aa");
        let second_conn = second.conn_id;

        registry.join("r1", first).await;
        registry.join("r1", second).await;
        assert_eq!(registry.participants("r1").await.len(), 1);

        // the stale connection closing does not evict the new slot
        assert!(!registry.leave("r1", "aa", first_conn).await);
        assert_eq!(registry.participants("r1").await.len(), 1);

        assert!(registry.leave("r1", "aa", second_conn).await);
        assert!(registry.participants("r1").await.is_empty());
    }

    #[tokio::test]
    async fn empty_room_entry_is_reclaimed() {
        let registry = RoomRegistry::new();
        let (alice, _rx) = member("alice", "aa");
        let conn = alice.conn_id;
        registry.join("r1", alice).await;
        registry.leave("r1", "aa", conn).await;
        assert!(registry.members("r1").await.is_empty());
        assert!(registry.member("r1", "aa").await.is_none());
    }
}
