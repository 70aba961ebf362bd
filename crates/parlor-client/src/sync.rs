//! Reconciliation of the local room cache against server truth.
//!
//! The cache weakly mirrors the server and is never trusted as
//! authoritative: ids present on both sides promote to SAVED, SAVED ids
//! missing upstream were deleted there and are dropped locally, unseen
//! server ids are fetched. Messages still SENT or FAILED are local-only
//! and always survive the diff.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;

use parlor_shared::types::MessageState;
use parlor_shared::wire::ChatMessage;
use parlor_shared::KeyPair;

use crate::api::ApiClient;
use crate::cache::{CacheStore, RoomHistoryItem};
use crate::error::Result;

pub(crate) const MS_PER_DAY: i64 = 86_400_000;

/// Retention windows shorter than this are clamped up.
const MIN_RETENTION_DAYS: i64 = 2;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cached messages older than this many days are evicted locally.
    pub retention_days: i64,
    /// Relay mode: reconcile against the server. Off means pure P2P; the
    /// cache is only pruned and sorted.
    pub server_mode: bool,
    /// How long to wait for an ack before surfacing a failure hint.
    pub ack_grace: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            server_mode: true,
            ack_grace: Duration::from_secs(3),
        }
    }
}

pub struct SyncEngine<C: CacheStore> {
    pub(crate) cache: C,
    pub(crate) api: ApiClient,
    pub(crate) identity: KeyPair,
    pub(crate) display_name: String,
    pub(crate) config: SyncConfig,
}

impl<C: CacheStore> SyncEngine<C> {
    pub fn new(
        cache: C,
        api: ApiClient,
        identity: KeyPair,
        display_name: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        Self {
            cache,
            api,
            identity,
            display_name: display_name.into(),
            config,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn identity(&self) -> &KeyPair {
        &self.identity
    }

    /// Bookmark the room and bring its cache up to date.
    pub async fn open_room(&self, room: &str) -> Result<Vec<ChatMessage>> {
        self.cache.remember_room(RoomHistoryItem {
            room: room.to_string(),
            last_visited: now_ms(),
        })?;
        self.sync_room(room).await
    }

    /// Load, evict outside the retention window, diff against the server id
    /// set, fetch what is missing, and rewrite the cache whole, ascending by
    /// timestamp.
    pub async fn sync_room(&self, room: &str) -> Result<Vec<ChatMessage>> {
        let retention_days = self.config.retention_days.max(MIN_RETENTION_DAYS);
        let cutoff = now_ms() - retention_days * MS_PER_DAY;

        let mut local = self.cache.load_room(room)?;
        local.retain(|m| m.timestamp >= cutoff);

        if !self.config.server_mode {
            sort_ascending(&mut local);
            self.cache.store_room(room, &local)?;
            return Ok(local);
        }

        let server_ids: HashSet<String> = self
            .api
            .message_ids(room, Some(retention_days))
            .await?
            .into_iter()
            .collect();

        let outcome = reconcile(local, &server_ids);
        let mut merged = outcome.kept;
        if !outcome.missing.is_empty() {
            let fetched = self.api.messages_by_ids(room, &outcome.missing).await?;
            for mut msg in fetched {
                msg.state = Some(MessageState::Saved);
                merged.push(msg);
            }
        }

        sort_ascending(&mut merged);
        self.cache.store_room(room, &merged)?;
        Ok(merged)
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn sort_ascending(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
}

pub(crate) struct ReconcileOutcome {
    pub kept: Vec<ChatMessage>,
    /// Server ids absent locally, to fetch. Sorted for determinism.
    pub missing: Vec<String>,
}

pub(crate) fn reconcile(local: Vec<ChatMessage>, server_ids: &HashSet<String>) -> ReconcileOutcome {
    let local_ids: HashSet<&str> = local.iter().map(|m| m.id.as_str()).collect();
    let mut missing: Vec<String> = server_ids
        .iter()
        .filter(|id| !local_ids.contains(id.as_str()))
        .cloned()
        .collect();
    missing.sort();

    let mut kept = Vec::with_capacity(local.len());
    for mut msg in local {
        if server_ids.contains(&msg.id) {
            msg.state = Some(MessageState::Saved);
            kept.push(msg);
        } else if msg.state == Some(MessageState::Saved) {
            // was on the server once, removed upstream: drop it
        } else {
            kept.push(msg);
        }
    }
    ReconcileOutcome { kept, missing }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, timestamp: i64, state: Option<MessageState>) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            timestamp,
            sender: "me".into(),
            content: String::new(),
            public_key: None,
            signature: None,
            state,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn reconcile_promotes_drops_and_fetches() {
        // cache: m10 SAVED, m11 SAVED, m12 SENT (mine, unacked)
        // server window: m10, m13
        let local = vec![
            msg("m10", 1000, Some(MessageState::Saved)),
            msg("m11", 2000, Some(MessageState::Saved)),
            msg("m12", 3000, Some(MessageState::Sent)),
        ];
        let server_ids: HashSet<String> = ["m10", "m13"].iter().map(|s| s.to_string()).collect();

        let outcome = reconcile(local, &server_ids);
        let kept_ids: Vec<_> = outcome.kept.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(kept_ids, vec!["m10", "m12"]);
        assert_eq!(outcome.kept[0].state, Some(MessageState::Saved));
        assert_eq!(outcome.kept[1].state, Some(MessageState::Sent));
        assert_eq!(outcome.missing, vec!["m13".to_string()]);
    }

    #[test]
    fn reconcile_keeps_failed_messages() {
        let local = vec![msg("m1", 1000, Some(MessageState::Failed))];
        let outcome = reconcile(local, &HashSet::new());
        assert_eq!(outcome.kept.len(), 1);
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn sort_is_ascending_with_id_ties() {
        let mut messages = vec![
            msg("b", 2000, None),
            msg("a", 2000, None),
            msg("c", 1000, None),
        ];
        sort_ascending(&mut messages);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn offline_sync_prunes_retention_window() {
        use crate::cache::{CacheStore, MemoryCache};

        let cache = MemoryCache::new();
        let now = now_ms();
        cache
            .store_room(
                "r1",
                &[
                    msg("fresh", now - MS_PER_DAY, None),
                    msg("stale", now - 40 * MS_PER_DAY, None),
                ],
            )
            .unwrap();

        let engine = SyncEngine::new(
            cache,
            ApiClient::new("http://localhost:0"),
            KeyPair::generate(),
            "me",
            SyncConfig {
                server_mode: false,
                ..SyncConfig::default()
            },
        );

        let synced = engine.sync_room("r1").await.unwrap();
        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].id, "fresh");
        assert_eq!(engine.cache().load_room("r1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retention_floor_is_two_days() {
        use crate::cache::{CacheStore, MemoryCache};

        let cache = MemoryCache::new();
        let now = now_ms();
        // 1.5 days old: inside the clamped 2-day floor even though the
        // configured window says 1 day
        cache
            .store_room("r1", &[msg("kept", now - 3 * MS_PER_DAY / 2, None)])
            .unwrap();

        let engine = SyncEngine::new(
            cache,
            ApiClient::new("http://localhost:0"),
            KeyPair::generate(),
            "me",
            SyncConfig {
                retention_days: 1,
                server_mode: false,
                ..SyncConfig::default()
            },
        );

        assert_eq!(engine.sync_room("r1").await.unwrap().len(), 1);
    }
}
