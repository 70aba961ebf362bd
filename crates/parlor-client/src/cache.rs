//! Client-local storage seam.
//!
//! Room caches are whole blobs keyed by room name and always rewritten whole
//! by the sync engine, which sidesteps partial-update consistency bugs. The
//! browser's IndexedDB sits behind this trait in a deployed client; the
//! in-memory implementation doubles as the test cache.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use parlor_shared::wire::ChatMessage;

use crate::error::Result;

/// A visited-room bookmark.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomHistoryItem {
    pub room: String,
    pub last_visited: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

impl StorageUsage {
    /// Near-quota: above 90% used, or not enough headroom for `incoming`.
    /// A zero quota means the backend reported no limit.
    pub fn needs_pruning(&self, incoming: u64) -> bool {
        if self.quota_bytes == 0 {
            return false;
        }
        let remaining = self.quota_bytes.saturating_sub(self.used_bytes);
        self.used_bytes * 10 > self.quota_bytes * 9 || remaining < incoming
    }
}

pub trait CacheStore: Send + Sync {
    fn load_room(&self, room: &str) -> Result<Vec<ChatMessage>>;
    fn store_room(&self, room: &str, messages: &[ChatMessage]) -> Result<()>;
    fn room_history(&self) -> Result<Vec<RoomHistoryItem>>;
    fn remember_room(&self, item: RoomHistoryItem) -> Result<()>;
    fn usage(&self) -> Result<StorageUsage>;
}

/// Rough per-message footprint, used for quota accounting.
pub fn approx_message_bytes(msg: &ChatMessage) -> u64 {
    let attachment_bytes: usize = msg
        .attachments
        .iter()
        .map(|a| a.data.as_deref().map(str::len).unwrap_or(0))
        .sum();
    (msg.content.len() + attachment_bytes + 256) as u64
}

#[derive(Default)]
pub struct MemoryCache {
    rooms: Mutex<HashMap<String, Vec<ChatMessage>>>,
    history: Mutex<Vec<RoomHistoryItem>>,
    quota_bytes: u64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that reports a storage quota, for exercising pruning.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            quota_bytes,
            ..Self::default()
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for MemoryCache {
    fn load_room(&self, room: &str) -> Result<Vec<ChatMessage>> {
        Ok(Self::lock(&self.rooms).get(room).cloned().unwrap_or_default())
    }

    fn store_room(&self, room: &str, messages: &[ChatMessage]) -> Result<()> {
        Self::lock(&self.rooms).insert(room.to_string(), messages.to_vec());
        Ok(())
    }

    fn room_history(&self) -> Result<Vec<RoomHistoryItem>> {
        Ok(Self::lock(&self.history).clone())
    }

    fn remember_room(&self, item: RoomHistoryItem) -> Result<()> {
        let mut history = Self::lock(&self.history);
        match history.iter_mut().find(|h| h.room == item.room) {
            Some(existing) => existing.last_visited = item.last_visited,
            None => history.push(item),
        }
        Ok(())
    }

    fn usage(&self) -> Result<StorageUsage> {
        let used_bytes = Self::lock(&self.rooms)
            .values()
            .flatten()
            .map(approx_message_bytes)
            .sum();
        Ok(StorageUsage {
            used_bytes,
            quota_bytes: self.quota_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            timestamp: 1000,
            sender: "alice".into(),
            content: "hi".into(),
            public_key: None,
            signature: None,
            state: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn rooms_are_stored_whole() {
        let cache = MemoryCache::new();
        assert!(cache.load_room("r1").unwrap().is_empty());
        cache.store_room("r1", &[msg("a"), msg("b")]).unwrap();
        cache.store_room("r1", &[msg("c")]).unwrap();
        let loaded = cache.load_room("r1").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }

    #[test]
    fn bookmarks_update_in_place() {
        let cache = MemoryCache::new();
        cache
            .remember_room(RoomHistoryItem {
                room: "r1".into(),
                last_visited: 1,
            })
            .unwrap();
        cache
            .remember_room(RoomHistoryItem {
                room: "r1".into(),
                last_visited: 2,
            })
            .unwrap();
        let history = cache.room_history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].last_visited, 2);
    }

    #[test]
    fn needs_pruning_thresholds() {
        let none = StorageUsage {
            used_bytes: 100,
            quota_bytes: 0,
        };
        assert!(!none.needs_pruning(10_000));

        let roomy = StorageUsage {
            used_bytes: 100,
            quota_bytes: 1000,
        };
        assert!(!roomy.needs_pruning(100));
        assert!(roomy.needs_pruning(950));

        let tight = StorageUsage {
            used_bytes: 950,
            quota_bytes: 1000,
        };
        assert!(tight.needs_pruning(0));
    }
}
