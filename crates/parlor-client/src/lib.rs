pub mod api;
pub mod cache;
pub mod outbox;
pub mod sync;

mod error;

pub use api::ApiClient;
pub use cache::{CacheStore, MemoryCache, RoomHistoryItem, StorageUsage};
pub use error::ClientError;
pub use outbox::{LiveLink, PrunePrompt, SyncNotifier};
pub use sync::{SyncConfig, SyncEngine};
