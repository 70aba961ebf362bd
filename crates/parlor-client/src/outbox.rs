//! Sending side of the client: id assignment, signing, live push, state
//! bookkeeping, ack promotion, resend, and quota pruning.

use tracing::debug;

use parlor_shared::types::MessageState;
use parlor_shared::wire::{short_message_id, ChatMessage, Frame, WireAttachment};

use crate::cache::{approx_message_bytes, CacheStore};
use crate::error::Result;
use crate::sync::{now_ms, sort_ascending, SyncEngine};

/// Transport seam for the live connection. Returns whether the push was
/// handed to the socket; delivery is only confirmed by a later ack.
pub trait LiveLink {
    fn send_frame(&self, frame: &Frame) -> bool;
}

/// Failure surface; implementations show a non-blocking hint.
pub trait SyncNotifier {
    fn message_failed(&self, room: &str, message_id: &str);
}

/// Quota prompt seam; pruning drops data and needs explicit confirmation.
pub trait PrunePrompt {
    fn confirm_prune(&self, room: &str) -> bool;
}

impl<C: CacheStore> SyncEngine<C> {
    /// Assemble, sign, push through the live connection, and record locally
    /// as SENT (or FAILED when the push was refused).
    pub fn send_message(
        &self,
        room: &str,
        content: &str,
        attachments: Vec<WireAttachment>,
        link: &dyn LiveLink,
        prompt: &dyn PrunePrompt,
    ) -> Result<ChatMessage> {
        let mut msg = ChatMessage {
            id: short_message_id(),
            timestamp: now_ms(),
            sender: self.display_name.clone(),
            content: content.to_string(),
            public_key: None,
            signature: None,
            state: None,
            attachments,
        };
        self.identity.sign_chat_message(&mut msg);

        self.prune_if_needed(room, approx_message_bytes(&msg), prompt)?;

        let pushed = link.send_frame(&Frame::Broadcast {
            room: room.to_string(),
            message: msg.clone(),
            sender: None,
        });
        msg.state = Some(if pushed {
            MessageState::Sent
        } else {
            MessageState::Failed
        });

        let mut messages = self.cache.load_room(room)?;
        upsert(&mut messages, msg.clone());
        sort_ascending(&mut messages);
        self.cache.store_room(room, &messages)?;
        Ok(msg)
    }

    /// Wait out the ack grace period, then surface a failure hint if the
    /// message never reached SAVED. Callers spawn this after a send.
    pub async fn confirm_delivery(
        &self,
        room: &str,
        message_id: &str,
        notifier: &dyn SyncNotifier,
    ) -> Result<()> {
        tokio::time::sleep(self.config.ack_grace).await;
        let saved = self
            .cache
            .load_room(room)?
            .iter()
            .any(|m| m.id == message_id && m.state == Some(MessageState::Saved));
        if !saved {
            notifier.message_failed(room, message_id);
        }
        Ok(())
    }

    /// An ack carries the message id only; promote the local copy to SAVED.
    pub fn handle_ack(&self, room: &str, message_id: &str) -> Result<()> {
        let mut messages = self.cache.load_room(room)?;
        let mut changed = false;
        for msg in &mut messages {
            if msg.id == message_id && msg.state != Some(MessageState::Saved) {
                msg.state = Some(MessageState::Saved);
                changed = true;
            }
        }
        if changed {
            self.cache.store_room(room, &messages)?;
        }
        Ok(())
    }

    /// A broadcast observed from the server is SAVED by definition. Dedup is
    /// keyed on id only: a replay of a known id promotes the existing copy
    /// instead of appending.
    pub fn handle_incoming(&self, room: &str, mut message: ChatMessage) -> Result<()> {
        message.state = Some(MessageState::Saved);
        let mut messages = self.cache.load_room(room)?;
        upsert(&mut messages, message);
        sort_ascending(&mut messages);
        self.cache.store_room(room, &messages)?;
        Ok(())
    }

    /// A delete-msg notice from the server drops the local copy.
    pub fn handle_delete(&self, room: &str, message_id: &str) -> Result<()> {
        let mut messages = self.cache.load_room(room)?;
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        if messages.len() != before {
            self.cache.store_room(room, &messages)?;
        }
        Ok(())
    }

    /// Re-push every message of our own that never reached SAVED. Run on
    /// startup and on room open. Returns how many were pushed.
    pub fn resend_pending(&self, room: &str, link: &dyn LiveLink) -> Result<usize> {
        let own_key = self.identity.public_key_hex();
        let mut messages = self.cache.load_room(room)?;
        let mut resent = 0;
        let mut changed = false;
        for msg in &mut messages {
            let mine = msg.public_key.as_deref() == Some(own_key.as_str());
            if !mine || msg.state == Some(MessageState::Saved) {
                continue;
            }
            let mut wire_msg = msg.clone();
            wire_msg.state = None;
            let pushed = link.send_frame(&Frame::Broadcast {
                room: room.to_string(),
                message: wire_msg,
                sender: None,
            });
            let new_state = Some(if pushed {
                resent += 1;
                MessageState::Sent
            } else {
                MessageState::Failed
            });
            if msg.state != new_state {
                msg.state = new_state;
                changed = true;
            }
        }
        if changed {
            self.cache.store_room(room, &messages)?;
        }
        debug!(room, resent, "resend pass finished");
        Ok(resent)
    }

    /// When storage is near quota, ask, and on confirmation drop the oldest
    /// 20% of the current room's messages.
    pub fn prune_if_needed(
        &self,
        room: &str,
        incoming_bytes: u64,
        prompt: &dyn PrunePrompt,
    ) -> Result<bool> {
        let usage = self.cache.usage()?;
        if !usage.needs_pruning(incoming_bytes) {
            return Ok(false);
        }
        if !prompt.confirm_prune(room) {
            return Ok(false);
        }
        let mut messages = self.cache.load_room(room)?;
        sort_ascending(&mut messages);
        let drop_count = messages.len().div_ceil(5);
        messages.drain(..drop_count);
        self.cache.store_room(room, &messages)?;
        debug!(room, drop_count, "pruned oldest cached messages");
        Ok(true)
    }
}

fn upsert(messages: &mut Vec<ChatMessage>, incoming: ChatMessage) {
    match messages.iter_mut().find(|m| m.id == incoming.id) {
        Some(existing) => {
            if incoming.state == Some(MessageState::Saved) {
                existing.state = Some(MessageState::Saved);
            }
        }
        None => messages.push(incoming),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use parlor_shared::KeyPair;

    use crate::api::ApiClient;
    use crate::cache::MemoryCache;
    use crate::sync::SyncConfig;

    struct FakeLink {
        accept: bool,
        sent: Mutex<Vec<Frame>>,
    }

    impl FakeLink {
        fn up() -> Self {
            Self {
                accept: true,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn down() -> Self {
            Self {
                accept: false,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl LiveLink for FakeLink {
        fn send_frame(&self, frame: &Frame) -> bool {
            self.sent.lock().unwrap().push(frame.clone());
            self.accept
        }
    }

    struct CountingNotifier(AtomicUsize);

    impl SyncNotifier for CountingNotifier {
        fn message_failed(&self, _room: &str, _message_id: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct AlwaysPrune;

    impl PrunePrompt for AlwaysPrune {
        fn confirm_prune(&self, _room: &str) -> bool {
            true
        }
    }

    struct NeverPrune;

    impl PrunePrompt for NeverPrune {
        fn confirm_prune(&self, _room: &str) -> bool {
            false
        }
    }

    fn engine(cache: MemoryCache) -> SyncEngine<MemoryCache> {
        SyncEngine::new(
            cache,
            ApiClient::new("http://localhost:0"),
            KeyPair::generate(),
            "me",
            SyncConfig {
                ack_grace: std::time::Duration::ZERO,
                ..SyncConfig::default()
            },
        )
    }

    #[test]
    fn send_records_sent_and_signs() {
        let engine = engine(MemoryCache::new());
        let link = FakeLink::up();
        let msg = engine
            .send_message("r1", "hello", Vec::new(), &link, &NeverPrune)
            .unwrap();
        assert_eq!(msg.state, Some(MessageState::Sent));
        assert!(parlor_shared::signature::verify_chat_message(&msg).is_ok());
        assert_eq!(link.count(), 1);

        let cached = engine.cache().load_room("r1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].state, Some(MessageState::Sent));
    }

    #[test]
    fn refused_push_records_failed() {
        let engine = engine(MemoryCache::new());
        let msg = engine
            .send_message("r1", "hello", Vec::new(), &FakeLink::down(), &NeverPrune)
            .unwrap();
        assert_eq!(msg.state, Some(MessageState::Failed));
    }

    #[test]
    fn ack_promotes_to_saved() {
        let engine = engine(MemoryCache::new());
        let msg = engine
            .send_message("r1", "hello", Vec::new(), &FakeLink::up(), &NeverPrune)
            .unwrap();
        engine.handle_ack("r1", &msg.id).unwrap();
        let cached = engine.cache().load_room("r1").unwrap();
        assert_eq!(cached[0].state, Some(MessageState::Saved));
    }

    #[tokio::test]
    async fn missing_ack_surfaces_failure() {
        let engine = engine(MemoryCache::new());
        let msg = engine
            .send_message("r1", "hello", Vec::new(), &FakeLink::up(), &NeverPrune)
            .unwrap();
        let notifier = CountingNotifier(AtomicUsize::new(0));
        engine.confirm_delivery("r1", &msg.id, &notifier).await.unwrap();
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);

        engine.handle_ack("r1", &msg.id).unwrap();
        engine.confirm_delivery("r1", &msg.id, &notifier).await.unwrap();
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn incoming_dedups_by_id() {
        let engine = engine(MemoryCache::new());
        let msg = engine
            .send_message("r1", "hello", Vec::new(), &FakeLink::up(), &NeverPrune)
            .unwrap();

        // the server echoes our own message back via another connection
        let mut echoed = msg.clone();
        echoed.state = Some(MessageState::Saved);
        engine.handle_incoming("r1", echoed).unwrap();

        let cached = engine.cache().load_room("r1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].state, Some(MessageState::Saved));

        // a genuinely new message appends
        let other = ChatMessage {
            id: "other1".into(),
            timestamp: now_ms(),
            sender: "bob".into(),
            content: "hey".into(),
            public_key: None,
            signature: None,
            state: None,
            attachments: Vec::new(),
        };
        engine.handle_incoming("r1", other).unwrap();
        assert_eq!(engine.cache().load_room("r1").unwrap().len(), 2);
    }

    #[test]
    fn delete_notice_drops_local_copy() {
        let engine = engine(MemoryCache::new());
        let msg = engine
            .send_message("r1", "hello", Vec::new(), &FakeLink::up(), &NeverPrune)
            .unwrap();
        engine.handle_delete("r1", &msg.id).unwrap();
        assert!(engine.cache().load_room("r1").unwrap().is_empty());
    }

    #[test]
    fn resend_targets_own_unsaved_only() {
        let engine = engine(MemoryCache::new());
        let link = FakeLink::up();

        let mine_sent = engine
            .send_message("r1", "unacked", Vec::new(), &link, &NeverPrune)
            .unwrap();
        let mine_saved = engine
            .send_message("r1", "acked", Vec::new(), &link, &NeverPrune)
            .unwrap();
        engine.handle_ack("r1", &mine_saved.id).unwrap();

        // someone else's message, saved
        engine
            .handle_incoming(
                "r1",
                ChatMessage {
                    id: "theirs".into(),
                    timestamp: now_ms(),
                    sender: "bob".into(),
                    content: "hi".into(),
                    public_key: Some("ff".repeat(32)),
                    signature: None,
                    state: None,
                    attachments: Vec::new(),
                },
            )
            .unwrap();

        let resend_link = FakeLink::up();
        let resent = engine.resend_pending("r1", &resend_link).unwrap();
        assert_eq!(resent, 1);
        let frames = resend_link.sent.lock().unwrap();
        match &frames[0] {
            Frame::Broadcast { message, .. } => assert_eq!(message.id, mine_sent.id),
            other => panic!("expected broadcast, got {}", other.kind()),
        }
    }

    #[test]
    fn prune_drops_oldest_fifth_after_confirmation() {
        let cache = MemoryCache::with_quota(4096);
        let engine = engine(cache);

        let big = "x".repeat(300);
        let base = now_ms();
        let messages: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage {
                id: format!("m{i:02}"),
                timestamp: base + i,
                sender: "me".into(),
                content: big.clone(),
                public_key: None,
                signature: None,
                state: Some(MessageState::Saved),
                attachments: Vec::new(),
            })
            .collect();
        engine.cache().store_room("r1", &messages).unwrap();

        // declined: nothing changes
        assert!(!engine.prune_if_needed("r1", 600, &NeverPrune).unwrap());
        assert_eq!(engine.cache().load_room("r1").unwrap().len(), 10);

        // confirmed: the two oldest go
        assert!(engine.prune_if_needed("r1", 600, &AlwaysPrune).unwrap());
        let cached = engine.cache().load_room("r1").unwrap();
        assert_eq!(cached.len(), 8);
        assert_eq!(cached[0].id, "m02");
    }
}
