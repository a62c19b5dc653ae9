//! In-memory recording transport.
//!
//! Backs the burst simulator and the integration tests: records every send
//! with its timestamp instead of talking to a real platform.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::Result;

use super::{ChatAction, ChatId, Delivery, InputMedia, MediaRef, SendOptions, Transport};

/// One recorded outbound message.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Monotonic instant the send completed
    pub at: Instant,
    /// Destination chat
    pub chat_id: ChatId,
    /// Short description of what was sent (text, or a payload label)
    pub summary: String,
}

/// Transport that records sends in memory, with optional simulated latency.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    latency: Duration,
    sent: Mutex<Vec<SentMessage>>,
    typing: Mutex<Vec<(ChatId, ChatAction)>>,
    next_message_id: AtomicI64,
}

impl MemoryTransport {
    /// Create a transport that completes sends immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that sleeps `latency` before acknowledging a send.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Snapshot of all recorded sends, in completion order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }

    /// Number of recorded sends.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent lock poisoned").len()
    }

    /// Snapshot of recorded presence signals.
    pub fn typing_events(&self) -> Vec<(ChatId, ChatAction)> {
        self.typing.lock().expect("typing lock poisoned").clone()
    }

    async fn record(&self, chat_id: &ChatId, summary: String) -> Result<Delivery> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.sent.lock().expect("sent lock poisoned").push(SentMessage {
            at: Instant::now(),
            chat_id: chat_id.clone(),
            summary,
        });
        Ok(Delivery {
            chat_id: chat_id.clone(),
            message_id: Some(message_id),
        })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_message(&self, chat_id: &ChatId, text: &str, _opts: &SendOptions) -> Result<Delivery> {
        self.record(chat_id, text.to_string()).await
    }

    async fn send_photo(&self, chat_id: &ChatId, photo: &MediaRef, _opts: &SendOptions) -> Result<Delivery> {
        self.record(chat_id, format!("photo:{:?}", photo)).await
    }

    async fn send_document(&self, chat_id: &ChatId, document: &MediaRef, _opts: &SendOptions) -> Result<Delivery> {
        self.record(chat_id, format!("document:{:?}", document)).await
    }

    async fn send_media_group(&self, chat_id: &ChatId, media: &[InputMedia], _opts: &SendOptions) -> Result<Delivery> {
        self.record(chat_id, format!("media_group:{}", media.len())).await
    }

    async fn send_chat_action(&self, chat_id: &ChatId, action: ChatAction) -> Result<()> {
        self.typing
            .lock()
            .expect("typing lock poisoned")
            .push((chat_id.clone(), action));
        Ok(())
    }
}
