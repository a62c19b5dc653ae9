//! Per-chat cooldown tracking.
//!
//! Remembers the last send instant per chat and computes the earliest time
//! the next send to that chat is allowed.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::transport::ChatId;

/// Last-send bookkeeping per chat.
#[derive(Debug)]
pub struct ChatCooldowns {
    cooldown: Duration,
    last_sent: HashMap<ChatId, Instant>,
}

impl ChatCooldowns {
    /// Create a tracker enforcing `cooldown` between sends to the same chat.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: HashMap::new(),
        }
    }

    /// Earliest instant the chat may be sent to again, never before `now`.
    pub fn next_allowed(&self, chat_id: &ChatId, now: Instant) -> Instant {
        match self.last_sent.get(chat_id) {
            Some(last) => (*last + self.cooldown).max(now),
            None => now,
        }
    }

    /// Record a send to the chat; the stored instant never moves backwards.
    pub fn record(&mut self, chat_id: &ChatId, now: Instant) {
        self.last_sent
            .entry(chat_id.clone())
            .and_modify(|last| *last = (*last).max(now))
            .or_insert(now);
    }

    /// Number of chats with recorded sends.
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    /// True when no chat has a recorded send.
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_chat_allowed_immediately() {
        let cooldowns = ChatCooldowns::new(Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(cooldowns.next_allowed(&ChatId::Int(1), now), now);
    }

    #[test]
    fn test_cooldown_enforced_after_send() {
        let mut cooldowns = ChatCooldowns::new(Duration::from_secs(1));
        let now = Instant::now();
        let chat = ChatId::Int(1);

        cooldowns.record(&chat, now);
        assert_eq!(cooldowns.next_allowed(&chat, now), now + Duration::from_secs(1));
    }

    #[test]
    fn test_elapsed_cooldown_allows_now() {
        let mut cooldowns = ChatCooldowns::new(Duration::from_secs(1));
        let now = Instant::now();
        let chat = ChatId::Int(1);

        cooldowns.record(&chat, now);
        let later = now + Duration::from_secs(2);
        assert_eq!(cooldowns.next_allowed(&chat, later), later);
    }

    #[test]
    fn test_record_never_moves_backwards() {
        let mut cooldowns = ChatCooldowns::new(Duration::from_secs(1));
        let now = Instant::now();
        let chat = ChatId::Int(1);

        cooldowns.record(&chat, now + Duration::from_secs(5));
        cooldowns.record(&chat, now);
        assert_eq!(
            cooldowns.next_allowed(&chat, now),
            now + Duration::from_secs(6)
        );
    }

    #[test]
    fn test_chats_tracked_independently() {
        let mut cooldowns = ChatCooldowns::new(Duration::from_secs(1));
        let now = Instant::now();

        cooldowns.record(&ChatId::Int(1), now);
        assert_eq!(cooldowns.next_allowed(&ChatId::Int(2), now), now);
        assert_eq!(cooldowns.len(), 1);
    }

    #[test]
    fn test_zero_cooldown() {
        let mut cooldowns = ChatCooldowns::new(Duration::ZERO);
        let now = Instant::now();
        let chat = ChatId::from("@news");

        cooldowns.record(&chat, now);
        assert_eq!(cooldowns.next_allowed(&chat, now), now);
    }
}
