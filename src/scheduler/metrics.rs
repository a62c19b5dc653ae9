//! Queue backlog metrics and operator alerting.
//!
//! Metrics cover queued (not yet dispatched) entries only: each entry
//! contributes `ready_at - now`, floored at zero. In-flight dispatch latency
//! is the transport's business and is deliberately excluded.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::transport::ChatId;

use super::queue::QueueEntry;

/// Snapshot of the send backlog at a single instant.
#[derive(Debug, Clone, Serialize)]
pub struct QueueMetrics {
    /// Entries currently queued
    pub queue_depth: usize,
    /// Largest remaining delay among queued entries, seconds
    pub max_delay_sec: f64,
    /// Mean remaining delay across queued entries, seconds
    pub avg_delay_sec: f64,
    /// Chat with the largest remaining delay, when the queue is non-empty
    pub max_delay_chat_id: Option<ChatId>,
    /// That chat's remaining delay, seconds
    pub max_delay_chat_sec: f64,
    /// Wall-clock sample time
    pub sampled_at: DateTime<Utc>,
}

impl QueueMetrics {
    /// Metrics for an empty queue.
    pub fn empty() -> Self {
        Self {
            queue_depth: 0,
            max_delay_sec: 0.0,
            avg_delay_sec: 0.0,
            max_delay_chat_id: None,
            max_delay_chat_sec: 0.0,
            sampled_at: Utc::now(),
        }
    }

    /// Compute metrics over queued entries as of `now`.
    ///
    /// Tombstoned (cancelled) entries still sitting in the heap are skipped.
    pub(crate) fn compute<'a>(entries: impl Iterator<Item = &'a QueueEntry>, now: Instant) -> Self {
        let mut depth = 0usize;
        let mut total = 0.0f64;
        let mut max_delay = 0.0f64;
        let mut per_chat: HashMap<&ChatId, f64> = HashMap::new();

        for entry in entries {
            if entry.is_cancelled() {
                continue;
            }
            let delay = entry.ready_at.saturating_duration_since(now).as_secs_f64();
            depth += 1;
            total += delay;
            max_delay = max_delay.max(delay);
            let chat_delay = per_chat.entry(&entry.chat_id).or_insert(0.0);
            if delay > *chat_delay {
                *chat_delay = delay;
            }
        }

        if depth == 0 {
            return Self::empty();
        }

        let (worst_chat, worst_delay) = per_chat
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(chat, delay)| (Some(chat.clone()), delay))
            .unwrap_or((None, 0.0));

        Self {
            queue_depth: depth,
            max_delay_sec: max_delay,
            avg_delay_sec: total / depth as f64,
            max_delay_chat_id: worst_chat,
            max_delay_chat_sec: worst_delay,
            sampled_at: Utc::now(),
        }
    }
}

/// Debounced backlog-alert state.
///
/// Fires at most once per cooldown window, and only while the queue is
/// non-empty with a max delay at or beyond the threshold.
#[derive(Debug)]
pub(crate) struct BacklogAlerter {
    threshold: Duration,
    cooldown: Duration,
    last_alert_at: Option<Instant>,
}

impl BacklogAlerter {
    pub(crate) fn new(threshold: Duration, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            last_alert_at: None,
        }
    }

    /// Decide whether to alert for `metrics`; records the alert time when it
    /// fires so the cooldown window starts immediately.
    pub(crate) fn should_alert(&mut self, metrics: &QueueMetrics, now: Instant) -> bool {
        if metrics.queue_depth == 0 || metrics.max_delay_sec < self.threshold.as_secs_f64() {
            return false;
        }
        if let Some(last) = self.last_alert_at {
            if now.duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_alert_at = Some(now);
        true
    }

    /// Operator-facing alert text.
    pub(crate) fn format_message(metrics: &QueueMetrics) -> String {
        let mut message = format!(
            "Warning: send queue backlog detected.\nQueue depth: {}\nMax delay: {:.2}s\nAverage delay: {:.2}s",
            metrics.queue_depth, metrics.max_delay_sec, metrics.avg_delay_sec,
        );
        if let Some(chat) = &metrics.max_delay_chat_id {
            message.push_str(&format!("\nWorst chat: {} ({:.2}s)", chat, metrics.max_delay_chat_sec));
        }
        message
    }
}
