//! The send scheduler instance.
//!
//! `SendPacer` owns the three pacing structures (delay queue, global window,
//! per-chat cooldowns) behind a single lock, plus one cooperative worker
//! task that pulls due entries, re-validates both limiters, invokes the send
//! job, and applies the retry policy on failure.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::PacerConfig;
use crate::error::{PacerError, Result};
use crate::transport::{ChatAction, ChatId, SendOptions, Transport};

use super::cooldown::ChatCooldowns;
use super::metrics::{BacklogAlerter, QueueMetrics};
use super::queue::{DelayQueue, ENTRY_PENDING, QueueEntry, SendJob, SendTicket};
use super::retry::RetryPolicy;
use super::window::GlobalWindow;

/// Mutable scheduler state, all behind one lock.
struct PacerState {
    queue: DelayQueue,
    window: GlobalWindow,
    cooldowns: ChatCooldowns,
    alerter: BacklogAlerter,
}

/// What the worker decided to do after inspecting the queue head.
enum Step {
    Dispatch(QueueEntry),
    Sleep(Instant),
    Idle,
    Continue,
}

/// Coordinates outbound sends with global and per-chat rate controls.
pub struct SendPacer {
    transport: Arc<dyn Transport>,
    config: PacerConfig,
    retry: RetryPolicy,
    state: Mutex<PacerState>,
    wake: Arc<Notify>,
    running: AtomicBool,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SendPacer {
    /// Create a pacer over `transport` with the given pacing configuration.
    pub fn new(transport: Arc<dyn Transport>, config: PacerConfig) -> Self {
        let retry = RetryPolicy::new(config.max_retry_attempts, config.retry_base_delay());
        let state = PacerState {
            queue: DelayQueue::new(),
            window: GlobalWindow::new(config.global_rate()),
            cooldowns: ChatCooldowns::new(config.per_chat_cooldown()),
            alerter: BacklogAlerter::new(config.alert_threshold(), config.alert_cooldown()),
        };
        Self {
            transport,
            config,
            retry,
            state: Mutex::new(state),
            wake: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Spawn the dispatch worker. Calling start on a running pacer is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("Pacer already started");
                return;
            }
        }
        self.running.store(true, Ordering::Release);
        let pacer = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { pacer.worker_loop().await }));
        tracing::info!(
            global_rate_per_sec = self.config.global_rate(),
            per_chat_cooldown_sec = self.config.per_chat_cooldown().as_secs_f64(),
            "Pacer started"
        );
    }

    /// Stop the worker and reject every queued entry with a shutdown error.
    /// Idempotent; a second stop is a no-op.
    pub async fn stop(&self) {
        let handle = {
            let mut worker = self.worker.lock().await;
            self.running.store(false, Ordering::Release);
            self.wake.notify_one();
            worker.take()
        };
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        let drained = {
            let mut state = self.state.lock().unwrap();
            state.queue.drain()
        };
        if !drained.is_empty() {
            tracing::warn!(count = drained.len(), "Rejecting queued sends on shutdown");
        }
        for entry in drained {
            entry.resolve(Err(PacerError::Shutdown));
        }
    }

    /// True while the dispatch worker is accepting admissions.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Admit a send job for `chat_id`.
    ///
    /// The entry's earliest dispatch time honors the chat's cooldown; the
    /// returned ticket resolves once the send succeeds or permanently fails.
    /// When the expected delay crosses the heavy-load threshold a typing
    /// indicator is fired at the chat, best-effort.
    pub async fn enqueue(
        &self,
        job: SendJob,
        chat_id: ChatId,
        context: Option<serde_json::Value>,
    ) -> Result<SendTicket> {
        let now = Instant::now();
        let (tx, rx) = oneshot::channel();
        let entry_state = Arc::new(AtomicU8::new(ENTRY_PENDING));

        let (ready_at, queue_depth) = {
            let mut state = self.state.lock().unwrap();
            // Checked under the state lock so a concurrent stop either sees
            // this entry in its drain or we see the flag already cleared.
            if !self.is_running() {
                return Err(PacerError::NotStarted);
            }
            let ready_at = state.cooldowns.next_allowed(&chat_id, now);
            let entry = QueueEntry::new(
                job,
                chat_id.clone(),
                context,
                tx,
                entry_state.clone(),
                now,
                ready_at,
            );
            state.queue.push(entry);
            (ready_at, state.queue.len())
        };
        self.wake.notify_one();

        let delay = ready_at.saturating_duration_since(now);
        tracing::info!(
            chat_id = %chat_id,
            delay_sec = delay.as_secs_f64(),
            queue_depth,
            "Send enqueued"
        );

        if delay > self.config.heavy_load_threshold() {
            self.spawn_typing_indicator(chat_id.clone(), delay);
        }
        if queue_depth > self.config.global_rate() as usize || delay > self.config.heavy_load_threshold() {
            self.maybe_alert();
        }

        Ok(SendTicket::new(rx, entry_state, self.wake.clone()))
    }

    /// Snapshot backlog metrics over currently queued entries.
    pub fn queue_metrics(&self) -> QueueMetrics {
        let now = Instant::now();
        let state = self.state.lock().unwrap();
        QueueMetrics::compute(state.queue.iter(), now)
    }

    async fn worker_loop(self: Arc<Self>) {
        tracing::debug!("Dispatch worker started");
        loop {
            if !self.is_running() {
                break;
            }
            let step = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                match state.queue.pop_due(now) {
                    Some(entry) => Self::check_ready(&mut state, entry, now),
                    None => match state.queue.peek_ready_at() {
                        Some(deadline) => Step::Sleep(deadline),
                        None => Step::Idle,
                    },
                }
            };
            match step {
                Step::Dispatch(entry) => self.dispatch(entry).await,
                Step::Sleep(deadline) => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                Step::Idle => self.wake.notified().await,
                Step::Continue => {}
            }
        }
        tracing::debug!("Dispatch worker stopped");
    }

    /// Re-validate a due entry against both limiters.
    ///
    /// Runs in the same critical section as the pop, so a reschedule cannot
    /// be reordered behind a concurrent admission for the same chat.
    fn check_ready(state: &mut PacerState, entry: QueueEntry, now: Instant) -> Step {
        if entry.is_cancelled() {
            tracing::debug!(chat_id = %entry.chat_id, "Discarding cancelled send");
            entry.resolve(Err(PacerError::Cancelled));
            return Step::Continue;
        }
        if entry.is_abandoned() {
            tracing::debug!(chat_id = %entry.chat_id, "Discarding abandoned send");
            return Step::Continue;
        }
        if !state.window.can_send(now) {
            let retry_at = state.window.next_ready(now);
            tracing::debug!(chat_id = %entry.chat_id, "Global window saturated, rescheduling");
            Self::requeue(state, entry, retry_at);
            return Step::Continue;
        }
        let chat_ready = state.cooldowns.next_allowed(&entry.chat_id, now);
        if chat_ready > now {
            // Another entry for this chat dispatched after this one was queued.
            tracing::debug!(chat_id = %entry.chat_id, "Chat cooldown pending, rescheduling");
            Self::requeue(state, entry, chat_ready);
            return Step::Continue;
        }
        Step::Dispatch(entry)
    }

    /// Invoke the send job and settle the entry per the retry policy.
    async fn dispatch(&self, mut entry: QueueEntry) {
        if !entry.begin_dispatch() {
            tracing::debug!(chat_id = %entry.chat_id, "Cancelled at dispatch");
            entry.resolve(Err(PacerError::Cancelled));
            return;
        }

        tracing::info!(
            chat_id = %entry.chat_id,
            waited_sec = entry.enqueued_at.elapsed().as_secs_f64(),
            retries = entry.retries,
            "Dispatch starting"
        );

        match (entry.job)().await {
            Ok(delivery) => {
                let now = Instant::now();
                {
                    let mut state = self.state.lock().unwrap();
                    state.window.record(now);
                    state.cooldowns.record(&entry.chat_id, now);
                }
                tracing::info!(
                    chat_id = %entry.chat_id,
                    total_wait_sec = now.saturating_duration_since(entry.enqueued_at).as_secs_f64(),
                    "Dispatch completed"
                );
                entry.resolve(Ok(delivery));
            }
            Err(err) if err.is_retryable() => {
                let attempt = entry.retries + 1;
                match self.retry.next_delay(attempt, &err) {
                    Some(delay) => {
                        tracing::warn!(
                            chat_id = %entry.chat_id,
                            attempt,
                            delay_sec = delay.as_secs_f64(),
                            error = %err,
                            "Retrying send"
                        );
                        entry.retries = attempt;
                        entry.reset_pending();
                        let ready_at = Instant::now() + delay;
                        let mut state = self.state.lock().unwrap();
                        Self::requeue(&mut state, entry, ready_at);
                    }
                    None => {
                        tracing::error!(
                            chat_id = %entry.chat_id,
                            error = %err,
                            "Dropping send after retry exhaustion"
                        );
                        entry.resolve(Err(err));
                    }
                }
            }
            Err(err) => {
                tracing::error!(chat_id = %entry.chat_id, error = %err, "Dropping send after permanent failure");
                entry.resolve(Err(err));
            }
        }
    }

    /// Push an entry back with a later deadline. Deadlines only move forward.
    fn requeue(state: &mut PacerState, mut entry: QueueEntry, ready_at: Instant) {
        entry.ready_at = ready_at.max(entry.ready_at);
        state.queue.push(entry);
    }

    fn spawn_typing_indicator(&self, chat_id: ChatId, delay: std::time::Duration) {
        tracing::info!(
            chat_id = %chat_id,
            expected_delay_sec = delay.as_secs_f64(),
            "Heavy load, sending typing indicator"
        );
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(err) = transport.send_chat_action(&chat_id, ChatAction::Typing).await {
                tracing::debug!(chat_id = %chat_id, error = %err, "Typing indicator failed");
            }
        });
    }

    /// Recompute metrics and fire the debounced operator alert if warranted.
    fn maybe_alert(&self) {
        let Some(admin) = self.config.admin_chat_id.clone() else {
            return;
        };
        let now = Instant::now();
        let metrics = {
            let mut state = self.state.lock().unwrap();
            let metrics = QueueMetrics::compute(state.queue.iter(), now);
            if !state.alerter.should_alert(&metrics, now) {
                return;
            }
            metrics
        };
        tracing::warn!(
            queue_depth = metrics.queue_depth,
            max_delay_sec = metrics.max_delay_sec,
            avg_delay_sec = metrics.avg_delay_sec,
            worst_chat = ?metrics.max_delay_chat_id,
            "Send queue backlog alert"
        );
        let text = BacklogAlerter::format_message(&metrics);
        let transport = self.transport.clone();
        tokio::spawn(async move {
            if let Err(err) = transport.send_message(&admin, &text, &SendOptions::default()).await {
                tracing::debug!(error = %err, "Failed to send backlog alert");
            }
        });
    }
}
