//! Time-ordered queue of pending sends.
//!
//! Entries are ordered by `(ready_at, seq)`: earliest permitted dispatch
//! first, admission order as the stable tie-break. Cancellation is a
//! tombstone: the ticket flips the entry's atomic state and the worker
//! discards the entry when it surfaces, so a cancelled operation is never
//! invoked without any O(n) heap surgery.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering as MemOrdering};

use futures::future::BoxFuture;
use tokio::sync::{Notify, oneshot};
use tokio::time::Instant;

use crate::error::{PacerError, Result};
use crate::transport::{ChatId, Delivery};

/// The opaque send operation. Cloned per attempt, so retries re-invoke it.
pub type SendJob = Arc<dyn Fn() -> BoxFuture<'static, Result<Delivery>> + Send + Sync>;

/// Entry awaits dispatch.
pub const ENTRY_PENDING: u8 = 0;
/// Worker has begun invoking the operation; cancellation no longer applies.
pub const ENTRY_DISPATCHING: u8 = 1;
/// Ticket cancelled the entry before dispatch.
pub const ENTRY_CANCELLED: u8 = 2;

/// One pending or in-flight send request.
pub struct QueueEntry {
    pub job: SendJob,
    pub chat_id: ChatId,
    /// Caller metadata, never interpreted by the scheduler.
    pub context: Option<serde_json::Value>,
    pub reply: oneshot::Sender<Result<Delivery>>,
    pub state: Arc<AtomicU8>,
    pub retries: u32,
    pub enqueued_at: Instant,
    pub ready_at: Instant,
    seq: u64,
}

impl QueueEntry {
    /// Build a fresh entry; `seq` is assigned by the queue on push.
    pub fn new(
        job: SendJob,
        chat_id: ChatId,
        context: Option<serde_json::Value>,
        reply: oneshot::Sender<Result<Delivery>>,
        state: Arc<AtomicU8>,
        enqueued_at: Instant,
        ready_at: Instant,
    ) -> Self {
        Self {
            job,
            chat_id,
            context,
            reply,
            state,
            retries: 0,
            enqueued_at,
            ready_at,
            seq: 0,
        }
    }

    /// True once the ticket has tombstoned this entry.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(MemOrdering::Acquire) == ENTRY_CANCELLED
    }

    /// True when the caller dropped its ticket without cancelling.
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    /// Attempt the pending -> dispatching transition.
    ///
    /// Fails exactly when a concurrent cancel won the race, in which case the
    /// operation must not be invoked.
    pub fn begin_dispatch(&self) -> bool {
        self.state
            .compare_exchange(
                ENTRY_PENDING,
                ENTRY_DISPATCHING,
                MemOrdering::AcqRel,
                MemOrdering::Acquire,
            )
            .is_ok()
    }

    /// Return a retried entry to the pending state so it can be cancelled
    /// again while requeued.
    pub fn reset_pending(&self) {
        self.state.store(ENTRY_PENDING, MemOrdering::Release);
    }

    /// Resolve the caller's ticket. The slot accepts exactly one value; a
    /// dropped receiver is not an error.
    pub fn resolve(self, result: Result<Delivery>) {
        let _ = self.reply.send(result);
    }
}

/// Caller-side handle to a queued send.
///
/// Await the outcome with [`SendTicket::wait`]; drop the ticket to abandon
/// the send, or call [`SendTicket::cancel`] to reject it explicitly.
pub struct SendTicket {
    rx: oneshot::Receiver<Result<Delivery>>,
    state: Arc<AtomicU8>,
    wake: Arc<Notify>,
}

impl SendTicket {
    pub(crate) fn new(rx: oneshot::Receiver<Result<Delivery>>, state: Arc<AtomicU8>, wake: Arc<Notify>) -> Self {
        Self { rx, state, wake }
    }

    /// Cancel the send if dispatch has not begun.
    ///
    /// Returns true when the entry was tombstoned; false when the worker had
    /// already started (or finished) dispatching it.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(
                ENTRY_PENDING,
                ENTRY_CANCELLED,
                MemOrdering::AcqRel,
                MemOrdering::Acquire,
            )
            .is_ok();
        if cancelled {
            self.wake.notify_one();
        }
        cancelled
    }

    /// True once the entry has been tombstoned.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(MemOrdering::Acquire) == ENTRY_CANCELLED
    }

    /// Await the terminal outcome of the send.
    pub async fn wait(self) -> Result<Delivery> {
        if self.is_cancelled() {
            return Err(PacerError::Cancelled);
        }
        match self.rx.await {
            Ok(result) => result,
            // Sender dropped without resolving: the entry was discarded.
            Err(_) => Err(PacerError::Cancelled),
        }
    }
}

/// Heap slot ordered as a min-heap on `(ready_at, seq)`.
struct HeapSlot(QueueEntry);

impl HeapSlot {
    fn key(&self) -> (Instant, u64) {
        (self.0.ready_at, self.0.seq)
    }
}

impl PartialEq for HeapSlot {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapSlot {}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted so BinaryHeap's max-heap pops the earliest deadline.
        other.key().cmp(&self.key())
    }
}

/// Priority queue of pending sends keyed by `(ready_at, seq)`.
pub struct DelayQueue {
    heap: BinaryHeap<HeapSlot>,
    next_seq: u64,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert an entry, assigning the next admission sequence number.
    pub fn push(&mut self, mut entry: QueueEntry) {
        self.next_seq += 1;
        entry.seq = self.next_seq;
        self.heap.push(HeapSlot(entry));
    }

    /// Deadline of the earliest entry, if any.
    pub fn peek_ready_at(&self) -> Option<Instant> {
        self.heap.peek().map(|slot| slot.0.ready_at)
    }

    /// Pop the earliest entry if its deadline has passed.
    pub fn pop_due(&mut self, now: Instant) -> Option<QueueEntry> {
        match self.heap.peek() {
            Some(slot) if slot.0.ready_at <= now => self.heap.pop().map(|slot| slot.0),
            _ => None,
        }
    }

    /// Remove every entry, in deadline order.
    pub fn drain(&mut self) -> Vec<QueueEntry> {
        let mut entries = Vec::with_capacity(self.heap.len());
        while let Some(slot) = self.heap.pop() {
            entries.push(slot.0);
        }
        entries
    }

    /// Iterate entries in arbitrary order (metrics only).
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.heap.iter().map(|slot| &slot.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for DelayQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn noop_job() -> SendJob {
        Arc::new(|| {
            Box::pin(async {
                Ok(Delivery {
                    chat_id: ChatId::Int(0),
                    message_id: None,
                })
            }) as BoxFuture<'static, Result<Delivery>>
        })
    }

    fn make_entry(chat: i64, ready_at: Instant) -> (QueueEntry, oneshot::Receiver<Result<Delivery>>) {
        let (tx, rx) = oneshot::channel();
        let entry = QueueEntry::new(
            noop_job(),
            ChatId::Int(chat),
            None,
            tx,
            Arc::new(AtomicU8::new(ENTRY_PENDING)),
            ready_at,
            ready_at,
        );
        (entry, rx)
    }

    #[test]
    fn test_orders_by_ready_at() {
        let mut queue = DelayQueue::new();
        let now = Instant::now();

        let (late, _rx1) = make_entry(1, now + Duration::from_secs(2));
        let (early, _rx2) = make_entry(2, now);
        queue.push(late);
        queue.push(early);

        let popped = queue.pop_due(now + Duration::from_secs(5)).unwrap();
        assert_eq!(popped.chat_id, ChatId::Int(2));
    }

    #[test]
    fn test_ties_break_by_admission_order() {
        let mut queue = DelayQueue::new();
        let now = Instant::now();

        let (first, _rx1) = make_entry(1, now);
        let (second, _rx2) = make_entry(2, now);
        queue.push(first);
        queue.push(second);

        assert_eq!(queue.pop_due(now).unwrap().chat_id, ChatId::Int(1));
        assert_eq!(queue.pop_due(now).unwrap().chat_id, ChatId::Int(2));
    }

    #[test]
    fn test_pop_due_respects_deadline() {
        let mut queue = DelayQueue::new();
        let now = Instant::now();

        let (entry, _rx) = make_entry(1, now + Duration::from_secs(1));
        queue.push(entry);

        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(now + Duration::from_secs(1)).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_returns_all_in_order() {
        let mut queue = DelayQueue::new();
        let now = Instant::now();

        let (b, _rx1) = make_entry(2, now + Duration::from_secs(1));
        let (a, _rx2) = make_entry(1, now);
        queue.push(b);
        queue.push(a);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].chat_id, ChatId::Int(1));
        assert_eq!(drained[1].chat_id, ChatId::Int(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_begin_dispatch_wins_over_late_cancel() {
        let now = Instant::now();
        let (entry, rx) = make_entry(1, now);
        let ticket = SendTicket::new(rx, entry.state.clone(), Arc::new(Notify::new()));

        assert!(entry.begin_dispatch());
        assert!(!ticket.cancel());
        assert!(!entry.is_cancelled());
    }

    #[test]
    fn test_cancel_blocks_dispatch() {
        let now = Instant::now();
        let (entry, rx) = make_entry(1, now);
        let ticket = SendTicket::new(rx, entry.state.clone(), Arc::new(Notify::new()));

        assert!(ticket.cancel());
        assert!(!entry.begin_dispatch());
        assert!(entry.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_after_cancel_resolves_immediately() {
        let now = Instant::now();
        let (entry, rx) = make_entry(1, now);
        let ticket = SendTicket::new(rx, entry.state.clone(), Arc::new(Notify::new()));

        ticket.cancel();
        let result = ticket.wait().await;
        assert!(matches!(result, Err(PacerError::Cancelled)));
        // Entry still owned elsewhere; it must never have dispatched.
        assert!(entry.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_receives_resolution() {
        let now = Instant::now();
        let (entry, rx) = make_entry(7, now);
        let ticket = SendTicket::new(rx, entry.state.clone(), Arc::new(Notify::new()));

        entry.resolve(Ok(Delivery {
            chat_id: ChatId::Int(7),
            message_id: Some(99),
        }));

        let delivery = ticket.wait().await.unwrap();
        assert_eq!(delivery.message_id, Some(99));
    }

    #[tokio::test]
    async fn test_dropped_entry_surfaces_as_cancelled() {
        let now = Instant::now();
        let (entry, rx) = make_entry(1, now);
        let ticket = SendTicket::new(rx, entry.state.clone(), Arc::new(Notify::new()));

        drop(entry);
        assert!(matches!(ticket.wait().await, Err(PacerError::Cancelled)));
    }

    #[test]
    fn test_abandoned_entry_detected() {
        let now = Instant::now();
        let (entry, rx) = make_entry(1, now);
        assert!(!entry.is_abandoned());
        drop(rx);
        assert!(entry.is_abandoned());
    }
}
