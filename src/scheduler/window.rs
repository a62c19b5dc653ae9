//! Global sliding-window limiter.
//!
//! Bounds total sends across all chats within any trailing 1-second
//! interval. Timestamps older than the window span are pruned lazily on
//! access, so the deque never holds more than one second of history.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Span of the sliding window.
const WINDOW_SPAN: Duration = Duration::from_secs(1);

/// Trailing 1-second window of send timestamps.
#[derive(Debug)]
pub struct GlobalWindow {
    capacity: usize,
    sends: VecDeque<Instant>,
}

impl GlobalWindow {
    /// Create a window admitting at most `capacity` sends per second.
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            capacity,
            sends: VecDeque::with_capacity(capacity),
        }
    }

    /// Return true if another send is admissible at `now`.
    pub fn can_send(&mut self, now: Instant) -> bool {
        self.trim(now);
        self.sends.len() < self.capacity
    }

    /// Record a send at `now`.
    pub fn record(&mut self, now: Instant) {
        self.trim(now);
        self.sends.push_back(now);
    }

    /// Earliest instant at which the window frees a slot.
    ///
    /// With a saturated window this is the oldest timestamp plus the window
    /// span; with room available it is `now`.
    pub fn next_ready(&mut self, now: Instant) -> Instant {
        self.trim(now);
        match self.sends.front() {
            Some(oldest) if self.sends.len() >= self.capacity => (*oldest + WINDOW_SPAN).max(now),
            _ => now,
        }
    }

    /// Number of sends currently inside the window.
    pub fn len(&self) -> usize {
        self.sends.len()
    }

    /// True when no sends are recorded inside the window.
    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
    }

    /// Drop timestamps that have aged out of the window.
    fn trim(&mut self, now: Instant) {
        while let Some(oldest) = self.sends.front() {
            if now.duration_since(*oldest) >= WINDOW_SPAN {
                self.sends.pop_front();
            } else {
                break;
            }
        }
    }
}
