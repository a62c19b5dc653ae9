//! Send scheduling: admission, timing enforcement, retry, backlog metrics.
//!
//! The pieces:
//! - [`window::GlobalWindow`] bounds total throughput to a trailing 1-second window
//! - [`cooldown::ChatCooldowns`] spaces sends to the same chat
//! - [`retry::RetryPolicy`] bounds and paces re-dispatch after failures
//! - [`SendPacer`] owns the queue and the single dispatch worker
//!
//! Callers normally go through [`crate::messenger::Messenger`] rather than
//! enqueueing jobs directly.

pub mod cooldown;
pub mod metrics;
pub mod retry;
pub mod window;

mod pacer;
pub(crate) mod queue;

pub use metrics::QueueMetrics;
pub use pacer::SendPacer;
pub use queue::{SendJob, SendTicket};
pub use retry::RetryPolicy;
