//! Error types for Pacer
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

/// All error types that can occur in Pacer.
///
/// The transport adapter classifies every send failure into one of the first
/// three variants; the scheduler decides retry behavior purely from the
/// variant, never from message text.
#[derive(Debug, Error)]
pub enum PacerError {
    /// Platform explicitly asked to wait before sending again
    #[error("Rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// Wait duration signaled by the platform
        retry_after: Duration,
    },

    /// Network-level failure (timeout, connectivity); retryable
    #[error("Transient send failure: {0}")]
    Transient(String),

    /// Non-recoverable send failure (bad recipient, malformed payload)
    #[error("Permanent send failure: {0}")]
    Permanent(String),

    /// Entry cancelled before dispatch; the operation was never invoked
    #[error("Send cancelled before dispatch")]
    Cancelled,

    /// Scheduler stopped while the entry was still queued
    #[error("Scheduler shut down with send still queued")]
    Shutdown,

    /// Enqueue called on a scheduler whose worker is not running
    #[error("Scheduler not started")]
    NotStarted,

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl PacerError {
    /// True when the retry policy may reschedule this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_))
    }
}

/// Result type alias for Pacer operations
pub type Result<T> = std::result::Result<T, PacerError>;
