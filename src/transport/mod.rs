//! Transport seam to the concrete messaging platform.
//!
//! The scheduler never talks to the platform directly; it goes through the
//! [`Transport`] trait. Implementations classify every failure into
//! `PacerError::{RateLimited, Transient, Permanent}` at this boundary, so the
//! retry policy works on tagged variants instead of parsing error text.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

mod memory;

pub use memory::{MemoryTransport, SentMessage};

/// Recipient identifier: numeric chat id or an opaque string key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChatId {
    /// Numeric chat identifier
    Int(i64),
    /// String chat key (e.g. a channel username)
    Key(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{}", id),
            Self::Key(key) => write!(f, "{}", key),
        }
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for ChatId {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for ChatId {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

/// Presence signal shown to a chat while a send is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    /// "typing..." indicator
    Typing,
    /// Photo upload indicator
    UploadPhoto,
    /// Document upload indicator
    UploadDocument,
}

impl ChatAction {
    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::UploadPhoto => "upload_photo",
            Self::UploadDocument => "upload_document",
        }
    }
}

/// Reference to a media object the platform can resolve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum MediaRef {
    /// Publicly reachable URL
    Url(String),
    /// Platform-side file identifier from a previous upload
    FileId(String),
}

/// Kind discriminator for media-group items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

/// One item of a media group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct InputMedia {
    /// Media reference
    pub media: MediaRef,
    /// Item kind
    pub kind: MediaKind,
    /// Optional per-item caption
    pub caption: Option<String>,
}

/// Optional knobs forwarded verbatim with a send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SendOptions {
    /// Text formatting mode understood by the platform
    pub parse_mode: Option<String>,
    /// Suppress the recipient-side notification sound
    pub disable_notification: bool,
    /// Message id this send replies to
    pub reply_to_message_id: Option<i64>,
    /// Caption for single-media sends
    pub caption: Option<String>,
}

/// Acknowledgement returned by the platform for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Delivery {
    /// Chat the message landed in
    pub chat_id: ChatId,
    /// Platform-assigned message id, when the platform reports one
    pub message_id: Option<i64>,
}

/// Adapter to the concrete messaging platform.
///
/// Implementations must classify failures: an explicit platform wait request
/// becomes `PacerError::RateLimited`, network/timeout trouble becomes
/// `PacerError::Transient`, anything else `PacerError::Permanent`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message.
    async fn send_message(&self, chat_id: &ChatId, text: &str, opts: &SendOptions) -> Result<Delivery>;

    /// Send a single photo.
    async fn send_photo(&self, chat_id: &ChatId, photo: &MediaRef, opts: &SendOptions) -> Result<Delivery>;

    /// Send a single document.
    async fn send_document(&self, chat_id: &ChatId, document: &MediaRef, opts: &SendOptions) -> Result<Delivery>;

    /// Send an album of media items.
    async fn send_media_group(&self, chat_id: &ChatId, media: &[InputMedia], opts: &SendOptions) -> Result<Delivery>;

    /// Best-effort presence signal; failures are the caller's to swallow.
    async fn send_chat_action(&self, chat_id: &ChatId, action: ChatAction) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_display() {
        assert_eq!(ChatId::Int(42).to_string(), "42");
        assert_eq!(ChatId::from("@news").to_string(), "@news");
    }

    #[test]
    fn test_chat_id_from_conversions() {
        assert_eq!(ChatId::from(7i64), ChatId::Int(7));
        assert_eq!(ChatId::from("key".to_string()), ChatId::Key("key".to_string()));
    }

    #[test]
    fn test_chat_id_serde_untagged() {
        let int_id: ChatId = serde_json::from_str("123").unwrap();
        assert_eq!(int_id, ChatId::Int(123));

        let key_id: ChatId = serde_json::from_str("\"@channel\"").unwrap();
        assert_eq!(key_id, ChatId::Key("@channel".to_string()));
    }

    #[test]
    fn test_chat_action_wire_names() {
        assert_eq!(ChatAction::Typing.as_str(), "typing");
        assert_eq!(ChatAction::UploadPhoto.as_str(), "upload_photo");
        assert_eq!(ChatAction::UploadDocument.as_str(), "upload_document");
    }

    #[test]
    fn test_send_options_default() {
        let opts = SendOptions::default();
        assert!(opts.parse_mode.is_none());
        assert!(!opts.disable_notification);
        assert!(opts.reply_to_message_id.is_none());
    }
}
