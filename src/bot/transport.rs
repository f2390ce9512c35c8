//! Chat transport seam.
//!
//! The dispatch core talks to the chat platform only through
//! [`ChatTransport`]. All text is sent in HTML parse mode.

use crate::bot::resilient::{Classify, Failure};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable identifier of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Chat a message is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatRef(pub i64);

/// Message inside a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inline keyboard button carrying an opaque callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label shown to the user
    pub text: String,
    /// Callback payload delivered on press
    pub payload: String,
}

impl Button {
    /// Creates a callback button.
    pub fn new(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: payload.into(),
        }
    }
}

/// Inline keyboard attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    /// Button rows, top to bottom
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// Keyboard from rows of buttons.
    #[must_use]
    pub const fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Keyboard with a single button.
    pub fn single(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(vec![vec![Button::new(text, payload)]])
    }

    /// Every payload on the keyboard, row by row.
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.payload.as_str())
    }
}

/// Failure reported by a transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Flood control; `Some` when the platform said how long to wait.
    #[error("rate limited (retry after {0:?})")]
    RateLimited(Option<Duration>),
    /// Connection, timeout or I/O failure.
    #[error("network error: {0}")]
    Network(String),
    /// Edit with identical content.
    #[error("message is not modified")]
    NotModified,
    /// Edit target deleted, expired or otherwise not editable.
    #[error("message to edit is gone: {0}")]
    StaleTarget(String),
    /// Any other API rejection.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl Classify for TransportError {
    fn classify(&self) -> Failure {
        match self {
            Self::RateLimited(wait) => Failure::RateLimited(*wait),
            Self::Network(_) => Failure::Transient,
            Self::NotModified => Failure::NotModified,
            Self::StaleTarget(_) => Failure::StaleTarget,
            Self::Rejected(_) => Failure::Permanent,
        }
    }
}

/// Outbound chat operations used by the dispatch core.
///
/// Implementations perform exactly one request per call; retries are the
/// caller's business (see [`crate::bot::messaging::Messenger`]).
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends an HTML message, returning its reference.
    async fn send_message(
        &self,
        chat: ChatRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, TransportError>;

    /// Replaces text and keyboard of an existing message.
    async fn edit_message(
        &self,
        chat: ChatRef,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    /// Deletes a message.
    async fn delete_message(&self, chat: ChatRef, message: MessageRef)
        -> Result<(), TransportError>;

    /// Sends an MP3 voice message.
    async fn send_voice(
        &self,
        chat: ChatRef,
        audio: &[u8],
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Sends a single photo.
    async fn send_photo(
        &self,
        chat: ChatRef,
        image: &[u8],
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Sends photos as one album; the caption goes on the first item.
    async fn send_media_group(
        &self,
        chat: ChatRef,
        images: &[Vec<u8>],
        caption: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Acknowledges a button press, optionally with a toast.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let wait = Duration::from_secs(3);
        assert_eq!(
            TransportError::RateLimited(Some(wait)).classify(),
            Failure::RateLimited(Some(wait))
        );
        assert_eq!(
            TransportError::Network("reset".into()).classify(),
            Failure::Transient
        );
        assert_eq!(TransportError::NotModified.classify(), Failure::NotModified);
        assert_eq!(
            TransportError::StaleTarget("deleted".into()).classify(),
            Failure::StaleTarget
        );
        assert_eq!(
            TransportError::Rejected("chat not found".into()).classify(),
            Failure::Permanent
        );
    }

    #[test]
    fn test_keyboard_payloads() {
        let keyboard = Keyboard::new(vec![
            vec![Button::new("A", "a"), Button::new("B", "b")],
            vec![Button::new("C", "c")],
        ]);
        assert_eq!(keyboard.payloads().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
