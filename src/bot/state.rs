//! Per-user conversation state.
//!
//! A pending prompt is consumed by the next plain-text message from that user.

use crate::bot::transport::UserId;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// What the next free-text message from a user is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Free-form question
    Ask,
    /// Creative writing
    Creative,
    /// Code generation
    Code,
    /// Translation
    Translate,
    /// Summary
    Summarize,
    /// Explanation
    Explain,
    /// Speech synthesis
    Tts,
    /// Image generation
    Image,
}

impl Purpose {
    /// Every purpose, in main menu order.
    pub const ALL: [Self; 8] = [
        Self::Ask,
        Self::Creative,
        Self::Code,
        Self::Translate,
        Self::Summarize,
        Self::Explain,
        Self::Tts,
        Self::Image,
    ];

    /// Callback payload of the main menu button.
    #[must_use]
    pub const fn payload(self) -> &'static str {
        match self {
            Self::Ask => "ask_ai",
            Self::Creative => "creative",
            Self::Code => "code",
            Self::Translate => "translate",
            Self::Summarize => "summarize",
            Self::Explain => "explain",
            Self::Tts => "tts",
            Self::Image => "image",
        }
    }

    /// Purpose of a main menu payload.
    #[must_use]
    pub fn from_payload(payload: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.payload() == payload)
    }
}

/// Represents the current state of the user dialogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// Nothing pending; free text is echoed
    #[default]
    Idle,
    /// The next text message goes to the purpose's handler
    AwaitingFreeText(Purpose),
    /// The next text message is a custom speech speed
    AwaitingSpeedInput,
}

/// Handler chosen for an incoming free-text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRoute {
    /// Handler of a purpose
    Purpose(Purpose),
    /// Custom speed input
    CustomSpeed,
    /// Generic echo fallback
    Echo,
}

/// Per-user conversation state.
///
/// Routing consumes the state: once a text message has been routed, the user
/// is `Idle` no matter how the handler ends, panics included. A handler that
/// needs another message (invalid speed input) enters the state again.
#[derive(Debug, Default)]
pub struct ConversationStates {
    states: Mutex<HashMap<UserId, ConversationState>>,
}

impl ConversationStates {
    /// Creates a store where every user is `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; `Idle` for unknown users.
    pub async fn current(&self, user: UserId) -> ConversationState {
        self.states
            .lock()
            .await
            .get(&user)
            .copied()
            .unwrap_or_default()
    }

    /// Picks the handler for a text message and resets the user to `Idle`.
    pub async fn route_incoming_text(&self, user: UserId) -> TextRoute {
        let previous = self.states.lock().await.remove(&user).unwrap_or_default();
        debug!(user_id = %user, state = ?previous, "Routing free text");
        match previous {
            ConversationState::Idle => TextRoute::Echo,
            ConversationState::AwaitingFreeText(purpose) => TextRoute::Purpose(purpose),
            ConversationState::AwaitingSpeedInput => TextRoute::CustomSpeed,
        }
    }

    /// Primes the user for a follow-up message; replaces any previous state.
    pub async fn enter(&self, user: UserId, purpose: Purpose) {
        self.set(user, ConversationState::AwaitingFreeText(purpose)).await;
    }

    /// Primes the user for a custom speed value.
    pub async fn enter_speed_input(&self, user: UserId) {
        self.set(user, ConversationState::AwaitingSpeedInput).await;
    }

    /// Forces the user back to `Idle`.
    pub async fn clear(&self, user: UserId) {
        self.states.lock().await.remove(&user);
    }

    async fn set(&self, user: UserId, state: ConversationState) {
        self.states.lock().await.insert(user, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserId = UserId(42);

    #[tokio::test]
    async fn test_unknown_user_is_idle_and_echoed() {
        let states = ConversationStates::new();
        assert_eq!(states.current(USER).await, ConversationState::Idle);
        assert_eq!(states.route_incoming_text(USER).await, TextRoute::Echo);
    }

    #[tokio::test]
    async fn test_routing_consumes_state() {
        let states = ConversationStates::new();
        states.enter(USER, Purpose::Image).await;

        assert_eq!(
            states.route_incoming_text(USER).await,
            TextRoute::Purpose(Purpose::Image)
        );
        assert_eq!(states.current(USER).await, ConversationState::Idle);
        assert_eq!(states.route_incoming_text(USER).await, TextRoute::Echo);
    }

    #[tokio::test]
    async fn test_enter_replaces_previous_state() {
        let states = ConversationStates::new();
        states.enter(USER, Purpose::Ask).await;
        states.enter_speed_input(USER).await;

        assert_eq!(states.current(USER).await, ConversationState::AwaitingSpeedInput);
        assert_eq!(states.route_incoming_text(USER).await, TextRoute::CustomSpeed);
    }

    #[tokio::test]
    async fn test_clear_and_user_isolation() {
        let states = ConversationStates::new();
        states.enter(USER, Purpose::Tts).await;
        states.enter(UserId(7), Purpose::Code).await;
        states.clear(USER).await;

        assert_eq!(states.current(USER).await, ConversationState::Idle);
        assert_eq!(
            states.current(UserId(7)).await,
            ConversationState::AwaitingFreeText(Purpose::Code)
        );
    }

    #[test]
    fn test_payload_mapping() {
        for purpose in Purpose::ALL {
            assert_eq!(Purpose::from_payload(purpose.payload()), Some(purpose));
        }
        assert_eq!(Purpose::from_payload("settings"), None);
    }
}
