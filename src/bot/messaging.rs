//! Resilient messaging on top of [`ChatTransport`].
//!
//! [`Messenger`] routes every transport call through the resilient call
//! wrapper and adds the message-level conveniences handlers need: long
//! message splitting, edit-or-resend and best-effort deletes.

use crate::bot::resilient::{invoke, invoke_edit, CallError, EditOutcome, RetryPolicy};
use crate::bot::transport::{ChatRef, ChatTransport, Keyboard, MessageRef, TransportError};
use crate::utils;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum message length for Telegram with safety margin.
/// Telegram's official limit is 4096 characters.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Maximum caption length for media.
pub const TELEGRAM_CAPTION_LIMIT: usize = 1000;

/// Result type of messenger operations.
pub type SendResult<T> = Result<T, CallError<TransportError>>;

/// Retrying façade over a [`ChatTransport`].
#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn ChatTransport>,
    policy: RetryPolicy,
}

impl Messenger {
    /// Creates a messenger using `policy` for every call.
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Retry policy applied to transport calls.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends one HTML message.
    ///
    /// # Errors
    ///
    /// Returns an error once the wrapper gives up.
    pub async fn send_text(
        &self,
        chat: ChatRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> SendResult<MessageRef> {
        let transport = &self.transport;
        invoke(&self.policy, move || {
            transport.send_message(chat, text, keyboard)
        })
        .await
    }

    /// Sends already split parts in order, attaching the keyboard to the
    /// last one. Nothing is sent for an empty slice.
    ///
    /// # Errors
    ///
    /// Returns an error if any part fails to send.
    pub async fn send_parts(
        &self,
        chat: ChatRef,
        parts: &[String],
        keyboard: Option<&Keyboard>,
    ) -> SendResult<()> {
        let last = parts.len().saturating_sub(1);

        for (i, part) in parts.iter().enumerate() {
            let markup = if i == last { keyboard } else { None };
            self.send_text(chat, part, markup).await?;
        }

        Ok(())
    }

    /// Edits a message, sending a fresh one when the target is gone.
    ///
    /// Text over the Telegram limit is truncated.
    ///
    /// # Errors
    ///
    /// Returns an error when neither the edit nor the fresh send succeeds.
    pub async fn edit_or_send(
        &self,
        chat: ChatRef,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> SendResult<EditOutcome<MessageRef>> {
        let text = if text.chars().count() > TELEGRAM_MESSAGE_LIMIT {
            format!(
                "{}...\n\n<i>(повідомлення обрізано)</i>",
                utils::truncate_str(text, TELEGRAM_MESSAGE_LIMIT - 40)
            )
        } else {
            text.to_string()
        };
        let text = text.as_str();
        let transport = &self.transport;

        invoke_edit(
            &self.policy,
            move || transport.edit_message(chat, message, text, keyboard),
            move || transport.send_message(chat, text, keyboard),
        )
        .await
    }

    /// Shows a screen: edits `target` when there is one, otherwise sends.
    ///
    /// # Errors
    ///
    /// Returns an error once the wrapper gives up.
    pub async fn show(
        &self,
        chat: ChatRef,
        target: Option<MessageRef>,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> SendResult<()> {
        match target {
            Some(message) => self
                .edit_or_send(chat, message, text, keyboard)
                .await
                .map(|_| ()),
            None => self.send_text(chat, text, keyboard).await.map(|_| ()),
        }
    }

    /// Deletes a message; failures are logged and swallowed.
    pub async fn delete_best_effort(&self, chat: ChatRef, message: MessageRef) {
        let transport = &self.transport;
        if let Err(e) = invoke(&self.policy, move || transport.delete_message(chat, message)).await
        {
            debug!(chat = %chat, error = %e, "Message delete skipped");
        }
    }

    /// Sends a voice message.
    ///
    /// # Errors
    ///
    /// Returns an error once the wrapper gives up.
    pub async fn send_voice(
        &self,
        chat: ChatRef,
        audio: &[u8],
        caption: Option<&str>,
    ) -> SendResult<()> {
        let transport = &self.transport;
        invoke(&self.policy, move || transport.send_voice(chat, audio, caption)).await
    }

    /// Sends a single photo.
    ///
    /// # Errors
    ///
    /// Returns an error once the wrapper gives up.
    pub async fn send_photo(
        &self,
        chat: ChatRef,
        image: &[u8],
        caption: Option<&str>,
    ) -> SendResult<()> {
        let transport = &self.transport;
        invoke(&self.policy, move || transport.send_photo(chat, image, caption)).await
    }

    /// Sends photos as one album.
    ///
    /// # Errors
    ///
    /// Returns an error once the wrapper gives up.
    pub async fn send_media_group(
        &self,
        chat: ChatRef,
        images: &[Vec<u8>],
        caption: Option<&str>,
    ) -> SendResult<()> {
        let transport = &self.transport;
        invoke(&self.policy, move || {
            transport.send_media_group(chat, images, caption)
        })
        .await
    }

    /// Acknowledges a button press. Failures are logged, never propagated:
    /// an unanswered callback only leaves a spinner on the client.
    pub async fn answer_callback(&self, callback_id: &str, text: Option<&str>) {
        let transport = &self.transport;
        if let Err(e) = invoke(&self.policy, move || {
            transport.answer_callback(callback_id, text)
        })
        .await
        {
            warn!(error = %e, "Failed to answer callback query");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingTransport, Sent};

    fn messenger(transport: &Arc<RecordingTransport>) -> Messenger {
        Messenger::new(transport.clone(), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_parts_puts_keyboard_on_last_part() {
        let transport = Arc::new(RecordingTransport::new());
        let parts = utils::split_long_message(&"рядок\n".repeat(1500), TELEGRAM_MESSAGE_LIMIT);
        let keyboard = Keyboard::single("🏠", "back_to_menu");

        messenger(&transport)
            .send_parts(ChatRef(1), &parts, Some(&keyboard))
            .await
            .expect("send should succeed");

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        for (i, entry) in sent.iter().enumerate() {
            let Sent::Message { keyboard: kb, .. } = entry else {
                panic!("expected text messages");
            };
            assert_eq!(kb.is_some(), i == 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_or_send_resends_when_target_is_gone() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_next_edit(TransportError::StaleTarget("deleted".into()));

        let outcome = messenger(&transport)
            .edit_or_send(ChatRef(1), MessageRef(7), "готово", None)
            .await
            .expect("edit should resolve");

        assert!(matches!(outcome, EditOutcome::Resent(_)));
        assert_eq!(transport.last_text().as_deref(), Some("готово"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failures_are_swallowed() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_next_delete(TransportError::Rejected("can't be deleted".into()));

        messenger(&transport)
            .delete_best_effort(ChatRef(1), MessageRef(3))
            .await;

        assert!(transport.sent().is_empty());
    }
}
