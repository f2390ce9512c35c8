//! Telegram adapter: [`ChatTransport`] over `teloxide` and the update schema
//! feeding the [`Router`].

use crate::bot::commands::Command;
use crate::bot::handlers::Sender;
use crate::bot::router::{InboundEvent, Router};
use crate::bot::transport::{ChatRef, ChatTransport, Keyboard, MessageRef, TransportError, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia,
    InputMediaPhoto, MessageId, ParseMode,
};
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

/// Sends through the Telegram Bot API. One request per call.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wraps a bot client.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.text.clone(), b.payload.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Maps a Bot API error onto the transport taxonomy.
#[must_use]
pub fn map_request_error(e: &RequestError) -> TransportError {
    match e {
        RequestError::RetryAfter(wait) => TransportError::RateLimited(Some(wait.duration())),
        RequestError::Network(_) | RequestError::Io(_) => TransportError::Network(e.to_string()),
        RequestError::Api(ApiError::MessageNotModified) => TransportError::NotModified,
        RequestError::Api(
            ApiError::MessageToEditNotFound
            | ApiError::MessageIdInvalid
            | ApiError::MessageCantBeEdited
            | ApiError::MessageToDeleteNotFound
            | ApiError::MessageCantBeDeleted,
        ) => TransportError::StaleTarget(e.to_string()),
        RequestError::Api(ApiError::Unknown(text)) if text.contains("Too Many Requests") => {
            TransportError::RateLimited(None)
        }
        _ => TransportError::Rejected(e.to_string()),
    }
}

fn mapped(e: &RequestError) -> TransportError {
    let mapped = map_request_error(e);
    debug!(error = %e, mapped = ?mapped, "Bot API call failed");
    mapped
}

fn photo_file(image: &[u8], name: String) -> InputFile {
    InputFile::memory(image.to_vec()).file_name(name)
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(
        &self,
        chat: ChatRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, TransportError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat.0), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_keyboard(keyboard));
        }
        request
            .await
            .map(|m| MessageRef(m.id.0))
            .map_err(|e| mapped(&e))
    }

    async fn edit_message(
        &self,
        chat: ChatRef,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .edit_message_text(ChatId(chat.0), MessageId(message.0), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_keyboard(keyboard));
        }
        request.await.map(|_| ()).map_err(|e| mapped(&e))
    }

    async fn delete_message(
        &self,
        chat: ChatRef,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(chat.0), MessageId(message.0))
            .await
            .map(|_| ())
            .map_err(|e| mapped(&e))
    }

    async fn send_voice(
        &self,
        chat: ChatRef,
        audio: &[u8],
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let file = InputFile::memory(audio.to_vec()).file_name("speech.mp3");
        let mut request = self.bot.send_voice(ChatId(chat.0), file);
        if let Some(caption) = caption {
            request = request.caption(caption).parse_mode(ParseMode::Html);
        }
        request.await.map(|_| ()).map_err(|e| mapped(&e))
    }

    async fn send_photo(
        &self,
        chat: ChatRef,
        image: &[u8],
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let file = photo_file(image, "generated_image.png".to_string());
        let mut request = self.bot.send_photo(ChatId(chat.0), file);
        if let Some(caption) = caption {
            request = request.caption(caption).parse_mode(ParseMode::Html);
        }
        request.await.map(|_| ()).map_err(|e| mapped(&e))
    }

    async fn send_media_group(
        &self,
        chat: ChatRef,
        images: &[Vec<u8>],
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        let media = images.iter().enumerate().map(|(i, image)| {
            let file = photo_file(image, format!("generated_image_{}.png", i + 1));
            let photo = InputMediaPhoto::new(file);
            let photo = match caption {
                Some(caption) if i == 0 => photo.caption(caption).parse_mode(ParseMode::Html),
                _ => photo,
            };
            InputMedia::Photo(photo)
        });
        self.bot
            .send_media_group(ChatId(chat.0), media)
            .await
            .map(|_| ())
            .map_err(|e| mapped(&e))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if let Some(text) = text {
            request = request.text(text);
        }
        request.await.map(|_| ()).map_err(|e| mapped(&e))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Updates
// ─────────────────────────────────────────────────────────────────────────────

fn message_sender(msg: &Message) -> (Sender, String) {
    let user = msg.from.as_ref();
    let sender = Sender {
        chat: ChatRef(msg.chat.id.0),
        user: UserId(user.map_or(msg.chat.id.0, |u| u.id.0.cast_signed())),
    };
    let first_name = user.map_or_else(String::new, |u| u.first_name.clone());
    (sender, first_name)
}

/// Update schema: button presses, then commands, then plain text.
#[must_use]
pub fn schema() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(on_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(on_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some()).endpoint(on_text),
                ),
        )
}

async fn on_command(msg: Message, command: Command, router: Arc<Router>) -> ResponseResult<()> {
    let (from, first_name) = message_sender(&msg);
    router
        .on_event(InboundEvent::Command {
            from,
            first_name,
            command,
        })
        .await;
    respond(())
}

async fn on_text(msg: Message, router: Arc<Router>) -> ResponseResult<()> {
    let (from, _) = message_sender(&msg);
    let text = msg.text().unwrap_or_default().to_string();
    router.on_event(InboundEvent::Text { from, text }).await;
    respond(())
}

async fn on_callback(q: CallbackQuery, router: Arc<Router>) -> ResponseResult<()> {
    let user = UserId(q.from.id.0.cast_signed());
    let chat = q
        .message
        .as_ref()
        .map_or(ChatRef(user.0), |m| ChatRef(m.chat().id.0));
    let Some(payload) = q.data.clone() else {
        warn!(user_id = %user, "Callback without data");
        router.context().messenger.answer_callback(&q.id.0, None).await;
        return respond(());
    };

    router
        .on_event(InboundEvent::Callback {
            from: Sender { chat, user },
            first_name: q.from.first_name.clone(),
            callback_id: q.id.0.clone(),
            message: q.message.as_ref().map(|m| MessageRef(m.id().0)),
            payload,
        })
        .await;
    respond(())
}
