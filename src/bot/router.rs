//! Command/event router.
//!
//! Transport adapters turn raw updates into [`InboundEvent`]s; the router
//! picks the handler. Commands come first, then button presses, then free
//! text routed by the conversation state.

use crate::bot::commands::Command;
use crate::bot::handlers::{self, BotContext, ButtonPress, CallbackAction, Sender};
use crate::bot::preferences::{parse_speed, PreferenceUpdate};
use crate::bot::state::{Purpose, TextRoute};
use crate::bot::transport::MessageRef;
use crate::bot::views;
use crate::utils::format_speed;
use tracing::{debug, error, info};

/// An update the bot reacts to, stripped of transport details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Slash command; inline arguments are part of `command`
    Command {
        /// Sender
        from: Sender,
        /// Display name
        first_name: String,
        /// Parsed command
        command: Command,
    },
    /// Plain text message
    Text {
        /// Sender
        from: Sender,
        /// Message text
        text: String,
    },
    /// Inline button press
    Callback {
        /// Sender
        from: Sender,
        /// Display name
        first_name: String,
        /// Id to acknowledge
        callback_id: String,
        /// Message the keyboard belongs to
        message: Option<MessageRef>,
        /// Opaque button payload
        payload: String,
    },
}

#[derive(Debug, Clone, Copy)]
enum Param {
    Voice,
    Speed,
    ImageSize,
    ImageQuality,
}

const EXACT: &[(&str, CallbackAction)] = &[
    (views::CB_BACK_TO_MENU, CallbackAction::BackToMenu),
    (views::CB_SETTINGS, CallbackAction::Settings),
    (views::CB_HELP, CallbackAction::Help),
    (views::CB_INFO, CallbackAction::Info),
    (views::CB_SETTINGS_VOICE, CallbackAction::VoiceMenu),
    (views::CB_SETTINGS_SPEED, CallbackAction::SpeedMenu),
    (views::CB_SETTINGS_IMAGE_SIZE, CallbackAction::ImageSizeMenu),
    (views::CB_SETTINGS_IMAGE_QUALITY, CallbackAction::ImageQualityMenu),
    (views::CB_SPEED_CUSTOM, CallbackAction::CustomSpeed),
];

const PREFIXES: &[(&str, Param)] = &[
    (views::CB_VOICE_PREFIX, Param::Voice),
    (views::CB_SPEED_PREFIX, Param::Speed),
    (views::CB_SIZE_PREFIX, Param::ImageSize),
    (views::CB_QUALITY_PREFIX, Param::ImageQuality),
];

fn parse_param(param: Param, raw: &str) -> CallbackAction {
    let update = match param {
        Param::Voice => raw.parse().map(PreferenceUpdate::Voice).ok(),
        Param::Speed => parse_speed(raw).map(PreferenceUpdate::Speed).ok(),
        Param::ImageSize => raw.parse().map(PreferenceUpdate::ImageSize).ok(),
        Param::ImageQuality => raw.parse().map(PreferenceUpdate::ImageQuality).ok(),
    };
    update.map_or_else(
        || {
            CallbackAction::Invalid(match param {
                Param::Voice => "❌ Невідомий голос",
                Param::Speed => views::INVALID_SPEED_TOAST,
                Param::ImageSize => "❌ Невідомий розмір",
                Param::ImageQuality => "❌ Невідома якість",
            })
        },
        CallbackAction::Set,
    )
}

/// Resolves a button payload: exact match first, then the longest matching
/// parameter prefix. Parameters are validated here.
#[must_use]
pub fn resolve_callback(payload: &str) -> CallbackAction {
    if let Some((_, action)) = EXACT.iter().find(|(name, _)| *name == payload) {
        return *action;
    }
    if let Some(purpose) = Purpose::from_payload(payload) {
        return CallbackAction::Purpose(purpose);
    }
    PREFIXES
        .iter()
        .filter_map(|(prefix, param)| {
            payload
                .strip_prefix(*prefix)
                .map(|raw| (prefix.len(), *param, raw))
        })
        .max_by_key(|(len, _, _)| *len)
        .map_or(CallbackAction::Unknown, |(_, param, raw)| {
            parse_param(param, raw)
        })
}

/// Toast shown when acknowledging a press.
#[must_use]
pub fn callback_toast(action: CallbackAction) -> Option<String> {
    match action {
        CallbackAction::Set(PreferenceUpdate::Voice(v)) => Some(format!("Голос змінено на {v}")),
        CallbackAction::Set(PreferenceUpdate::Speed(s)) => {
            Some(format!("Швидкість змінено на {}x", format_speed(s)))
        }
        CallbackAction::Set(PreferenceUpdate::ImageSize(s)) => {
            Some(format!("Розмір змінено на {s}"))
        }
        CallbackAction::Set(PreferenceUpdate::ImageQuality(q)) => {
            Some(format!("Якість змінено на {q}"))
        }
        CallbackAction::Invalid(toast) => Some(toast.to_string()),
        _ => None,
    }
}

/// Single entry point for inbound events.
#[derive(Clone)]
pub struct Router {
    ctx: BotContext,
}

impl Router {
    /// Creates a router over `ctx`.
    #[must_use]
    pub const fn new(ctx: BotContext) -> Self {
        Self { ctx }
    }

    /// Shared handler state.
    #[must_use]
    pub const fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Handles one event. Slow work is detached, so this returns once the
    /// request is acknowledged. Delivery failures are logged, not returned.
    pub async fn on_event(&self, event: InboundEvent) {
        let ctx = &self.ctx;
        let (user, result) = match event {
            InboundEvent::Command {
                from,
                first_name,
                command,
            } => {
                info!(user_id = %from.user, command = ?command, "Command received");
                let result = handlers::handle_command(ctx, from, &first_name, command).await;
                (from.user, result)
            }
            InboundEvent::Callback {
                from,
                first_name,
                callback_id,
                message,
                payload,
            } => {
                let action = resolve_callback(&payload);
                debug!(user_id = %from.user, payload = %payload, action = ?action, "Button pressed");
                let toast = callback_toast(action);
                ctx.messenger
                    .answer_callback(&callback_id, toast.as_deref())
                    .await;
                let press = ButtonPress {
                    from,
                    target: message,
                    first_name: &first_name,
                };
                (from.user, handlers::handle_callback(ctx, press, action).await)
            }
            InboundEvent::Text { from, text } => {
                let result = match ctx.states.route_incoming_text(from.user).await {
                    TextRoute::Purpose(purpose) => {
                        handlers::handle_purpose_text(ctx, from, purpose, &text).await
                    }
                    TextRoute::CustomSpeed => handlers::handle_custom_speed(ctx, from, &text).await,
                    TextRoute::Echo => handlers::handle_echo(ctx, from.chat, &text).await,
                };
                (from.user, result)
            }
        };

        if let Err(e) = result {
            error!(user_id = %user, error = %e, "Failed to deliver reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::preferences::{ImageQuality, ImageSize, Voice};

    #[test]
    fn test_exact_match_wins_over_prefix() {
        assert_eq!(resolve_callback("speed_custom"), CallbackAction::CustomSpeed);
        assert_eq!(resolve_callback("settings_voice"), CallbackAction::VoiceMenu);
        assert_eq!(resolve_callback("settings"), CallbackAction::Settings);
        assert_eq!(
            resolve_callback("tts"),
            CallbackAction::Purpose(Purpose::Tts)
        );
    }

    #[test]
    fn test_parameterised_payloads() {
        assert_eq!(
            resolve_callback("voice_nova"),
            CallbackAction::Set(PreferenceUpdate::Voice(Voice::Nova))
        );
        assert_eq!(
            resolve_callback("speed_1.25"),
            CallbackAction::Set(PreferenceUpdate::Speed(1.25))
        );
        assert_eq!(
            resolve_callback("size_1024x1536"),
            CallbackAction::Set(PreferenceUpdate::ImageSize(ImageSize::Portrait))
        );
        assert_eq!(
            resolve_callback("quality_medium"),
            CallbackAction::Set(PreferenceUpdate::ImageQuality(ImageQuality::Medium))
        );
    }

    #[test]
    fn test_invalid_and_unknown_payloads() {
        assert_eq!(
            resolve_callback("speed_fast"),
            CallbackAction::Invalid("❌ Невірний формат швидкості")
        );
        assert_eq!(
            resolve_callback("speed_9"),
            CallbackAction::Invalid("❌ Невірний формат швидкості")
        );
        assert!(matches!(resolve_callback("voice_robot"), CallbackAction::Invalid(_)));
        assert_eq!(resolve_callback("agent_mode"), CallbackAction::Unknown);
    }

    #[test]
    fn test_toasts() {
        assert_eq!(
            callback_toast(resolve_callback("speed_2.0")).as_deref(),
            Some("Швидкість змінено на 2.0x")
        );
        assert_eq!(
            callback_toast(resolve_callback("voice_echo")).as_deref(),
            Some("Голос змінено на echo")
        );
        assert_eq!(callback_toast(CallbackAction::Settings), None);
    }
}
