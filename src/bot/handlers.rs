//! Handlers behind commands, buttons and state-routed text.
//!
//! Fast paths reply inline. AI capabilities acknowledge with a status
//! message and hand the provider call to the [`BackgroundDispatcher`].

use crate::ai::prompts::TextTask;
use crate::ai::AiServices;
use crate::bot::background::{
    fetch_hints, BackgroundDispatcher, OperationKind, StatusUpdater, TaskFailure,
};
use crate::bot::commands::{parse_tts_arguments, Command};
use crate::bot::messaging::{Messenger, SendResult};
use crate::bot::preferences::{
    parse_speed, PreferenceStore, PreferenceUpdate, SpeedError, UserPreferences, Voice, MAX_SPEED,
    MIN_SPEED,
};
use crate::bot::state::{ConversationStates, Purpose};
use crate::bot::transport::{ChatRef, Keyboard, MessageRef, UserId};
use crate::bot::views;
use crate::utils::sanitize_telegram_text;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Prompt used by `/image_debug` without arguments.
pub const IMAGE_DEBUG_DEFAULT_PROMPT: &str = "A simple red circle";

/// Images requested per generation.
const IMAGE_VARIANTS: u8 = 2;

/// Shared state every handler works with.
#[derive(Clone)]
pub struct BotContext {
    /// Resilient messaging
    pub messenger: Messenger,
    /// Background units
    pub dispatcher: Arc<BackgroundDispatcher>,
    /// Per-user conversation state
    pub states: Arc<ConversationStates>,
    /// Per-user preferences
    pub preferences: Arc<PreferenceStore>,
    /// AI providers
    pub ai: AiServices,
    /// Deadline of option hint lookups
    pub hints_timeout: Duration,
    /// Image model shown by `/image_debug`
    pub image_model: String,
}

impl BotContext {
    /// Creates a context with empty stores.
    #[must_use]
    pub fn new(messenger: Messenger, ai: AiServices, image_model: String) -> Self {
        Self {
            dispatcher: Arc::new(BackgroundDispatcher::new(messenger.clone())),
            messenger,
            states: Arc::new(ConversationStates::new()),
            preferences: Arc::new(PreferenceStore::new()),
            ai,
            hints_timeout: crate::config::get_hint_fetch_timeout(),
            image_model,
        }
    }
}

/// Where a request came from; menu flows get a back button on results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Slash command with inline arguments
    Command,
    /// Button followed by free text
    Menu,
}

impl Origin {
    fn result_keyboard(self) -> Option<Keyboard> {
        match self {
            Self::Command => None,
            Self::Menu => Some(views::back_to_menu_keyboard()),
        }
    }
}

/// Who sent an event and where to reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    /// Chat to reply in
    pub chat: ChatRef,
    /// User the state and preferences belong to
    pub user: UserId,
}

const fn text_kind(purpose: Purpose) -> Option<OperationKind> {
    match purpose {
        Purpose::Ask => Some(OperationKind::Ask),
        Purpose::Creative => Some(OperationKind::Creative),
        Purpose::Code => Some(OperationKind::Code),
        Purpose::Translate => Some(OperationKind::Translate),
        Purpose::Summarize => Some(OperationKind::Summarize),
        Purpose::Explain => Some(OperationKind::Explain),
        Purpose::Tts | Purpose::Image => None,
    }
}

fn text_task(kind: OperationKind) -> TextTask {
    match kind {
        OperationKind::Creative => TextTask::Creative,
        OperationKind::Code => TextTask::code(),
        OperationKind::Translate => TextTask::translate(),
        OperationKind::Summarize => TextTask::Summarize,
        OperationKind::Explain => TextTask::Explain,
        _ => TextTask::Ask,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Handles a slash command. Commands bypass the conversation state, except
/// `/start` which resets it.
///
/// # Errors
///
/// Returns an error when a reply can't be delivered.
pub async fn handle_command(
    ctx: &BotContext,
    from: Sender,
    first_name: &str,
    command: Command,
) -> SendResult<()> {
    let chat = from.chat;
    match command {
        Command::Start => start(ctx, from, None, first_name).await,
        Command::Help => {
            let keyboard = views::back_to_menu_keyboard();
            send(ctx, chat, views::HELP_COMMAND_TEXT, Some(&keyboard)).await
        }
        Command::Info => send(ctx, chat, &views::info_text(ctx.ai.is_configured()), None).await,
        Command::Echo(text) if text.trim().is_empty() => {
            send(ctx, chat, views::ECHO_USAGE_TEXT, None).await
        }
        Command::Echo(text) => send(ctx, chat, &views::echo_text(text.trim()), None).await,
        Command::Ask(args) => text_command(ctx, chat, OperationKind::Ask, &args).await,
        Command::Creative(args) => text_command(ctx, chat, OperationKind::Creative, &args).await,
        Command::Code(args) => text_command(ctx, chat, OperationKind::Code, &args).await,
        Command::Translate(args) => text_command(ctx, chat, OperationKind::Translate, &args).await,
        Command::Summarize(args) => text_command(ctx, chat, OperationKind::Summarize, &args).await,
        Command::Explain(args) => text_command(ctx, chat, OperationKind::Explain, &args).await,
        Command::Tts(args) => tts_command(ctx, from, &args).await,
        Command::TtsSettings => tts_settings(ctx, from).await,
        Command::Image(args) => {
            if !guard_configured(ctx, chat, None).await? {
                return Ok(());
            }
            let prompt = args.trim();
            if prompt.is_empty() {
                return send(ctx, chat, views::usage_text(OperationKind::Image), None).await;
            }
            start_images(ctx, from, prompt.to_string(), Origin::Command).await
        }
        Command::ImageDebug(args) => image_debug(ctx, from, args.trim()).await,
    }
}

async fn send(
    ctx: &BotContext,
    chat: ChatRef,
    text: &str,
    keyboard: Option<&Keyboard>,
) -> SendResult<()> {
    ctx.messenger.send_text(chat, text, keyboard).await.map(|_| ())
}

/// Replies with the "not configured" text unless AI is available.
async fn guard_configured(
    ctx: &BotContext,
    chat: ChatRef,
    keyboard: Option<&Keyboard>,
) -> SendResult<bool> {
    if ctx.ai.is_configured() {
        return Ok(true);
    }
    info!(chat = %chat, "AI request without configured provider");
    send(ctx, chat, views::NOT_CONFIGURED_TEXT, keyboard).await?;
    Ok(false)
}

/// Welcome screen; resets the conversation state.
async fn start(
    ctx: &BotContext,
    from: Sender,
    target: Option<MessageRef>,
    first_name: &str,
) -> SendResult<()> {
    ctx.states.clear(from.user).await;
    let text = views::welcome_text(first_name, ctx.ai.is_configured());
    ctx.messenger
        .show(from.chat, target, &text, Some(&views::main_menu_keyboard()))
        .await
}

async fn text_command(
    ctx: &BotContext,
    chat: ChatRef,
    kind: OperationKind,
    args: &str,
) -> SendResult<()> {
    if !guard_configured(ctx, chat, None).await? {
        return Ok(());
    }
    let input = args.trim();
    if input.is_empty() {
        return send(ctx, chat, views::usage_text(kind), None).await;
    }
    start_text_task(ctx, chat, kind, input.to_string(), Origin::Command).await
}

async fn tts_command(ctx: &BotContext, from: Sender, args: &str) -> SendResult<()> {
    if !guard_configured(ctx, from.chat, None).await? {
        return Ok(());
    }
    if args.trim().is_empty() {
        return send(ctx, from.chat, views::TTS_USAGE_TEXT, None).await;
    }
    let parsed = match parse_tts_arguments(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            info!(user_id = %from.user, error = ?e, "Invalid /tts arguments");
            return send(ctx, from.chat, &e.to_string(), None).await;
        }
    };

    let prefs = ctx.preferences.get(from.user).await;
    let voice = parsed.voice.unwrap_or(prefs.voice);
    let speed = parsed.speed.unwrap_or(prefs.speed);
    start_speech(ctx, from.chat, parsed.text, (voice, speed), Origin::Command).await
}

async fn tts_settings(ctx: &BotContext, from: Sender) -> SendResult<()> {
    if !guard_configured(ctx, from.chat, None).await? {
        return Ok(());
    }
    let prefs = ctx.preferences.get(from.user).await;
    let (voices, range) = fetch_hints(ctx.hints_timeout, ctx.ai.speech_options())
        .await
        .unwrap_or_else(|| (Voice::ALL.to_vec(), (MIN_SPEED, MAX_SPEED)));
    send(ctx, from.chat, &views::tts_settings_text(&prefs, &voices, range), None).await
}

async fn image_debug(ctx: &BotContext, from: Sender, args: &str) -> SendResult<()> {
    if !guard_configured(ctx, from.chat, None).await? {
        return Ok(());
    }
    let prompt = if args.is_empty() { IMAGE_DEBUG_DEFAULT_PROMPT } else { args }.to_string();
    let prefs = ctx.preferences.get(from.user).await;
    let header = views::image_debug_header(&prompt, &ctx.image_model, &prefs);
    send(ctx, from.chat, &header, None).await?;

    let ai = ctx.ai.clone();
    let kind = OperationKind::ImageDebug;
    ctx.dispatcher
        .start(from.chat, kind, kind.status_text(), move |status| {
            image_debug_unit(status, ai, prompt, prefs)
        })
        .await
        .map(|_| ())
}

async fn start_text_task(
    ctx: &BotContext,
    chat: ChatRef,
    kind: OperationKind,
    input: String,
    origin: Origin,
) -> SendResult<()> {
    let ai = ctx.ai.clone();
    let keyboard = origin.result_keyboard();
    ctx.dispatcher
        .start(chat, kind, kind.status_text(), move |status| {
            text_unit(status, ai, kind, input, keyboard)
        })
        .await
        .map(|_| ())
}

async fn start_speech(
    ctx: &BotContext,
    chat: ChatRef,
    text: String,
    (voice, speed): (Voice, f64),
    origin: Origin,
) -> SendResult<()> {
    let job = SpeechJob {
        ai: ctx.ai.clone(),
        text,
        voice,
        speed,
        hints_timeout: ctx.hints_timeout,
    };
    let keyboard = origin.result_keyboard();
    let kind = OperationKind::Speech;
    ctx.dispatcher
        .start(chat, kind, kind.status_text(), move |status| {
            speech_unit(status, job, keyboard)
        })
        .await
        .map(|_| ())
}

async fn start_images(
    ctx: &BotContext,
    from: Sender,
    prompt: String,
    origin: Origin,
) -> SendResult<()> {
    let ai = ctx.ai.clone();
    let prefs = ctx.preferences.get(from.user).await;
    let keyboard = origin.result_keyboard();
    let kind = OperationKind::Image;
    ctx.dispatcher
        .start(from.chat, kind, kind.status_text(), move |status| {
            images_unit(status, ai, prompt, prefs, keyboard)
        })
        .await
        .map(|_| ())
}

// ─────────────────────────────────────────────────────────────────────────────
// Background units
// ─────────────────────────────────────────────────────────────────────────────

/// Replaces the status with the first part and sends the rest after it.
async fn deliver_parts(
    status: &StatusUpdater,
    parts: &[String],
    keyboard: Option<&Keyboard>,
) -> Result<(), TaskFailure> {
    let Some((first, rest)) = parts.split_first() else {
        return Ok(());
    };
    let markup = if rest.is_empty() { keyboard } else { None };
    status.replace(first, markup).await?;
    status
        .messenger()
        .send_parts(status.chat(), rest, keyboard)
        .await?;
    Ok(())
}

async fn text_unit(
    status: StatusUpdater,
    ai: AiServices,
    kind: OperationKind,
    input: String,
    keyboard: Option<Keyboard>,
) -> Result<(), TaskFailure> {
    let request = text_task(kind).request(&input);
    let answer = ai.generate_text(&request).await?;
    let parts = views::text_result_parts(kind, &sanitize_telegram_text(&answer));
    deliver_parts(&status, &parts, keyboard.as_ref()).await
}

struct SpeechJob {
    ai: AiServices,
    text: String,
    voice: Voice,
    speed: f64,
    hints_timeout: Duration,
}

async fn speech_unit(
    status: StatusUpdater,
    job: SpeechJob,
    keyboard: Option<Keyboard>,
) -> Result<(), TaskFailure> {
    let SpeechJob { ai, text, voice, speed, hints_timeout } = job;
    let audio = match ai.synthesize(&text, voice, speed).await {
        Ok(audio) => audio,
        Err(e) => {
            let failure = TaskFailure::from(e);
            if !failure.is_retryable() {
                return Err(failure);
            }
            let hints = fetch_hints(hints_timeout, ai.speech_options())
                .await
                .map_or_else(views::default_speech_hints, |(voices, range)| {
                    views::speech_hints_text(&voices, range)
                });
            return Err(failure.with_hints(Some(hints)));
        }
    };

    let caption = views::speech_caption(&text, voice, speed);
    status
        .messenger()
        .send_voice(status.chat(), &audio, Some(&caption))
        .await?;
    status.replace(views::SPEECH_READY_TEXT, keyboard.as_ref()).await?;
    Ok(())
}

async fn images_unit(
    status: StatusUpdater,
    ai: AiServices,
    prompt: String,
    prefs: UserPreferences,
    keyboard: Option<Keyboard>,
) -> Result<(), TaskFailure> {
    let (size, quality) = (prefs.image_size, prefs.image_quality);
    let mut images = ai
        .generate_images(&prompt, size, quality, IMAGE_VARIANTS)
        .await?;
    images.truncate(usize::from(IMAGE_VARIANTS));

    let caption = views::image_caption(&prompt, images.len(), size, quality);
    let messenger = status.messenger();
    let done_text = match images.as_slice() {
        [] => return Err(TaskFailure::unavailable("Не вдалося згенерувати зображення")),
        [single] => {
            messenger.send_photo(status.chat(), single, Some(&caption)).await?;
            views::IMAGE_PARTIAL_TEXT
        }
        all => {
            messenger.send_media_group(status.chat(), all, Some(&caption)).await?;
            views::IMAGES_READY_TEXT
        }
    };
    status.replace(done_text, keyboard.as_ref()).await?;
    Ok(())
}

async fn image_debug_unit(
    status: StatusUpdater,
    ai: AiServices,
    prompt: String,
    prefs: UserPreferences,
) -> Result<(), TaskFailure> {
    let images = ai
        .generate_images(&prompt, prefs.image_size, prefs.image_quality, 1)
        .await?;
    status.replace(&views::image_debug_result(&images), None).await?;
    if let Some(image) = images.first() {
        status
            .messenger()
            .send_photo(status.chat(), image, Some(views::IMAGE_DEBUG_CAPTION))
            .await?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// State-routed text
// ─────────────────────────────────────────────────────────────────────────────

/// Handles free text the user sent while primed for `purpose`.
///
/// # Errors
///
/// Returns an error when the acknowledgement can't be delivered.
pub async fn handle_purpose_text(
    ctx: &BotContext,
    from: Sender,
    purpose: Purpose,
    text: &str,
) -> SendResult<()> {
    let keyboard = views::back_to_menu_keyboard();
    if !guard_configured(ctx, from.chat, Some(&keyboard)).await? {
        return Ok(());
    }
    let input = text.trim().to_string();
    if let Some(kind) = text_kind(purpose) {
        return start_text_task(ctx, from.chat, kind, input, Origin::Menu).await;
    }
    if purpose == Purpose::Tts {
        let prefs = ctx.preferences.get(from.user).await;
        return start_speech(ctx, from.chat, input, (prefs.voice, prefs.speed), Origin::Menu).await;
    }
    start_images(ctx, from, input, Origin::Menu).await
}

/// Handles a typed custom speed. Invalid input keeps the user in speed input.
///
/// # Errors
///
/// Returns an error when the reply can't be delivered.
pub async fn handle_custom_speed(ctx: &BotContext, from: Sender, text: &str) -> SendResult<()> {
    match parse_speed(text) {
        Ok(speed) => {
            ctx.preferences.set(from.user, PreferenceUpdate::Speed(speed)).await;
            info!(user_id = %from.user, speed, "Custom speed saved");
            let keyboard = views::speed_keyboard();
            send(ctx, from.chat, &views::speed_changed_text(speed), Some(&keyboard)).await
        }
        Err(e) => {
            ctx.states.enter_speed_input(from.user).await;
            let reply = match e {
                SpeedError::NotANumber => views::CUSTOM_SPEED_NOT_A_NUMBER,
                SpeedError::OutOfRange => views::CUSTOM_SPEED_OUT_OF_RANGE,
            };
            let keyboard = views::custom_speed_keyboard();
            send(ctx, from.chat, reply, Some(&keyboard)).await
        }
    }
}

/// Fallback for text with no pending purpose.
///
/// # Errors
///
/// Returns an error when the reply can't be delivered.
pub async fn handle_echo(ctx: &BotContext, chat: ChatRef, text: &str) -> SendResult<()> {
    send(ctx, chat, &views::fallback_echo_text(text), None).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Buttons
// ─────────────────────────────────────────────────────────────────────────────

/// What a button press asks for, parameters already validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallbackAction {
    /// Main menu
    BackToMenu,
    /// Settings menu
    Settings,
    /// Help screen
    Help,
    /// Info screen
    Info,
    /// Voice selection screen
    VoiceMenu,
    /// Speed selection screen
    SpeedMenu,
    /// Image size selection screen
    ImageSizeMenu,
    /// Image quality selection screen
    ImageQualityMenu,
    /// Prompt for a typed speed
    CustomSpeed,
    /// Prime for a capability's follow-up text
    Purpose(Purpose),
    /// Store a preference
    Set(PreferenceUpdate),
    /// Parameter that failed validation; the toast explains why
    Invalid(&'static str),
    /// Unrecognized payload
    Unknown,
}

/// A button press on `target`, the message carrying the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonPress<'a> {
    /// Sender
    pub from: Sender,
    /// Message the keyboard belongs to, if still accessible
    pub target: Option<MessageRef>,
    /// Display name for the welcome screen
    pub first_name: &'a str,
}

fn selection_screen(action: CallbackAction) -> Option<(&'static str, Keyboard)> {
    Some(match action {
        CallbackAction::Settings => (views::SETTINGS_TEXT, views::settings_keyboard()),
        CallbackAction::VoiceMenu => (views::VOICE_SETTINGS_TEXT, views::voice_keyboard()),
        CallbackAction::SpeedMenu => (views::SPEED_SETTINGS_TEXT, views::speed_keyboard()),
        CallbackAction::ImageSizeMenu => {
            (views::IMAGE_SIZE_SETTINGS_TEXT, views::image_size_keyboard())
        }
        CallbackAction::ImageQualityMenu => (
            views::IMAGE_QUALITY_SETTINGS_TEXT,
            views::image_quality_keyboard(),
        ),
        CallbackAction::CustomSpeed => (views::CUSTOM_SPEED_PROMPT, views::custom_speed_keyboard()),
        _ => return None,
    })
}

fn confirmation(update: PreferenceUpdate) -> (String, Keyboard) {
    match update {
        PreferenceUpdate::Voice(v) => (views::voice_changed_text(v), views::voice_keyboard()),
        PreferenceUpdate::Speed(s) => (views::speed_changed_text(s), views::speed_keyboard()),
        PreferenceUpdate::ImageSize(s) => {
            (views::image_size_changed_text(s), views::image_size_keyboard())
        }
        PreferenceUpdate::ImageQuality(q) => (
            views::image_quality_changed_text(q),
            views::image_quality_keyboard(),
        ),
    }
}

/// Handles an already acknowledged button press.
///
/// Every press resets the conversation state first; capability buttons and
/// the custom speed button then prime it again.
///
/// # Errors
///
/// Returns an error when the screen can't be shown.
pub async fn handle_callback(
    ctx: &BotContext,
    press: ButtonPress<'_>,
    action: CallbackAction,
) -> SendResult<()> {
    let ButtonPress {
        from,
        target,
        first_name,
    } = press;
    ctx.states.clear(from.user).await;

    if let Some((text, keyboard)) = selection_screen(action) {
        if action == CallbackAction::CustomSpeed {
            ctx.states.enter_speed_input(from.user).await;
        }
        return ctx.messenger.show(from.chat, target, text, Some(&keyboard)).await;
    }

    let back = views::back_to_menu_keyboard();
    match action {
        CallbackAction::BackToMenu => start(ctx, from, target, first_name).await,
        CallbackAction::Help => {
            ctx.messenger
                .show(from.chat, target, views::HELP_MENU_TEXT, Some(&back))
                .await
        }
        CallbackAction::Info => {
            let text = views::info_text(ctx.ai.is_configured());
            ctx.messenger.show(from.chat, target, &text, Some(&back)).await
        }
        CallbackAction::Purpose(purpose) => {
            if !ctx.ai.is_configured() {
                return ctx
                    .messenger
                    .show(from.chat, target, views::NOT_CONFIGURED_TEXT, Some(&back))
                    .await;
            }
            ctx.states.enter(from.user, purpose).await;
            ctx.messenger
                .show(from.chat, target, views::purpose_prompt(purpose), Some(&back))
                .await
        }
        CallbackAction::Set(update) => {
            ctx.preferences.set(from.user, update).await;
            info!(user_id = %from.user, update = ?update, "Preference updated");
            let (text, keyboard) = confirmation(update);
            ctx.messenger.show(from.chat, target, &text, Some(&keyboard)).await
        }
        CallbackAction::Invalid(_) | CallbackAction::Unknown => {
            warn!(user_id = %from.user, action = ?action, "Ignoring button press");
            Ok(())
        }
        _ => Ok(()),
    }
}
