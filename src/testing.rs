//! In-memory fakes for exercising the dispatch core without network access.
//!
//! [`RecordingTransport`] records every successful transport call and can be
//! told to fail the next call of a given kind. The scripted providers return
//! queued results in order and record the arguments they were called with.

use crate::ai::{
    AiError, AiServices, ImageGenerator, SpeechSynthesizer, TextGenerator, TextRequest,
};
use crate::bot::commands::Command;
use crate::bot::handlers::{BotContext, Sender};
use crate::bot::messaging::Messenger;
use crate::bot::preferences::{ImageQuality, ImageSize, Voice, MAX_SPEED, MIN_SPEED};
use crate::bot::resilient::{RateLimitOverride, RetryPolicy};
use crate::bot::router::{InboundEvent, Router};
use crate::bot::transport::{
    ChatRef, ChatTransport, Keyboard, MessageRef, TransportError, UserId,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A transport call that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// `send_message`
    Message {
        /// Target chat
        chat: ChatRef,
        /// Assigned message reference
        id: MessageRef,
        /// Message text
        text: String,
        /// Attached keyboard
        keyboard: Option<Keyboard>,
    },
    /// `edit_message`
    Edit {
        /// Target chat
        chat: ChatRef,
        /// Edited message
        message: MessageRef,
        /// New text
        text: String,
        /// New keyboard
        keyboard: Option<Keyboard>,
    },
    /// `delete_message`
    Delete {
        /// Target chat
        chat: ChatRef,
        /// Deleted message
        message: MessageRef,
    },
    /// `send_voice`
    Voice {
        /// Target chat
        chat: ChatRef,
        /// Audio payload
        audio: Vec<u8>,
        /// Caption
        caption: Option<String>,
    },
    /// `send_photo`
    Photo {
        /// Target chat
        chat: ChatRef,
        /// Image payload
        image: Vec<u8>,
        /// Caption
        caption: Option<String>,
    },
    /// `send_media_group`
    MediaGroup {
        /// Target chat
        chat: ChatRef,
        /// Image payloads
        images: Vec<Vec<u8>>,
        /// Caption of the first item
        caption: Option<String>,
    },
    /// `answer_callback`
    CallbackAnswer {
        /// Callback query id
        id: String,
        /// Toast text
        text: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CallKind {
    Send,
    Edit,
    Delete,
    Media,
    Callback,
}

/// Chat transport that records calls instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    texts: Mutex<HashMap<MessageRef, String>>,
    failures: Mutex<HashMap<CallKind, VecDeque<TransportError>>>,
    next_id: AtomicI32,
}

impl RecordingTransport {
    /// Creates a transport with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(100),
            ..Self::default()
        }
    }

    /// Snapshot of every successful call, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        lock(&self.sent).clone()
    }

    /// Text of the last sent or edited message.
    #[must_use]
    pub fn last_text(&self) -> Option<String> {
        lock(&self.sent).iter().rev().find_map(|entry| match entry {
            Sent::Message { text, .. } | Sent::Edit { text, .. } => Some(text.clone()),
            _ => None,
        })
    }

    /// Current text of a message, following edits.
    #[must_use]
    pub fn message_text(&self, message: MessageRef) -> Option<String> {
        lock(&self.texts).get(&message).cloned()
    }

    /// Texts of all sent (not edited) messages, in order.
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter_map(|entry| match entry {
                Sent::Message { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Fails the next `send_message` with `error`.
    pub fn fail_next_send(&self, error: TransportError) {
        self.push_failure(CallKind::Send, error);
    }

    /// Fails the next `edit_message` with `error`.
    pub fn fail_next_edit(&self, error: TransportError) {
        self.push_failure(CallKind::Edit, error);
    }

    /// Fails the next `delete_message` with `error`.
    pub fn fail_next_delete(&self, error: TransportError) {
        self.push_failure(CallKind::Delete, error);
    }

    /// Fails the next voice, photo or media group send with `error`.
    pub fn fail_next_media(&self, error: TransportError) {
        self.push_failure(CallKind::Media, error);
    }

    /// Fails the next `answer_callback` with `error`.
    pub fn fail_next_callback(&self, error: TransportError) {
        self.push_failure(CallKind::Callback, error);
    }

    fn push_failure(&self, kind: CallKind, error: TransportError) {
        lock(&self.failures).entry(kind).or_default().push_back(error);
    }

    fn take_failure(&self, kind: CallKind) -> Result<(), TransportError> {
        match lock(&self.failures).get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, entry: Sent) {
        lock(&self.sent).push(entry);
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        chat: ChatRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, TransportError> {
        self.take_failure(CallKind::Send)?;
        let id = MessageRef(self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.texts).insert(id, text.to_string());
        self.record(Sent::Message {
            chat,
            id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat: ChatRef,
        message: MessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.take_failure(CallKind::Edit)?;
        let mut texts = lock(&self.texts);
        if texts.get(&message).map(String::as_str) == Some(text) {
            return Err(TransportError::NotModified);
        }
        texts.insert(message, text.to_string());
        drop(texts);
        self.record(Sent::Edit {
            chat,
            message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ChatRef,
        message: MessageRef,
    ) -> Result<(), TransportError> {
        self.take_failure(CallKind::Delete)?;
        lock(&self.texts).remove(&message);
        self.record(Sent::Delete { chat, message });
        Ok(())
    }

    async fn send_voice(
        &self,
        chat: ChatRef,
        audio: &[u8],
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        self.take_failure(CallKind::Media)?;
        self.record(Sent::Voice {
            chat,
            audio: audio.to_vec(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn send_photo(
        &self,
        chat: ChatRef,
        image: &[u8],
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        self.take_failure(CallKind::Media)?;
        self.record(Sent::Photo {
            chat,
            image: image.to_vec(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat: ChatRef,
        images: &[Vec<u8>],
        caption: Option<&str>,
    ) -> Result<(), TransportError> {
        self.take_failure(CallKind::Media)?;
        self.record(Sent::MediaGroup {
            chat,
            images: images.to_vec(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.take_failure(CallKind::Callback)?;
        self.record(Sent::CallbackAnswer {
            id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}

/// Text provider returning queued results; echoes the prompt when the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedText {
    results: Mutex<VecDeque<Result<String, AiError>>>,
    calls: Mutex<Vec<TextRequest>>,
}

impl ScriptedText {
    /// Creates a provider with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next call.
    pub fn push(&self, result: Result<String, AiError>) {
        lock(&self.results).push_back(result);
    }

    /// Requests received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TextRequest> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn generate_text(&self, request: &TextRequest) -> Result<String, AiError> {
        lock(&self.calls).push(request.clone());
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {}", request.prompt)))
    }
}

/// One recorded `synthesize` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechCall {
    /// Text to speak
    pub text: String,
    /// Voice used
    pub voice: Voice,
    /// Speed used
    pub speed: f64,
}

/// Speech provider returning queued results; a short fake MP3 otherwise.
#[derive(Debug, Default)]
pub struct ScriptedSpeech {
    results: Mutex<VecDeque<Result<Vec<u8>, AiError>>>,
    calls: Mutex<Vec<SpeechCall>>,
    hints_fail: Mutex<bool>,
}

impl ScriptedSpeech {
    /// Creates a provider with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next call.
    pub fn push(&self, result: Result<Vec<u8>, AiError>) {
        lock(&self.results).push_back(result);
    }

    /// Makes voice and speed-range lookups fail.
    pub fn fail_hints(&self) {
        *lock(&self.hints_fail) = true;
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<SpeechCall> {
        lock(&self.calls).clone()
    }

    fn hints(&self) -> Result<(), AiError> {
        if *lock(&self.hints_fail) {
            Err(AiError::Network("hint lookup failed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSpeech {
    async fn synthesize(&self, text: &str, voice: Voice, speed: f64) -> Result<Vec<u8>, AiError> {
        lock(&self.calls).push(SpeechCall {
            text: text.to_string(),
            voice,
            speed,
        });
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| Ok(b"ID3fake-mp3".to_vec()))
    }

    async fn available_voices(&self) -> Result<Vec<Voice>, AiError> {
        self.hints()?;
        Ok(Voice::ALL.to_vec())
    }

    async fn speed_range(&self) -> Result<(f64, f64), AiError> {
        self.hints()?;
        Ok((MIN_SPEED, MAX_SPEED))
    }
}

/// One recorded `generate_images` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCall {
    /// Prompt
    pub prompt: String,
    /// Requested size
    pub size: ImageSize,
    /// Requested quality
    pub quality: ImageQuality,
    /// Requested count
    pub count: u8,
}

/// Image provider returning queued results; `count` fake images otherwise.
#[derive(Debug, Default)]
pub struct ScriptedImages {
    results: Mutex<VecDeque<Result<Vec<Vec<u8>>, AiError>>>,
    calls: Mutex<Vec<ImageCall>>,
}

impl ScriptedImages {
    /// Creates a provider with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next call.
    pub fn push(&self, result: Result<Vec<Vec<u8>>, AiError>) {
        lock(&self.results).push_back(result);
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ImageCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedImages {
    async fn generate_images(
        &self,
        prompt: &str,
        size: ImageSize,
        quality: ImageQuality,
        count: u8,
    ) -> Result<Vec<Vec<u8>>, AiError> {
        lock(&self.calls).push(ImageCall {
            prompt: prompt.to_string(),
            size,
            quality,
            count,
        });
        lock(&self.results).pop_front().unwrap_or_else(|| {
            Ok((0..count).map(|i| vec![0x89, b'P', b'N', b'G', i]).collect())
        })
    }
}

/// A [`Router`] wired to the fakes above, with a millisecond retry policy.
///
/// Chats and users share ids: user `n` talks in chat `n`.
pub struct TestBot {
    /// Chat side
    pub transport: Arc<RecordingTransport>,
    /// Text provider
    pub text: Arc<ScriptedText>,
    /// Speech provider
    pub speech: Arc<ScriptedSpeech>,
    /// Image provider
    pub images: Arc<ScriptedImages>,
    /// Router under test
    pub router: Router,
}

impl Default for TestBot {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBot {
    /// Bot with every AI capability configured.
    #[must_use]
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Bot without an AI provider.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::build(false)
    }

    fn build(configured: bool) -> Self {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            rate_limit: RateLimitOverride {
                max_waits: 2,
                fallback_delay: Duration::from_millis(1),
            },
        };
        let transport = Arc::new(RecordingTransport::new());
        let text = Arc::new(ScriptedText::new());
        let speech = Arc::new(ScriptedSpeech::new());
        let images = Arc::new(ScriptedImages::new());

        let ai = if configured {
            AiServices::new(
                Some(text.clone() as Arc<dyn TextGenerator>),
                Some(speech.clone() as Arc<dyn SpeechSynthesizer>),
                Some(images.clone() as Arc<dyn ImageGenerator>),
                policy,
            )
        } else {
            AiServices::new(None, None, None, policy)
        };
        let messenger = Messenger::new(transport.clone(), policy);
        let mut ctx = BotContext::new(messenger, ai, "gpt-image-1".to_string());
        ctx.hints_timeout = Duration::from_millis(200);

        Self {
            transport,
            text,
            speech,
            images,
            router: Router::new(ctx),
        }
    }

    /// Handler state behind the router.
    #[must_use]
    pub const fn context(&self) -> &BotContext {
        self.router.context()
    }

    /// Sends a slash command from `user`.
    pub async fn command(&self, user: i64, command: Command) {
        self.router
            .on_event(InboundEvent::Command {
                from: sender(user),
                first_name: "Тест".to_string(),
                command,
            })
            .await;
    }

    /// Sends plain text from `user`.
    pub async fn text(&self, user: i64, text: &str) {
        self.router
            .on_event(InboundEvent::Text {
                from: sender(user),
                text: text.to_string(),
            })
            .await;
    }

    /// Presses a button carrying `payload` on `message`.
    pub async fn press(&self, user: i64, message: Option<MessageRef>, payload: &str) {
        self.router
            .on_event(InboundEvent::Callback {
                from: sender(user),
                first_name: "Тест".to_string(),
                callback_id: format!("cb-{user}-{payload}"),
                message,
                payload: payload.to_string(),
            })
            .await;
    }

    /// Waits for every background unit started so far.
    pub async fn settle(&self) {
        self.context().dispatcher.wait_idle().await;
    }
}

const fn sender(user: i64) -> Sender {
    Sender {
        chat: ChatRef(user),
        user: UserId(user),
    }
}
