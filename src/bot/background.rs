//! Background task dispatcher.
//!
//! Slow handlers acknowledge the request with a status message, then hand
//! the provider call to a detached unit. The unit owns its
//! [`PendingOperation`]; whatever happens inside it (error or panic), the
//! status message ends in a terminal state.

use crate::ai::AiError;
use crate::bot::messaging::{Messenger, SendResult};
use crate::bot::resilient::{CallError, EditOutcome};
use crate::bot::transport::{ChatRef, Keyboard, MessageRef, TransportError};
use crate::bot::views;
use crate::utils::escape_html;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Kind of slow operation a unit performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Free-form answer
    Ask,
    /// Creative text
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
    Speech,
    /// Image generation
    Image,
    /// Image generation diagnostics
    ImageDebug,
}

impl OperationKind {
    /// Initial status text shown while the unit runs.
    #[must_use]
    pub const fn status_text(self) -> &'static str {
        match self {
            Self::Ask => "🤔 Думаю...",
            Self::Creative => "🎨 Створюю...",
            Self::Code => "💻 Генерую код...",
            Self::Translate => "🌐 Перекладаю...",
            Self::Summarize => "📝 Створюю резюме...",
            Self::Explain => "💡 Пояснюю...",
            Self::Speech => "🎤 Генерую озвучку...",
            Self::Image => "🎨 Створюю 2 варіанти зображення...",
            Self::ImageDebug => "🎨 Тестую генерацію...",
        }
    }

    const fn failure_context(self) -> &'static str {
        match self {
            Self::Ask => "при обробці запиту",
            Self::Creative => "при створенні тексту",
            Self::Code => "при генерації коду",
            Self::Translate => "при перекладі",
            Self::Summarize => "при створенні резюме",
            Self::Explain => "при поясненні",
            Self::Speech => "при генерації озвучки",
            Self::Image | Self::ImageDebug => "при генерації зображення",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a unit failed, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    /// Input rejected before any provider call
    InvalidInput(String),
    /// The provider refused the parameters; retrying won't help
    Rejected(String),
    /// Provider or network failure after retries
    Unavailable {
        /// What went wrong
        reason: String,
        /// Optional hints shown with the retry offer
        hints: Option<String>,
    },
}

impl TaskFailure {
    /// Unavailable failure without hints.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            hints: None,
        }
    }

    /// Attaches hints to an `Unavailable` failure; other failures are unchanged.
    #[must_use]
    pub fn with_hints(self, hints: Option<String>) -> Self {
        match self {
            Self::Unavailable { reason, .. } => Self::Unavailable { reason, hints },
            other => other,
        }
    }

    /// Whether the user should be offered a retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// User-facing failure text for a unit of `kind`.
    #[must_use]
    pub fn render(&self, kind: OperationKind) -> String {
        match self {
            Self::InvalidInput(message) => {
                format!("❌ Помилка параметрів: {}", escape_html(message))
            }
            Self::Rejected(message) => format!(
                "❌ Параметри відхилено {}: {}\n\nЗмініть запит або налаштування та спробуйте ще раз.",
                kind.failure_context(),
                escape_html(message)
            ),
            Self::Unavailable { reason, hints } => {
                let mut text = format!(
                    "❌ Виникла помилка {}: {}\n\n🔄 Спробуйте ще раз трохи пізніше.",
                    kind.failure_context(),
                    escape_html(reason)
                );
                if let Some(hints) = hints {
                    text.push_str("\n\n");
                    text.push_str(hints);
                }
                text
            }
        }
    }
}

impl From<AiError> for TaskFailure {
    fn from(e: AiError) -> Self {
        match e {
            AiError::InvalidInput(message) => Self::InvalidInput(message),
            AiError::ProviderRejected(message) => Self::Rejected(message),
            AiError::EmptyResponse(message) | AiError::MissingConfig(message) => {
                Self::unavailable(message)
            }
            other @ (AiError::RateLimited { .. } | AiError::Network(_) | AiError::Upstream(_)) => {
                Self::unavailable(other.to_string())
            }
        }
    }
}

impl From<CallError<AiError>> for TaskFailure {
    fn from(e: CallError<AiError>) -> Self {
        e.into_inner().into()
    }
}

impl From<CallError<TransportError>> for TaskFailure {
    fn from(e: CallError<TransportError>) -> Self {
        Self::unavailable(format!("не вдалося надіслати результат ({})", e.last_error()))
    }
}

/// Handle to a unit's status message.
///
/// The message reference follows fresh sends, so later updates edit the
/// message the user actually sees.
#[derive(Clone)]
pub struct StatusUpdater {
    messenger: Messenger,
    chat: ChatRef,
    message: Arc<AtomicI32>,
}

impl StatusUpdater {
    fn new(messenger: Messenger, chat: ChatRef, message: MessageRef) -> Self {
        Self {
            messenger,
            chat,
            message: Arc::new(AtomicI32::new(message.0)),
        }
    }

    /// Chat the unit reports to.
    #[must_use]
    pub const fn chat(&self) -> ChatRef {
        self.chat
    }

    /// Current status message.
    #[must_use]
    pub fn message(&self) -> MessageRef {
        MessageRef(self.message.load(Ordering::SeqCst))
    }

    /// Messenger for content sends (voice, photos, extra parts).
    #[must_use]
    pub const fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Rewrites the status message, falling back to a fresh send when it's gone.
    ///
    /// After a fresh send the old placeholder is deleted, best effort; it may
    /// still be visible when it only stopped being editable.
    ///
    /// # Errors
    ///
    /// Returns an error when neither the edit nor the fresh send succeeds.
    pub async fn replace(&self, text: &str, keyboard: Option<&Keyboard>) -> SendResult<()> {
        let previous = self.message();
        let outcome = self
            .messenger
            .edit_or_send(self.chat, previous, text, keyboard)
            .await?;
        if let EditOutcome::Resent(fresh) = outcome {
            self.message.store(fresh.0, Ordering::SeqCst);
            self.messenger.delete_best_effort(self.chat, previous).await;
        }
        Ok(())
    }
}

/// A slow operation in flight, owned by its background unit.
pub struct PendingOperation {
    /// Operation id, used in logs
    pub id: Uuid,
    /// What the unit does
    pub kind: OperationKind,
    /// When the request was acknowledged
    pub started_at: DateTime<Utc>,
    /// Status message of the unit
    pub status: StatusUpdater,
}

impl PendingOperation {
    fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

/// Spawns detached units for slow operations.
pub struct BackgroundDispatcher {
    messenger: Messenger,
    tracker: TaskTracker,
}

impl BackgroundDispatcher {
    /// Creates a dispatcher sending status messages through `messenger`.
    #[must_use]
    pub fn new(messenger: Messenger) -> Self {
        Self {
            messenger,
            tracker: TaskTracker::new(),
        }
    }

    /// Acknowledges a request and runs `work` in the background.
    ///
    /// The status message is sent before returning; `work` is never awaited
    /// here. A failure or panic inside `work` rewrites the status message with
    /// a failure text and a back-to-menu button.
    ///
    /// # Errors
    ///
    /// Returns an error if the status message can't be sent; `work` is not
    /// started in that case.
    pub async fn start<F, Fut>(
        &self,
        chat: ChatRef,
        kind: OperationKind,
        initial_text: &str,
        work: F,
    ) -> SendResult<Uuid>
    where
        F: FnOnce(StatusUpdater) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskFailure>> + Send + 'static,
    {
        let message = self.messenger.send_text(chat, initial_text, None).await?;
        let operation = PendingOperation {
            id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            status: StatusUpdater::new(self.messenger.clone(), chat, message),
        };
        let id = operation.id;
        let span = info_span!("unit", operation_id = %id, %kind, chat = %chat);

        self.tracker
            .spawn(run_unit(operation, work).instrument(span));
        Ok(id)
    }

    /// Number of units still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every unit started so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn run_unit<F, Fut>(operation: PendingOperation, work: F)
where
    F: FnOnce(StatusUpdater) -> Fut,
    Fut: Future<Output = Result<(), TaskFailure>>,
{
    let status = operation.status.clone();
    let outcome = AssertUnwindSafe(async move { work(status).await })
        .catch_unwind()
        .await;

    let failure = match outcome {
        Ok(Ok(())) => {
            info!(elapsed_ms = operation.elapsed_ms(), "Background unit finished");
            return;
        }
        Ok(Err(failure)) => failure,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(reason = %reason, "Background unit panicked");
            TaskFailure::unavailable("внутрішня помилка")
        }
    };

    warn!(
        elapsed_ms = operation.elapsed_ms(),
        failure = ?failure,
        "Background unit failed"
    );
    let text = failure.render(operation.kind);
    let keyboard = views::back_to_menu_keyboard();
    if let Err(e) = operation.status.replace(&text, Some(&keyboard)).await {
        error!(error = %e, "Failed to report unit failure");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs a hint lookup with a deadline; failures and timeouts yield `None`.
pub async fn fetch_hints<T, E, Fut>(timeout: Duration, fetch: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(hints)) => Some(hints),
        Ok(Err(e)) => {
            warn!(error = %e, "Hint lookup failed");
            None
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis(), "Hint lookup timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::resilient::RetryPolicy;
    use crate::testing::{RecordingTransport, Sent};
    use tokio::sync::oneshot;

    async fn explode(_: StatusUpdater) -> Result<(), TaskFailure> {
        panic!("boom");
    }

    fn dispatcher(transport: &Arc<RecordingTransport>) -> BackgroundDispatcher {
        BackgroundDispatcher::new(Messenger::new(transport.clone(), RetryPolicy::default()))
    }

    #[tokio::test]
    async fn test_ack_is_sent_before_work_finishes() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&transport);
        let (release, released) = oneshot::channel::<()>();

        dispatcher
            .start(ChatRef(1), OperationKind::Ask, "🤔 Думаю...", |status| async move {
                let _ = released.await;
                status.replace("🧠 готово", None).await?;
                Ok::<(), TaskFailure>(())
            })
            .await
            .expect("ack sent");

        assert_eq!(transport.sent_texts(), vec!["🤔 Думаю...".to_string()]);
        assert_eq!(dispatcher.in_flight(), 1);

        release.send(()).expect("unit is waiting");
        dispatcher.wait_idle().await;
        assert_eq!(transport.last_text().as_deref(), Some("🧠 готово"));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_work_leaves_failure_status() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&transport);

        let id = dispatcher
            .start(ChatRef(1), OperationKind::Speech, "🎤 Генерую озвучку...", explode)
            .await
            .expect("ack sent");
        dispatcher.wait_idle().await;

        let Some(Sent::Edit { text, keyboard, .. }) = transport.sent().pop() else {
            panic!("status should be edited");
        };
        assert!(text.starts_with("❌ Виникла помилка при генерації озвучки"));
        assert!(keyboard.is_some_and(|k| k.payloads().any(|p| p == "back_to_menu")));
        assert!(!id.is_nil());
    }

    #[tokio::test]
    async fn test_rejected_parameters_are_reported_without_retry_offer() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&transport);

        dispatcher
            .start(ChatRef(1), OperationKind::Image, "🎨", |_| async {
                Err::<(), _>(TaskFailure::from(AiError::ProviderRejected(
                    "invalid size".into(),
                )))
            })
            .await
            .expect("ack sent");
        dispatcher.wait_idle().await;

        let text = transport.last_text().expect("status text");
        assert!(text.contains("Параметри відхилено"));
        assert!(text.contains("invalid size"));
        assert!(!text.contains("Спробуйте ще раз трохи пізніше"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_report_survives_deleted_status() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&transport);
        transport.fail_next_edit(TransportError::StaleTarget("message to edit not found".into()));

        dispatcher
            .start(ChatRef(5), OperationKind::Ask, "🤔 Думаю...", |_| async {
                Err::<(), _>(TaskFailure::unavailable("timeout"))
            })
            .await
            .expect("ack sent");
        dispatcher.wait_idle().await;

        let texts = transport.sent_texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[1].starts_with("❌ Виникла помилка при обробці запиту: timeout"));
        assert_eq!(
            transport.sent().pop(),
            Some(Sent::Delete {
                chat: ChatRef(5),
                message: MessageRef(100),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ack_does_not_start_work() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(&transport);
        transport.fail_next_send(TransportError::Rejected("bot was blocked".into()));

        let result = dispatcher
            .start(ChatRef(1), OperationKind::Ask, "🤔", explode)
            .await;

        assert!(result.is_err());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_hints_gives_up_on_slow_lookup() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, AiError>("hints")
        };
        assert_eq!(fetch_hints(Duration::from_millis(1500), slow).await, None);

        let failing = async { Err::<&str, _>(AiError::Network("down".into())) };
        assert_eq!(fetch_hints(Duration::from_millis(1500), failing).await, None);

        let ready = async { Ok::<_, AiError>("alloy, nova") };
        assert_eq!(
            fetch_hints(Duration::from_millis(1500), ready).await,
            Some("alloy, nova")
        );
    }

    #[test]
    fn test_failure_mapping() {
        assert_eq!(
            TaskFailure::from(AiError::InvalidInput("Порожній текст для озвучки".into())),
            TaskFailure::InvalidInput("Порожній текст для озвучки".into())
        );
        let exhausted = CallError::Exhausted {
            attempts: 3,
            last: AiError::Upstream("HTTP 503".into()),
        };
        assert!(TaskFailure::from(exhausted).is_retryable());
        assert!(!TaskFailure::Rejected("bad".into())
            .with_hints(Some("x".into()))
            .is_retryable());
    }
}
