//! Resilient call wrapper for outbound operations.
//!
//! Every transport and provider call goes through [`invoke`] (or
//! [`invoke_edit`] for message edits), which is the single place deciding
//! whether a failure is retried. Callers classify their errors with
//! [`Classify`]; the wrapper owns no state beyond one invocation.
//!
//! # Usage
//!
//! ```ignore
//! use ai_studio_bot::bot::resilient::{invoke, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let message = invoke(&policy, || transport.send_message(chat, "⏳", None)).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Back off and retry. `Some` carries the wait the remote side asked for.
    RateLimited(Option<Duration>),
    /// Network hiccup, timeout or 5xx; retried with linear backoff.
    Transient,
    /// An edit produced identical content.
    NotModified,
    /// The edit target no longer exists or can't be edited.
    StaleTarget,
    /// Never retried.
    Permanent,
}

/// Maps an error onto the retry taxonomy.
pub trait Classify {
    /// Classifies this error.
    fn classify(&self) -> Failure;
}

/// Bound on uncounted rate-limit waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOverride {
    /// How many explicit `retry_after` waits are honoured without counting
    /// against `max_attempts`. Further rate limits are counted.
    pub max_waits: u32,
    /// Wait used when a rate limit arrives without `retry_after`.
    pub fallback_delay: Duration,
}

/// Retry policy for one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Counted attempts, including the first one.
    pub max_attempts: u32,
    /// Linear backoff unit: attempt `n` sleeps `base_delay * n`.
    pub base_delay: Duration,
    /// Rate-limit handling.
    pub rate_limit: RateLimitOverride,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::config::{
            RATE_LIMIT_FALLBACK_DELAY_MS, RATE_LIMIT_MAX_WAITS, RETRY_BASE_DELAY_MS,
            RETRY_MAX_ATTEMPTS,
        };

        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            rate_limit: RateLimitOverride {
                max_waits: RATE_LIMIT_MAX_WAITS,
                fallback_delay: Duration::from_millis(RATE_LIMIT_FALLBACK_DELAY_MS),
            },
        }
    }
}

impl RetryPolicy {
    /// Policy with env overrides applied (see [`crate::config`]).
    #[must_use]
    pub fn from_env() -> Self {
        use crate::config::{
            get_rate_limit_fallback_delay, get_rate_limit_max_waits, get_retry_base_delay,
            get_retry_max_attempts,
        };

        Self {
            max_attempts: get_retry_max_attempts(),
            base_delay: get_retry_base_delay(),
            rate_limit: RateLimitOverride {
                max_waits: get_rate_limit_max_waits(),
                fallback_delay: get_rate_limit_fallback_delay(),
            },
        }
    }

    fn transient_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Terminal outcome of a wrapped call.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// Classified as permanent, not retried.
    #[error("{0}")]
    Permanent(E),
    /// Retries spent on transient failures or rate limits.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Counted attempts made.
        attempts: u32,
        /// Error of the last attempt.
        last: E,
    },
    /// An edit conflict that the caller didn't resolve (plain [`invoke`] only).
    #[error("edit conflict: {0}")]
    Conflict(E),
}

impl<E> CallError<E> {
    /// The underlying error of the last attempt.
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Permanent(e) | Self::Conflict(e) | Self::Exhausted { last: e, .. } => e,
        }
    }

    /// Consumes the wrapper, returning the last error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent(e) | Self::Conflict(e) | Self::Exhausted { last: e, .. } => e,
        }
    }

    /// Whether retries were spent.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Runs `op` under `policy`.
///
/// - `RateLimited(Some(wait))` sleeps exactly `wait`; the first
///   `rate_limit.max_waits` of these are not counted against `max_attempts`.
/// - `RateLimited(None)` and `Transient` are counted; transient failures sleep
///   `base_delay * attempt`.
/// - `NotModified` / `StaleTarget` return [`CallError::Conflict`] at once.
/// - `Permanent` returns [`CallError::Permanent`] at once.
///
/// # Errors
///
/// Returns [`CallError`] when the operation can't succeed under the policy.
pub async fn invoke<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, CallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    let mut attempts: u32 = 0;
    let mut uncounted_waits: u32 = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let delay = match err.classify() {
            Failure::RateLimited(Some(wait)) if uncounted_waits < policy.rate_limit.max_waits => {
                uncounted_waits += 1;
                warn!(
                    wait_ms = wait.as_millis(),
                    waits = uncounted_waits,
                    "Rate limited, waiting before retry"
                );
                sleep(wait).await;
                continue;
            }
            Failure::RateLimited(wait) => {
                wait.unwrap_or(policy.rate_limit.fallback_delay)
            }
            Failure::Transient => policy.transient_delay(attempts + 1),
            Failure::NotModified | Failure::StaleTarget => return Err(CallError::Conflict(err)),
            Failure::Permanent => {
                debug!(error = %err, "Permanent failure, not retrying");
                return Err(CallError::Permanent(err));
            }
        };

        attempts += 1;
        if attempts >= policy.max_attempts {
            warn!(attempts, error = %err, "Outbound call failed after retries");
            return Err(CallError::Exhausted {
                attempts,
                last: err,
            });
        }

        debug!(
            attempt = attempts,
            delay_ms = delay.as_millis(),
            error = %err,
            "Retrying outbound call"
        );
        sleep(delay).await;
    }
}

/// Result of a resolved edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome<T> {
    /// The message was edited.
    Edited,
    /// The message already had this content.
    Unchanged,
    /// The target was gone; a fresh message was sent instead.
    Resent(T),
}

/// Runs an edit under `policy`, resolving edit conflicts.
///
/// "Not modified" counts as success. A stale target falls back to `fallback`
/// (normally a fresh send), which runs under the same policy.
///
/// # Errors
///
/// Returns [`CallError`] when neither the edit nor the fallback succeeds.
pub async fn invoke_edit<T, E, FE, FutE, FS, FutS>(
    policy: &RetryPolicy,
    edit: FE,
    fallback: FS,
) -> Result<EditOutcome<T>, CallError<E>>
where
    FE: FnMut() -> FutE,
    FutE: Future<Output = Result<(), E>>,
    FS: FnMut() -> FutS,
    FutS: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    match invoke(policy, edit).await {
        Ok(()) => Ok(EditOutcome::Edited),
        Err(CallError::Conflict(err)) if err.classify() == Failure::NotModified => {
            debug!("Edit skipped, content unchanged");
            Ok(EditOutcome::Unchanged)
        }
        Err(CallError::Conflict(err)) => {
            debug!(error = %err, "Edit target gone, sending a fresh message");
            invoke(policy, fallback).await.map(EditOutcome::Resent)
        }
        Err(other) => Err(other),
    }
}
