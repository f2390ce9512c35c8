//! Text helpers for Telegram output and retry helpers for startup calls.
//!
//! Regex patterns are declared with `lazy_regex!`, so they are validated at
//! compile time and built on first use.

#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use std::fmt::Display;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

/// Match any HTML-like tag: `<b>`, `</div>`, `<br/>`
static RE_TAG: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"<[^>]*>");

/// Match HTML entities: `&amp;`, `&#39;`
static RE_ENTITY: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"&[a-zA-Z0-9#]+;");

/// Match runs of horizontal whitespace
static RE_HSPACE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[ \t\x0B\f\r]+");

/// Match 3+ consecutive newlines (after horizontal whitespace is collapsed)
static RE_MULTI_NEWLINE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\n( ?\n){2,}");

/// Strips markup from model output so it can be embedded in an HTML message.
///
/// Tags and entities are removed, horizontal whitespace is collapsed and
/// blank-line runs are squeezed to one empty line. The result is then
/// HTML-escaped, so stray `<` or `&` can't break Telegram's parser.
///
/// # Examples
///
/// ```
/// use ai_studio_bot::utils::sanitize_telegram_text;
/// let cleaned = sanitize_telegram_text("<p>Hello,   <b>world</b>&nbsp;!</p> 1 < 2");
/// assert_eq!(cleaned, "Hello, world! 1 &lt; 2");
/// ```
#[must_use]
pub fn sanitize_telegram_text(text: &str) -> String {
    let without_tags = RE_TAG.replace_all(text, "");
    let without_entities = RE_ENTITY.replace_all(&without_tags, "");
    let collapsed = RE_HSPACE.replace_all(&without_entities, " ");
    let squeezed = RE_MULTI_NEWLINE.replace_all(&collapsed, "\n\n");

    let trimmed_lines = squeezed
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");

    html_escape::encode_text(trimmed_lines.trim()).into_owned()
}

/// Escapes user-provided text for HTML parse mode.
#[must_use]
pub fn escape_html(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Splits a message into parts of at most `max_chars` characters.
///
/// Parts break on line boundaries where possible. A single line longer than
/// the limit is cut on grapheme boundaries, so emoji and combined characters
/// are never split in half.
///
/// # Examples
///
/// ```
/// use ai_studio_bot::utils::split_long_message;
/// let long_msg = "Рядок відповіді\n".repeat(600);
/// let parts = split_long_message(&long_msg, 4000);
/// assert!(parts.len() > 1);
/// assert!(parts.iter().all(|p| p.chars().count() <= 4000));
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_chars: usize) -> Vec<String> {
    if message.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in message.lines() {
        let line_len = line.chars().count();

        if line_len > max_chars {
            flush_part(&mut parts, &mut current, &mut current_len);
            for grapheme in line.graphemes(true) {
                let grapheme_len = grapheme.chars().count();
                if current_len + grapheme_len > max_chars {
                    flush_part(&mut parts, &mut current, &mut current_len);
                }
                current.push_str(grapheme);
                current_len += grapheme_len;
            }
            continue;
        }

        let separator = usize::from(!current.is_empty());
        if current_len + separator + line_len > max_chars {
            flush_part(&mut parts, &mut current, &mut current_len);
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }
    flush_part(&mut parts, &mut current, &mut current_len);

    parts
}

fn flush_part(parts: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
    let trimmed = current.trim_end();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    current.clear();
    *current_len = 0;
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// # Examples
///
/// ```
/// use ai_studio_bot::utils::truncate_str;
/// assert_eq!(truncate_str("Привіт, світ!", 6), "Привіт");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Formats a speech speed the way users type it: `1.0`, `1.25`, `0.5`.
#[must_use]
pub fn format_speed(speed: f64) -> String {
    if speed.fract() == 0.0 {
        format!("{speed:.1}")
    } else {
        format!("{speed}")
    }
}

/// Retries a startup operation (webhook registration, `getMe`) with
/// exponential backoff and jitter.
///
/// Runtime calls go through [`crate::bot::resilient`] instead; this helper
/// is only for one-off calls made before the dispatcher starts.
///
/// # Errors
///
/// Returns the last error once all attempts are spent.
pub async fn retry_startup_operation<F, Fut, T, E>(name: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    use crate::config::{STARTUP_INITIAL_BACKOFF_MS, STARTUP_MAX_BACKOFF_MS, STARTUP_MAX_RETRIES};

    let retry_strategy = ExponentialBackoff::from_millis(STARTUP_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(STARTUP_MAX_BACKOFF_MS))
        .map(jitter)
        .take(STARTUP_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(operation = name, error = %e, "Startup operation failed after retries");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привіт, світ!";
        assert_eq!(truncate_str(s, 6), "Привіт");
        assert_eq!(truncate_str(s, 50), "Привіт, світ!");
    }

    #[test]
    fn test_sanitize_strips_tags_and_entities() {
        let input = "<think>plan</think> Відповідь: <b>так</b> &amp; ні";
        assert_eq!(sanitize_telegram_text(input), "plan Відповідь: так ні");
    }

    #[test]
    fn test_sanitize_keeps_paragraphs() {
        let input = "Перший рядок   \n\n\n\n  Другий\tрядок";
        assert_eq!(sanitize_telegram_text(input), "Перший рядок\n\nДругий рядок");
    }

    #[test]
    fn test_sanitize_escapes_leftover_brackets() {
        assert_eq!(sanitize_telegram_text("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_split_long_message_simple() {
        let parts = split_long_message("Line 1\nLine 2\nLine 3", 13);
        assert_eq!(parts, vec!["Line 1\nLine 2", "Line 3"]);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let line = "ї".repeat(10);
        let parts = split_long_message(&line, 10);
        assert_eq!(parts, vec![line]);
    }

    #[test]
    fn test_split_very_long_line() {
        let input = "a".repeat(10000);
        let parts = split_long_message(&input, 4000);

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 4000));
        assert_eq!(parts.concat().len(), input.len());
    }

    #[test]
    fn test_split_unicode_graphemes() {
        let input = "🔥".repeat(5000);
        let parts = split_long_message(&input, 4000);

        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.chars().all(|c| c == '🔥')));
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1.0), "1.0");
        assert_eq!(format_speed(1.5), "1.5");
        assert_eq!(format_speed(0.25), "0.25");
        assert_eq!(format_speed(4.0), "4.0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_startup_operation_recovers() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<&str, String> = retry_startup_operation("set_webhook", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("connection reset".to_string())
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
