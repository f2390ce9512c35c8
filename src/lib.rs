#![deny(missing_docs)]
//! AI studio bot: Telegram front end for `OpenAI` text, speech and image
//! generation with a resilient async dispatch core.

/// Provider adapters (chat completions, speech, images)
pub mod ai;
/// Telegram bot logic
pub mod bot;
/// Configuration and tunables
pub mod config;
/// In-memory fakes for tests
pub mod testing;
/// Text helpers and startup retries
pub mod utils;
