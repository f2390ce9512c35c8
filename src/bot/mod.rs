/// Long-running operations detached from the update handler
pub mod background;
/// Slash commands and `/tts` argument parsing
pub mod commands;
/// Command, button and text handlers
pub mod handlers;
/// Outbound messaging with retry and edit fallback
pub mod messaging;
/// Per-user voice, speed and image preferences
pub mod preferences;
/// Retry wrapper shared by transport and provider calls
pub mod resilient;
/// Event routing
pub mod router;
/// Per-user conversation state
pub mod state;
/// Telegram Bot API adapter
pub mod telegram;
/// Chat transport seam and message types
pub mod transport;
/// Menus, keyboards and user-facing texts
pub mod views;
