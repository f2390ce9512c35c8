//! Per-user preferences for speech and image generation.
//!
//! Values are typed, so a stored record is always structurally valid;
//! range checks for speed happen in the handlers before [`PreferenceStore::set`].
//! Preferences live for the process lifetime and are not persisted.

use crate::bot::transport::UserId;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;

/// Slowest accepted speech speed.
pub const MIN_SPEED: f64 = 0.25;
/// Fastest accepted speech speed.
pub const MAX_SPEED: f64 = 4.0;
/// Normal speech speed.
pub const DEFAULT_SPEED: f64 = 1.0;

/// Unknown option value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseOptionError {
    kind: &'static str,
    value: String,
}

impl ParseOptionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

macro_rules! option_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                $(#[$vmeta])*
                $variant
            ),+
        }

        impl $name {
            /// Every value, in menu order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire name of the value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseOptionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| ParseOptionError::new($kind, wanted))
            }
        }
    };
}

option_enum! {
    /// Speech synthesis voice.
    Voice, "voice" {
        #[default]
        Alloy => "alloy",
        Echo => "echo",
        Fable => "fable",
        Onyx => "onyx",
        Nova => "nova",
        Shimmer => "shimmer",
    }
}

option_enum! {
    /// Generated image size.
    ImageSize, "image size" {
        Square => "1024x1024",
        Portrait => "1024x1536",
        Landscape => "1536x1024",
        #[default]
        Auto => "auto",
    }
}

option_enum! {
    /// Generated image quality.
    ImageQuality, "image quality" {
        Low => "low",
        Medium => "medium",
        High => "high",
        #[default]
        Auto => "auto",
    }
}

/// Comma-separated list of every value of an option.
pub fn list_options<T: Copy + fmt::Display>(all: &[T]) -> String {
    all.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Preferences of one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserPreferences {
    /// Speech voice
    pub voice: Voice,
    /// Speech speed, within [`MIN_SPEED`]..=[`MAX_SPEED`] when set by handlers
    pub speed: f64,
    /// Image size
    pub image_size: ImageSize,
    /// Image quality
    pub image_quality: ImageQuality,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            voice: Voice::default(),
            speed: DEFAULT_SPEED,
            image_size: ImageSize::default(),
            image_quality: ImageQuality::default(),
        }
    }
}

/// A single-field preference change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreferenceUpdate {
    /// Set the voice
    Voice(Voice),
    /// Set the speed
    Speed(f64),
    /// Set the image size
    ImageSize(ImageSize),
    /// Set the image quality
    ImageQuality(ImageQuality),
}

impl UserPreferences {
    fn apply(&mut self, update: PreferenceUpdate) {
        match update {
            PreferenceUpdate::Voice(v) => self.voice = v,
            PreferenceUpdate::Speed(s) => self.speed = s,
            PreferenceUpdate::ImageSize(s) => self.image_size = s,
            PreferenceUpdate::ImageQuality(q) => self.image_quality = q,
        }
    }
}

/// Speed input that can't be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpeedError {
    /// Not a number
    #[error("speed is not a number")]
    NotANumber,
    /// Outside [`MIN_SPEED`]..=[`MAX_SPEED`]
    #[error("speed must be between {MIN_SPEED} and {MAX_SPEED}")]
    OutOfRange,
}

/// Checks a speed value against the accepted range.
///
/// # Errors
///
/// Returns [`SpeedError::OutOfRange`] outside `0.25..=4.0` (NaN included).
pub fn validate_speed(speed: f64) -> Result<f64, SpeedError> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(SpeedError::OutOfRange)
    }
}

/// Parses and validates user-typed speed; a decimal comma is accepted.
///
/// # Errors
///
/// Returns [`SpeedError`] for non-numeric or out-of-range input.
pub fn parse_speed(input: &str) -> Result<f64, SpeedError> {
    let speed: f64 = input
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| SpeedError::NotANumber)?;
    validate_speed(speed)
}

/// Session-scoped preference store keyed by user.
#[derive(Debug, Default)]
pub struct PreferenceStore {
    entries: RwLock<HashMap<UserId, UserPreferences>>,
}

impl PreferenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's preferences, creating defaults on first access.
    pub async fn get(&self, user: UserId) -> UserPreferences {
        if let Some(prefs) = self.entries.read().await.get(&user) {
            return *prefs;
        }
        *self.entries.write().await.entry(user).or_default()
    }

    /// Updates one field in place; last write wins per field.
    pub async fn set(&self, user: UserId, update: PreferenceUpdate) {
        self.entries
            .write()
            .await
            .entry(user)
            .or_default()
            .apply(update);
    }
}
