//! Slash commands and their argument parsing.

use crate::ai::speech::unsupported_voice_message;
use crate::bot::preferences::{parse_speed, SpeedError, Voice};
use crate::utils::escape_html;
use teloxide::utils::command::BotCommands;
use thiserror::Error;

/// Commands understood by the bot. Arguments are the rest of the message.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Доступні команди:")]
pub enum Command {
    /// Main menu
    #[command(description = "головне меню")]
    Start,
    /// Command list
    #[command(description = "список команд")]
    Help,
    /// Bot information
    #[command(description = "інформація про бота")]
    Info,
    /// Echo the argument
    #[command(description = "повторити повідомлення")]
    Echo(String),
    /// Free-form question
    #[command(description = "запитати AI")]
    Ask(String),
    /// Creative writing
    #[command(description = "креативне письмо")]
    Creative(String),
    /// Code generation
    #[command(description = "генерація коду")]
    Code(String),
    /// Translation
    #[command(description = "переклад тексту")]
    Translate(String),
    /// Summary
    #[command(description = "резюме тексту")]
    Summarize(String),
    /// Explanation
    #[command(description = "пояснення концепції")]
    Explain(String),
    /// Speech: `text[|voice][|speed]`
    #[command(description = "озвучити текст")]
    Tts(String),
    /// Current speech settings
    #[command(description = "налаштування TTS")]
    TtsSettings,
    /// Image generation
    #[command(description = "згенерувати зображення")]
    Image(String),
    /// Image generation diagnostics
    #[command(description = "діагностика генерації зображень")]
    ImageDebug(String),
}

/// Parsed `/tts` arguments; missing values come from the user's preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsArguments {
    /// Text to speak
    pub text: String,
    /// Explicit voice
    pub voice: Option<Voice>,
    /// Explicit speed
    pub speed: Option<f64>,
}

/// Invalid `/tts` arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TtsArgumentsError {
    /// Nothing to speak
    #[error("❌ Введіть текст для озвучування")]
    EmptyText,
    /// Voice outside the whitelist
    #[error("❌ {}", unsupported_voice_message(&escape_html(.0)))]
    UnsupportedVoice(String),
    /// Speed isn't a number
    #[error("❌ Невірний формат швидкості. Використовуйте число (наприклад: 1.5)")]
    SpeedNotANumber,
    /// Speed outside the allowed range
    #[error("❌ Швидкість повинна бути від 0.25 до 4.0")]
    SpeedOutOfRange,
}

impl From<SpeedError> for TtsArgumentsError {
    fn from(e: SpeedError) -> Self {
        match e {
            SpeedError::NotANumber => Self::SpeedNotANumber,
            SpeedError::OutOfRange => Self::SpeedOutOfRange,
        }
    }
}

fn parse_voice(raw: &str) -> Result<Voice, TtsArgumentsError> {
    raw.parse()
        .map_err(|_| TtsArgumentsError::UnsupportedVoice(raw.to_string()))
}

/// Parses `text`, `text|speed`, `text|voice` or `text|voice|speed`.
///
/// In the two-part form a numeric second part is a speed, anything else a
/// voice. Parts after the third are ignored.
///
/// # Errors
///
/// Returns the user-facing reason the arguments are unusable.
pub fn parse_tts_arguments(args: &str) -> Result<TtsArguments, TtsArgumentsError> {
    let parts: Vec<&str> = args.split('|').map(str::trim).collect();
    let text = parts.first().copied().unwrap_or_default();
    if text.is_empty() {
        return Err(TtsArgumentsError::EmptyText);
    }

    let (voice, speed) = match parts.as_slice() {
        [_] => (None, None),
        [_, second] => match parse_speed(second) {
            Ok(speed) => (None, Some(speed)),
            Err(SpeedError::OutOfRange) => return Err(TtsArgumentsError::SpeedOutOfRange),
            Err(SpeedError::NotANumber) => (Some(parse_voice(second)?), None),
        },
        [_, voice, speed, ..] => (Some(parse_voice(voice)?), Some(parse_speed(speed)?)),
        [] => (None, None),
    };

    Ok(TtsArguments {
        text: text.to_string(),
        voice,
        speed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(
            Command::parse("/tts_settings", "bot").ok(),
            Some(Command::TtsSettings)
        );
        assert_eq!(
            Command::parse("/image_debug кіт", "bot").ok(),
            Some(Command::ImageDebug("кіт".into()))
        );
        assert_eq!(
            Command::parse("/ask Що таке Rust?", "bot").ok(),
            Some(Command::Ask("Що таке Rust?".into()))
        );
    }

    #[test]
    fn test_full_form() {
        assert_eq!(
            parse_tts_arguments("Привіт|nova|1.5"),
            Ok(TtsArguments {
                text: "Привіт".into(),
                voice: Some(Voice::Nova),
                speed: Some(1.5),
            })
        );
    }

    #[test]
    fn test_two_part_form_accepts_speed_or_voice() {
        let speed = parse_tts_arguments("Привіт, як справи? | 1.5").expect("speed form");
        assert_eq!(speed.text, "Привіт, як справи?");
        assert_eq!((speed.voice, speed.speed), (None, Some(1.5)));

        let voice = parse_tts_arguments("Привіт | Echo").expect("voice form");
        assert_eq!((voice.voice, voice.speed), (Some(Voice::Echo), None));
    }

    #[test]
    fn test_plain_text_uses_preferences() {
        let args = parse_tts_arguments("  Привіт  ").expect("plain");
        assert_eq!((args.text.as_str(), args.voice, args.speed), ("Привіт", None, None));
    }

    #[test]
    fn test_invalid_arguments() {
        assert_eq!(parse_tts_arguments(""), Err(TtsArgumentsError::EmptyText));
        assert_eq!(parse_tts_arguments(" | nova"), Err(TtsArgumentsError::EmptyText));
        assert_eq!(
            parse_tts_arguments("Привіт|robot"),
            Err(TtsArgumentsError::UnsupportedVoice("robot".into()))
        );
        assert_eq!(
            parse_tts_arguments("Привіт|9"),
            Err(TtsArgumentsError::SpeedOutOfRange)
        );
        assert_eq!(
            parse_tts_arguments("Привіт|nova|fast"),
            Err(TtsArgumentsError::SpeedNotANumber)
        );
        assert!(TtsArgumentsError::UnsupportedVoice("robot".into())
            .to_string()
            .starts_with("❌ Непідтримуваний голос: robot."));
    }

    #[test]
    fn test_unsupported_voice_is_escaped() {
        let reply = parse_tts_arguments("Привіт|<robot>")
            .expect_err("unknown voice")
            .to_string();
        assert!(reply.contains("&lt;robot&gt;"));
        assert!(!reply.contains("<robot>"));
    }
}
