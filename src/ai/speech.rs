//! Text-to-speech via `POST /audio/speech`.

use crate::ai::{http_utils, AiError, SpeechSynthesizer};
use crate::bot::preferences::{list_options, validate_speed, Voice, MAX_SPEED, MIN_SPEED};
use crate::utils::format_speed;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::{info, instrument};

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f64,
    response_format: &'static str,
}

/// OpenAI speech provider returning MP3 bytes.
pub struct OpenAiSpeech {
    http_client: HttpClient,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiSpeech {
    /// Creates a provider for `base_url`.
    #[must_use]
    pub fn new(http_client: HttpClient, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            http_client,
            url: format!("{}/audio/speech", base_url.trim_end_matches('/')),
            api_key,
            model,
        }
    }
}

/// Checks text and speed before any request is made.
///
/// # Errors
///
/// Returns [`AiError::InvalidInput`] with a user-facing message.
pub fn validate_speech_input(text: &str, speed: f64) -> Result<(), AiError> {
    if text.trim().is_empty() {
        return Err(AiError::InvalidInput("Порожній текст для озвучки".to_string()));
    }
    validate_speed(speed).map_err(|_| {
        AiError::InvalidInput(format!(
            "Швидкість повинна бути від {} до {}",
            format_speed(MIN_SPEED),
            format_speed(MAX_SPEED)
        ))
    })?;
    Ok(())
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.chars().count()))]
    async fn synthesize(&self, text: &str, voice: Voice, speed: f64) -> Result<Vec<u8>, AiError> {
        validate_speech_input(text, speed)?;

        let body = SpeechRequest {
            model: &self.model,
            voice: voice.as_str(),
            input: text,
            speed,
            response_format: "mp3",
        };
        let response = http_utils::post_json(&self.http_client, &self.url, &self.api_key, &body).await?;
        let audio = http_utils::read_bytes(response).await?;

        if audio.is_empty() {
            return Err(AiError::EmptyResponse("API повернув порожнє аудіо".to_string()));
        }
        info!(bytes = audio.len(), "Speech generated");
        Ok(audio)
    }

    async fn available_voices(&self) -> Result<Vec<Voice>, AiError> {
        Ok(Voice::ALL.to_vec())
    }

    async fn speed_range(&self) -> Result<(f64, f64), AiError> {
        Ok((MIN_SPEED, MAX_SPEED))
    }
}

/// Message for a voice name that isn't supported.
#[must_use]
pub fn unsupported_voice_message(voice: &str) -> String {
    format!(
        "Непідтримуваний голос: {voice}. Доступні: {}",
        list_options(Voice::ALL)
    )
}
