//! AI capabilities behind provider traits.
//!
//! Handlers never talk to OpenAI directly: they call [`AiServices`], which
//! runs each provider call through the resilient call wrapper. Providers
//! perform exactly one HTTP request per call and classify failures with
//! [`AiError`].

pub mod http_utils;
pub mod images;
pub mod openai;
pub mod prompts;
pub mod speech;

use crate::bot::preferences::{ImageQuality, ImageSize, Voice};
use crate::bot::resilient::{invoke, CallError, Classify, Failure, RetryPolicy};
use crate::config::Settings;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Errors returned by AI providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    /// Input rejected before any request was made
    #[error("{0}")]
    InvalidInput(String),
    /// Provider refused the parameters (4xx other than 429)
    #[error("{0}")]
    ProviderRejected(String),
    /// Rate limit exceeded (429), optionally with a wait time
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        /// `Retry-After` from the server, if any
        retry_after: Option<Duration>,
        /// Error message from the server
        message: String,
    },
    /// Connection, timeout or body read failure
    #[error("Network error: {0}")]
    Network(String),
    /// Provider-side failure (5xx)
    #[error("Upstream error: {0}")]
    Upstream(String),
    /// Missing provider configuration or API key
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Successful response without usable content
    #[error("{0}")]
    EmptyResponse(String),
}

impl Classify for AiError {
    fn classify(&self) -> Failure {
        match self {
            Self::RateLimited { retry_after, .. } => Failure::RateLimited(*retry_after),
            Self::Network(_) | Self::Upstream(_) => Failure::Transient,
            Self::InvalidInput(_)
            | Self::ProviderRejected(_)
            | Self::MissingConfig(_)
            | Self::EmptyResponse(_) => Failure::Permanent,
        }
    }
}

/// A text generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    /// User prompt
    pub prompt: String,
    /// Optional system prompt
    pub system_prompt: Option<String>,
}

impl TextRequest {
    /// Request without a system prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Chat-completion style text generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates a reply to `request`.
    async fn generate_text(&self, request: &TextRequest) -> Result<String, AiError>;
}

/// Text-to-speech.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text`, returning MP3 bytes.
    async fn synthesize(&self, text: &str, voice: Voice, speed: f64) -> Result<Vec<u8>, AiError>;

    /// Voices the provider accepts.
    async fn available_voices(&self) -> Result<Vec<Voice>, AiError>;

    /// Accepted speed range, inclusive.
    async fn speed_range(&self) -> Result<(f64, f64), AiError>;
}

/// Image generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates up to `count` images; the provider may return fewer.
    async fn generate_images(
        &self,
        prompt: &str,
        size: ImageSize,
        quality: ImageQuality,
        count: u8,
    ) -> Result<Vec<Vec<u8>>, AiError>;
}

/// Result type of [`AiServices`] calls.
pub type AiResult<T> = Result<T, CallError<AiError>>;

/// Configured providers plus the retry policy applied to them.
#[derive(Clone)]
pub struct AiServices {
    text: Option<Arc<dyn TextGenerator>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    images: Option<Arc<dyn ImageGenerator>>,
    policy: RetryPolicy,
}

impl AiServices {
    /// Wraps the given providers.
    #[must_use]
    pub fn new(
        text: Option<Arc<dyn TextGenerator>>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        images: Option<Arc<dyn ImageGenerator>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            text,
            speech,
            images,
            policy,
        }
    }

    /// Builds OpenAI providers when an API key is configured; none otherwise.
    #[must_use]
    pub fn from_settings(settings: &Settings, policy: RetryPolicy) -> Self {
        let Some(api_key) = settings.openai_api_key.clone() else {
            warn!("OPENAI_API_KEY is not set, AI features are disabled");
            return Self::new(None, None, None, policy);
        };

        let http = http_utils::create_http_client();
        let text: Arc<dyn TextGenerator> = Arc::new(openai::OpenAiText::new(
            http.clone(),
            &settings.openai_base_url,
            api_key.clone(),
            openai::TextOptions {
                model: settings.openai_model.clone(),
                max_tokens: settings.openai_max_tokens,
                temperature: settings.openai_temperature,
            },
        ));
        let speech: Arc<dyn SpeechSynthesizer> = Arc::new(speech::OpenAiSpeech::new(
            http.clone(),
            &settings.openai_base_url,
            api_key.clone(),
            settings.openai_tts_model.clone(),
        ));
        let images: Arc<dyn ImageGenerator> = Arc::new(images::OpenAiImages::new(
            http,
            &settings.openai_base_url,
            api_key,
            settings.openai_image_model.clone(),
        ));

        info!(model = %settings.openai_model, "OpenAI providers initialized");
        Self::new(Some(text), Some(speech), Some(images), policy)
    }

    /// Whether all capabilities are available.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.text.is_some() && self.speech.is_some() && self.images.is_some()
    }

    /// Retry policy applied to provider calls.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn missing<T>(capability: &str) -> AiResult<T> {
        Err(CallError::Permanent(AiError::MissingConfig(format!(
            "{capability} provider is not configured"
        ))))
    }

    /// Generates text with retries.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] once the wrapper gives up.
    pub async fn generate_text(&self, request: &TextRequest) -> AiResult<String> {
        let Some(provider) = self.text.as_ref() else {
            return Self::missing("text");
        };
        let started = Instant::now();
        let result = invoke(&self.policy, move || provider.generate_text(request)).await;
        info!(
            elapsed_ms = started.elapsed().as_millis(),
            ok = result.is_ok(),
            "Text generation finished"
        );
        result
    }

    /// Synthesizes speech with retries.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] once the wrapper gives up.
    pub async fn synthesize(&self, text: &str, voice: Voice, speed: f64) -> AiResult<Vec<u8>> {
        let Some(provider) = self.speech.as_ref() else {
            return Self::missing("speech");
        };
        let started = Instant::now();
        let result = invoke(&self.policy, move || provider.synthesize(text, voice, speed)).await;
        info!(
            elapsed_ms = started.elapsed().as_millis(),
            %voice,
            speed,
            ok = result.is_ok(),
            "Speech synthesis finished"
        );
        result
    }

    /// Generates images with retries.
    ///
    /// # Errors
    ///
    /// Returns [`CallError`] once the wrapper gives up.
    pub async fn generate_images(
        &self,
        prompt: &str,
        size: ImageSize,
        quality: ImageQuality,
        count: u8,
    ) -> AiResult<Vec<Vec<u8>>> {
        let Some(provider) = self.images.as_ref() else {
            return Self::missing("image");
        };
        let started = Instant::now();
        let result = invoke(&self.policy, move || {
            provider.generate_images(prompt, size, quality, count)
        })
        .await;
        info!(
            elapsed_ms = started.elapsed().as_millis(),
            %size,
            %quality,
            requested = count,
            returned = result.as_ref().map_or(0, Vec::len),
            "Image generation finished"
        );
        result
    }

    /// Voices and speed range for failure hints. Not retried.
    ///
    /// # Errors
    ///
    /// Returns the provider error, or `MissingConfig` without a speech provider.
    pub async fn speech_options(&self) -> Result<(Vec<Voice>, (f64, f64)), AiError> {
        let Some(provider) = self.speech.as_ref() else {
            return Err(AiError::MissingConfig("speech provider is not configured".into()));
        };
        let voices = provider.available_voices().await?;
        let range = provider.speed_range().await?;
        Ok((voices, range))
    }
}
