//! Chat completions via the OpenAI API.
//!
//! Requests are built with `async-openai`'s typed builders but sent through
//! our own HTTP client, so [`crate::bot::resilient`] stays the only layer
//! that retries.

use crate::ai::{http_utils, AiError, TextGenerator, TextRequest};
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, instrument};

/// Generation parameters.
#[derive(Debug, Clone)]
pub struct TextOptions {
    /// Model id
    pub model: String,
    /// Completion token limit
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

/// OpenAI chat completion provider.
pub struct OpenAiText {
    http_client: HttpClient,
    url: String,
    api_key: String,
    options: TextOptions,
}

impl OpenAiText {
    /// Creates a provider for `base_url` (e.g. `https://api.openai.com/v1`).
    #[must_use]
    pub fn new(
        http_client: HttpClient,
        base_url: &str,
        api_key: String,
        options: TextOptions,
    ) -> Self {
        Self {
            http_client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            options,
        }
    }

    /// Builds the chat completion request body.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::InvalidInput`] if the builders reject the input.
    pub fn build_request(&self, request: &TextRequest) -> Result<CreateChatCompletionRequest, AiError> {
        let invalid = |e: async_openai::error::OpenAIError| AiError::InvalidInput(e.to_string());
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);

        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(invalid)?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.as_str())
                .build()
                .map_err(invalid)?
                .into(),
        );

        CreateChatCompletionRequestArgs::default()
            .model(self.options.model.as_str())
            .messages(messages)
            .max_completion_tokens(self.options.max_tokens)
            .temperature(self.options.temperature)
            .build()
            .map_err(invalid)
    }
}

/// First choice's content, trimmed.
fn extract_content(response: &CreateChatCompletionResponse) -> Result<String, AiError> {
    response
        .choices
        .first()
        .and_then(|c| c.message.content.as_deref())
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| AiError::EmptyResponse("Empty response".to_string()))
}

#[async_trait]
impl TextGenerator for OpenAiText {
    #[instrument(skip(self, request), fields(model = %self.options.model))]
    async fn generate_text(&self, request: &TextRequest) -> Result<String, AiError> {
        if request.prompt.trim().is_empty() {
            return Err(AiError::InvalidInput("Порожній запит".to_string()));
        }

        let body = self.build_request(request)?;
        debug!(prompt = %crate::utils::truncate_str(&request.prompt, 100), "Sending chat completion");

        let response = http_utils::post_json(&self.http_client, &self.url, &self.api_key, &body).await?;
        let completion: CreateChatCompletionResponse = http_utils::read_json(response).await?;
        extract_content(&completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenAiText {
        OpenAiText::new(
            HttpClient::new(),
            "https://api.openai.com/v1/",
            "sk-test".into(),
            TextOptions {
                model: "gpt-3.5-turbo".into(),
                max_tokens: 1000,
                temperature: 0.7,
            },
        )
    }

    #[test]
    fn test_request_body_has_system_then_user() {
        let body = provider()
            .build_request(&TextRequest::new("Привіт").with_system("Ти помічник"))
            .expect("request builds");
        let json = serde_json::to_value(&body).expect("serializes");

        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["max_completion_tokens"], 1000);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "Ти помічник");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "Привіт");
    }

    #[test]
    fn test_url_is_joined_once() {
        assert_eq!(provider().url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_content_is_trimmed_and_empty_is_an_error() {
        let response = |content: Option<&str>| -> CreateChatCompletionResponse {
            serde_json::from_value(json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 0,
                "model": "gpt-3.5-turbo",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            }))
            .expect("valid response")
        };

        assert_eq!(
            extract_content(&response(Some("  Відповідь \n"))).ok().as_deref(),
            Some("Відповідь")
        );
        assert!(matches!(
            extract_content(&response(None)),
            Err(AiError::EmptyResponse(_))
        ));
    }
}
