//! Image generation via `POST /images/generations`.

use crate::ai::{http_utils, AiError, ImageGenerator};
use crate::bot::preferences::{ImageQuality, ImageSize};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Most images one request may ask for.
pub const MAX_IMAGES_PER_REQUEST: u8 = 10;

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'static str,
    quality: &'static str,
    n: u8,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

/// OpenAI image provider returning decoded image bytes.
pub struct OpenAiImages {
    http_client: HttpClient,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiImages {
    /// Creates a provider for `base_url`.
    #[must_use]
    pub fn new(http_client: HttpClient, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            http_client,
            url: format!("{}/images/generations", base_url.trim_end_matches('/')),
            api_key,
            model,
        }
    }
}

/// Clamps a requested image count to `1..=10`.
#[must_use]
pub fn clamp_count(count: u8) -> u8 {
    if count > MAX_IMAGES_PER_REQUEST {
        warn!(requested = count, "Image count limited to {MAX_IMAGES_PER_REQUEST}");
    }
    count.clamp(1, MAX_IMAGES_PER_REQUEST)
}

/// Decodes every `b64_json` entry, skipping missing or malformed ones.
fn decode_images(response: ImageResponse) -> Result<Vec<Vec<u8>>, AiError> {
    let images: Vec<Vec<u8>> = response
        .data
        .into_iter()
        .filter_map(|item| match item.b64_json.as_deref().map(|b64| STANDARD.decode(b64)) {
            Some(Ok(bytes)) if !bytes.is_empty() => Some(bytes),
            Some(Err(e)) => {
                warn!(error = %e, "Skipping image with invalid base64");
                None
            }
            _ => {
                warn!("Skipping image without b64_json");
                None
            }
        })
        .collect();

    if images.is_empty() {
        return Err(AiError::EmptyResponse(
            "API не повернув валідних зображень".to_string(),
        ));
    }
    Ok(images)
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn generate_images(
        &self,
        prompt: &str,
        size: ImageSize,
        quality: ImageQuality,
        count: u8,
    ) -> Result<Vec<Vec<u8>>, AiError> {
        if prompt.trim().is_empty() {
            return Err(AiError::InvalidInput("Порожній опис зображення".to_string()));
        }

        let body = ImageRequest {
            model: &self.model,
            prompt,
            size: size.as_str(),
            quality: quality.as_str(),
            n: clamp_count(count),
        };
        let response = http_utils::post_json(&self.http_client, &self.url, &self.api_key, &body).await?;
        let images = decode_images(http_utils::read_json(response).await?)?;

        info!(returned = images.len(), "Images generated");
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> ImageResponse {
        serde_json::from_value(value).expect("valid response")
    }

    #[test]
    fn test_count_is_clamped() {
        assert_eq!(clamp_count(0), 1);
        assert_eq!(clamp_count(2), 2);
        assert_eq!(clamp_count(25), 10);
    }

    #[test]
    fn test_decode_skips_entries_without_data() {
        let images = decode_images(response(json!({
            "created": 0,
            "data": [
                {"b64_json": STANDARD.encode(b"png-1")},
                {"url": "https://example.com/x.png"},
                {"b64_json": "%%% not base64 %%%"}
            ]
        })))
        .expect("one valid image");

        assert_eq!(images, vec![b"png-1".to_vec()]);
    }

    #[test]
    fn test_no_valid_images_is_an_error() {
        let err = decode_images(response(json!({"data": []}))).expect_err("empty");
        assert_eq!(
            err,
            AiError::EmptyResponse("API не повернув валідних зображень".into())
        );
    }

    #[test]
    fn test_request_body_uses_wire_names() {
        let body = ImageRequest {
            model: "gpt-image-1",
            prompt: "a red cat",
            size: ImageSize::Landscape.as_str(),
            quality: ImageQuality::High.as_str(),
            n: 2,
        };
        let json = serde_json::to_value(&body).expect("serializes");
        assert_eq!(json["size"], "1536x1024");
        assert_eq!(json["quality"], "high");
        assert_eq!(json["n"], 2);
    }
}
