use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use std::time::Duration;

use super::{ImageGenerator, ProviderError, ProviderOutput, SourceImage};

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

/// OpenAI image edit endpoint (`POST {base}/images/edits`).
pub struct OpenAiGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    size: String,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        size: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/images/edits", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            size: size.to_string(),
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiGenerator {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, source: &SourceImage, prompt: &str) -> Result<ProviderOutput, ProviderError> {
        let image = Part::bytes(source.bytes.clone())
            .file_name(source.filename.clone())
            .mime_str(&source.mime_type)?;

        let form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", prompt.to_string())
            .text("size", self.size.clone())
            .text("n", "1")
            .part("image", image);

        tracing::debug!(
            model = %self.model,
            image_size = source.bytes.len(),
            "Sending image edit request to OpenAI"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body: ImagesResponse = response.json().await?;
        let first = body.data.into_iter().next().ok_or(ProviderError::EmptyResponse)?;

        match (first.b64_json, first.url) {
            (Some(encoded), _) if !encoded.is_empty() => Ok(ProviderOutput::Base64(encoded)),
            (_, Some(url)) if !url.is_empty() => Ok(ProviderOutput::Url(url)),
            _ => Err(ProviderError::EmptyResponse),
        }
    }
}

// Pulls `error.message` out of an OpenAI error body when there is one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|error| error.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}
