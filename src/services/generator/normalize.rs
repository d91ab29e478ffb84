use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use std::time::Duration;

use super::{ProviderError, ProviderOutput};
use crate::{
    models::GeneratedImage,
    utils::file::{is_image_media_type, sniff_mime},
};

/// Turns any provider answer into one `{bytes, mime_type}` image.
#[derive(Clone)]
pub struct ResultNormalizer {
    client: Client,
    max_fetch_bytes: usize,
}

impl ResultNormalizer {
    /// `max_fetch_bytes` bounds how much of a provider URL is downloaded.
    pub fn new(fetch_timeout: Duration, max_fetch_bytes: usize) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            client,
            max_fetch_bytes,
        })
    }

    pub async fn normalize(&self, output: ProviderOutput) -> Result<GeneratedImage, ProviderError> {
        match output {
            ProviderOutput::Bytes { data, mime_type } => finish(data, mime_type),
            ProviderOutput::Base64(encoded) => finish(decode_base64(&encoded)?, None),
            ProviderOutput::DataUri(uri) => {
                let (mime_type, data) = parse_data_uri(&uri)?;
                finish(data, mime_type)
            }
            ProviderOutput::Url(url) if url.starts_with("data:") => {
                let (mime_type, data) = parse_data_uri(&url)?;
                finish(data, mime_type)
            }
            ProviderOutput::Url(url) => self.fetch(&url).await,
        }
    }

    async fn fetch(&self, url: &str) -> Result<GeneratedImage, ProviderError> {
        tracing::debug!("Fetching generated image from provider URL");

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: "failed to download generated image".to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let limit = self.max_fetch_bytes;
        if response.content_length().is_some_and(|length| length > limit as u64) {
            return Err(ProviderError::TooLarge { limit });
        }

        // Content-Length can be absent or wrong, so the stream is bounded too
        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > limit {
                return Err(ProviderError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        finish(data, content_type)
    }
}

/// Splits a `data:<mime>;base64,<payload>` URI into its mime type and bytes.
pub fn parse_data_uri(uri: &str) -> Result<(Option<String>, Vec<u8>), ProviderError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ProviderError::Decode("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProviderError::Decode("data URI has no payload".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| ProviderError::Decode("data URI is not base64 encoded".to_string()))?;

    let mime_type = Some(mime_type.trim().to_string()).filter(|m| !m.is_empty());
    Ok((mime_type, decode_base64(payload)?))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, ProviderError> {
    general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ProviderError::Decode(format!("invalid base64: {}", e)))
}

// Magic bytes win over whatever the provider declared.
fn finish(data: Vec<u8>, declared: Option<String>) -> Result<GeneratedImage, ProviderError> {
    if data.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let mime_type = match sniff_mime(&data) {
        Some(sniffed) => sniffed.to_string(),
        None => declared
            .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|value| is_image_media_type(value))
            .ok_or(ProviderError::UnsupportedImage)?,
    };

    Ok(GeneratedImage {
        bytes: data,
        mime_type,
    })
}
