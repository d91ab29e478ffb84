use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::config::{Config, GenerationProvider};

pub mod mock;
pub mod normalize;
pub mod openai;

pub use mock::MockGenerator;
pub use normalize::ResultNormalizer;
pub use openai::OpenAiGenerator;

/// The uploaded photo as handed to a provider.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Whatever shape a provider answered with, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutput {
    Bytes {
        data: Vec<u8>,
        mime_type: Option<String>,
    },
    Base64(String),
    DataUri(String),
    Url(String),
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to image provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("image provider returned no image")]
    EmptyResponse,

    #[error("could not decode provider image: {0}")]
    Decode(String),

    #[error("provider result exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("provider result is not a supported image")]
    UnsupportedImage,

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, source: &SourceImage, prompt: &str) -> Result<ProviderOutput, ProviderError>;
}

pub fn create_generator(config: &Config) -> anyhow::Result<Arc<dyn ImageGenerator>> {
    match config.generation_provider {
        GenerationProvider::Mock => Ok(Arc::new(MockGenerator::new(
            config.mock_result_path.clone().map(Into::into),
            Duration::from_millis(config.mock_delay_ms),
        ))),
        GenerationProvider::OpenAi => {
            let api_key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
            Ok(Arc::new(OpenAiGenerator::new(
                &config.openai_base_url,
                api_key,
                &config.openai_image_model,
                &config.openai_image_size,
                config.generation_timeout(),
            )?))
        }
    }
}
