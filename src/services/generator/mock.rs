use async_trait::async_trait;
use image::ImageOutputFormat;
use std::{io::Cursor, path::PathBuf, time::Duration};

use super::{ImageGenerator, ProviderError, ProviderOutput, SourceImage};

/// Stand-in provider for development.
///
/// Sleeps for the configured delay, then returns the sample result file if one
/// is configured, or a monochrome rendering of the source photo otherwise.
pub struct MockGenerator {
    result_path: Option<PathBuf>,
    delay: Duration,
}

impl MockGenerator {
    pub fn new(result_path: Option<PathBuf>, delay: Duration) -> Self {
        Self { result_path, delay }
    }
}

#[async_trait]
impl ImageGenerator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, source: &SourceImage, _prompt: &str) -> Result<ProviderOutput, ProviderError> {
        tracing::info!(delay_ms = self.delay.as_millis() as u64, "Mock generation requested");
        tokio::time::sleep(self.delay).await;

        if let Some(path) = &self.result_path {
            let data = tokio::fs::read(path).await?;
            return Ok(ProviderOutput::Bytes {
                data,
                mime_type: mime_guess::from_path(path).first().map(|m| m.to_string()),
            });
        }

        let bytes = source.bytes.clone();
        let data = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ProviderError> {
            let portrait = image::load_from_memory(&bytes)?.grayscale();
            let mut buffer = Cursor::new(Vec::new());
            portrait.write_to(&mut buffer, ImageOutputFormat::Jpeg(90))?;
            Ok(buffer.into_inner())
        })
        .await
        .map_err(|e| ProviderError::Decode(format!("mock render task failed: {}", e)))??;

        tracing::info!("Mock generation complete");
        Ok(ProviderOutput::Bytes {
            data,
            mime_type: Some("image/jpeg".to_string()),
        })
    }
}
