use anyhow::{bail, Result};
use serde::Deserialize;
use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const RESULT_SIZE_FACTOR: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GenerationProvider {
    Mock,
    OpenAi,
}

impl FromStr for GenerationProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(GenerationProvider::Mock),
            "openai" => Ok(GenerationProvider::OpenAi),
            other => bail!("Unsupported generation provider: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub max_file_size: usize,
    pub upload_dir: String,
    pub upload_ttl_secs: u64,
    pub quota_file: String,
    pub daily_generation_cap: u32,
    pub generation_enabled: bool,
    pub generation_provider: GenerationProvider,
    pub generation_timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_image_model: String,
    pub openai_image_size: String,
    pub mock_result_path: Option<String>,
    pub mock_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            upload_dir: "./uploads".to_string(),
            upload_ttl_secs: 600,
            quota_file: "./data/quota.json".to_string(),
            daily_generation_cap: 2,
            generation_enabled: false,
            generation_provider: GenerationProvider::Mock,
            generation_timeout_secs: 120,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_image_model: "gpt-image-1".to_string(),
            openai_image_size: "1024x1024".to_string(),
            mock_result_path: None,
            mock_delay_ms: 4000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            port: parse_var("PORT", defaults.port)?,
            max_file_size: parse_var("MAX_FILE_SIZE", defaults.max_file_size)?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            upload_ttl_secs: parse_var("UPLOAD_TTL_SECS", defaults.upload_ttl_secs)?,
            quota_file: env::var("QUOTA_FILE").unwrap_or(defaults.quota_file),
            daily_generation_cap: parse_var("DAILY_GENERATION_CAP", defaults.daily_generation_cap)?,
            generation_enabled: parse_var("GENERATION_ENABLED", defaults.generation_enabled)?,
            generation_provider: parse_var("GENERATION_PROVIDER", defaults.generation_provider)?,
            generation_timeout_secs: parse_var(
                "GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout_secs,
            )?,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty()),
            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_image_model: env::var("OPENAI_IMAGE_MODEL")
                .unwrap_or(defaults.openai_image_model),
            openai_image_size: env::var("OPENAI_IMAGE_SIZE").unwrap_or(defaults.openai_image_size),
            mock_result_path: env::var("MOCK_RESULT_PATH").ok(),
            mock_delay_ms: parse_var("MOCK_DELAY_MS", defaults.mock_delay_ms)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation_provider == GenerationProvider::OpenAi && self.openai_api_key.is_none() {
            bail!("GENERATION_PROVIDER=openai requires OPENAI_API_KEY");
        }
        if self.max_file_size == 0 {
            bail!("MAX_FILE_SIZE must be greater than zero");
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Largest generated image the server will download from a provider URL.
    pub fn max_result_size(&self) -> usize {
        self.max_file_size.saturating_mul(RESULT_SIZE_FACTOR)
    }

    pub fn upload_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_ttl_secs)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
