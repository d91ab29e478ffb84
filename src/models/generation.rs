use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("Portrait generation is currently disabled")]
    ServiceDisabled,

    #[error("Daily generation limit reached, please try again tomorrow")]
    QuotaExceeded,

    #[error("No uploaded photo found, please upload a photo first")]
    NoUploadedFile,

    #[error("Uploaded photo could not be read, please upload it again")]
    FileMissing,

    #[error("Usage ledger unavailable: {0}")]
    QuotaLedger(String),

    #[error("Generation failed: {0}")]
    GenerationError(String),
}

impl GenerationFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationFailure::ServiceDisabled => "service_disabled",
            GenerationFailure::QuotaExceeded => "quota_exceeded",
            GenerationFailure::NoUploadedFile => "no_uploaded_file",
            GenerationFailure::FileMissing => "file_missing",
            GenerationFailure::QuotaLedger(_) => "quota_ledger",
            GenerationFailure::GenerationError(_) => "generation_error",
        }
    }
}

pub type GenerationResult = std::result::Result<GeneratedImage, GenerationFailure>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub result_base64: String,
}
