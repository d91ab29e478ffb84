use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// The single file held in a session's upload slot.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
}
