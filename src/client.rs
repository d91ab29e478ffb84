use anyhow::{anyhow, bail, Context, Result};
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;
use std::{path::Path, time::Duration};
use uuid::Uuid;

use crate::{
    handlers::upload::PHOTO_FIELD,
    middleware::session::SESSION_HEADER,
    models::{CandidateFile, GeneratedImage, IntakeReport},
    services::{generator::normalize::parse_data_uri, intake_validator::{Confirm, IntakeValidator}},
};

#[derive(Debug, Deserialize)]
struct UploadReply {
    success: bool,
    filename: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReply {
    success: bool,
    result_base64: Option<String>,
    message: Option<String>,
}

#[derive(Debug)]
pub enum ClientOutcome {
    /// The validator stopped the photo; nothing was sent.
    Rejected(IntakeReport),
    Generated {
        report: IntakeReport,
        image: GeneratedImage,
    },
}

impl CandidateFile {
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let media_type = mime_guess::from_path(path).first_or_octet_stream().to_string();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());

        Ok(CandidateFile::new(file_name, media_type, bytes))
    }
}

/// Talks to the portrait server on behalf of one user session.
pub struct PortraitClient {
    http: Client,
    base_url: String,
    session_id: String,
    validator: IntakeValidator,
}

impl PortraitClient {
    pub fn new(base_url: &str, validator: IntakeValidator, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: Uuid::new_v4().simple().to_string(),
            validator,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn run(&self, file: CandidateFile, confirm: &dyn Confirm) -> Result<ClientOutcome> {
        let report = self.validator.validate(&file, confirm).await;
        if !report.outcome.is_accepted() {
            return Ok(ClientOutcome::Rejected(report));
        }

        let filename = self.upload(file).await?;
        tracing::info!(filename = %filename, "Photo uploaded");

        let image = self.generate().await?;
        Ok(ClientOutcome::Generated { report, image })
    }

    pub async fn upload(&self, file: CandidateFile) -> Result<String> {
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.media_type)?;
        let form = Form::new().part(PHOTO_FIELD, part);

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .header(SESSION_HEADER, &self.session_id)
            .multipart(form)
            .send()
            .await
            .context("upload request failed")?;

        let status = response.status();
        let reply: UploadReply = response
            .json()
            .await
            .with_context(|| format!("unexpected upload response ({})", status))?;

        match (reply.success, reply.filename) {
            (true, Some(filename)) => Ok(filename),
            _ => bail!(
                "upload rejected ({}): {}",
                status,
                reply.message.unwrap_or_else(|| "no message".to_string())
            ),
        }
    }

    pub async fn generate(&self) -> Result<GeneratedImage> {
        let response = self
            .http
            .post(format!("{}/generate", self.base_url))
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await
            .context("generate request failed")?;

        let status = response.status();
        let reply: GenerateReply = response
            .json()
            .await
            .with_context(|| format!("unexpected generate response ({})", status))?;

        if !reply.success {
            bail!(
                "generation failed ({}): {}",
                status,
                reply.message.unwrap_or_else(|| "no message".to_string())
            );
        }

        let uri = reply
            .result_base64
            .ok_or_else(|| anyhow!("generate response carried no image"))?;
        let (mime_type, bytes) = parse_data_uri(&uri)?;

        Ok(GeneratedImage {
            bytes,
            mime_type: mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
        })
    }
}
