use chrono::Utc;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::StoredUpload,
    utils::file,
};

/// Session key shared by every request that does not send `X-Session-Id`.
pub const ANONYMOUS_SESSION: &str = "anonymous";

/// Holds at most one pending upload per session.
///
/// A new upload for a session replaces its slot and deletes the file it
/// displaced. Files only ever leave the store through [`UploadStore::take`],
/// which hands back an [`UploadLease`] that deletes the file when released or
/// dropped.
pub struct UploadStore {
    base_path: PathBuf,
    max_file_size: usize,
    slots: Mutex<HashMap<String, StoredUpload>>,
}

impl UploadStore {
    pub async fn new<P: AsRef<Path>>(base_path: P, max_file_size: usize) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create upload directory: {}", e)))?;

        Ok(Self {
            base_path,
            max_file_size,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn store(
        &self,
        session: &str,
        data: &[u8],
        original_name: Option<&str>,
    ) -> Result<StoredUpload> {
        if data.len() > self.max_file_size {
            return Err(AppError::FileTooLarge {
                limit: self.max_file_size,
            });
        }

        let format = file::sniff_format(data).ok_or(AppError::UnsupportedMediaType)?;
        let mime_type = file::mime_for_format(format);

        if let Some(declared) = original_name.and_then(|name| mime_guess::from_path(name).first()) {
            if declared.essence_str() != mime_type {
                tracing::warn!(
                    declared = %declared,
                    detected = mime_type,
                    "Upload extension does not match its content"
                );
            }
        }

        // The original filename never reaches the disk
        let filename = format!("{}.{}", Uuid::new_v4(), file::get_file_extension(format));
        let path = self.base_path.join(&filename);

        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write upload: {}", e)))?;

        let upload = StoredUpload {
            filename,
            path,
            mime_type: mime_type.to_string(),
            size_bytes: data.len() as u64,
            received_at: Utc::now(),
        };

        let displaced = self
            .slots
            .lock()
            .await
            .insert(session.to_string(), upload.clone());

        if let Some(previous) = displaced {
            discard(&previous, "replaced").await;
        }

        tracing::info!(
            filename = %upload.filename,
            size = upload.size_bytes,
            mime = %upload.mime_type,
            "Upload stored"
        );

        Ok(upload)
    }

    pub async fn current(&self, session: &str) -> Option<StoredUpload> {
        self.slots.lock().await.get(session).cloned()
    }

    /// Empties the session's slot and transfers the file to the caller.
    pub async fn take(&self, session: &str) -> Option<UploadLease> {
        self.slots
            .lock()
            .await
            .remove(session)
            .map(UploadLease::new)
    }

    /// Drops slots that have been waiting longer than `ttl`.
    pub async fn expire_older_than(&self, ttl: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - ttl,
            Err(_) => return 0,
        };

        let expired: Vec<StoredUpload> = {
            let mut slots = self.slots.lock().await;
            let stale: Vec<String> = slots
                .iter()
                .filter(|(_, upload)| upload.received_at < cutoff)
                .map(|(session, _)| session.clone())
                .collect();
            stale.iter().filter_map(|session| slots.remove(session)).collect()
        };

        for upload in &expired {
            discard(upload, "expired").await;
        }

        expired.len()
    }

    /// Deletes every file in the upload directory and forgets all slots.
    pub async fn sweep(&self) -> Result<usize> {
        self.slots.lock().await.clear();
        file::clear_directory(&self.base_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to sweep upload directory: {}", e)))
    }
}

async fn discard(upload: &StoredUpload, reason: &str) {
    match file::delete_file(&upload.path).await {
        Ok(_) => tracing::debug!(filename = %upload.filename, reason, "Upload discarded"),
        Err(e) => tracing::error!(filename = %upload.filename, reason, "Failed to delete upload: {}", e),
    }
}

/// Exclusive ownership of an uploaded file for the length of one request.
///
/// The file is deleted exactly once: by [`UploadLease::release`], or by
/// `Drop` if the request unwinds, errors out or is cancelled first.
#[derive(Debug)]
pub struct UploadLease {
    upload: StoredUpload,
    released: bool,
}

impl UploadLease {
    fn new(upload: StoredUpload) -> Self {
        Self {
            upload,
            released: false,
        }
    }

    pub fn upload(&self) -> &StoredUpload {
        &self.upload
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        fs::read(&self.upload.path).await
    }

    pub async fn release(mut self) {
        self.released = true;
        discard(&self.upload, "released").await;
    }
}

impl Drop for UploadLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.upload.path) {
            Ok(()) => tracing::warn!(filename = %self.upload.filename, "Upload deleted on unwind"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                filename = %self.upload.filename,
                "Failed to delete upload on unwind: {}",
                e
            ),
        }
    }
}
