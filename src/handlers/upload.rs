use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::Json,
};

use crate::{
    error::{AppError, Result},
    handlers::AppState,
    middleware::session::UploadSession,
    models::UploadResponse,
    utils::file,
};

pub const PHOTO_FIELD: &str = "photo";

pub async fn upload_photo(
    State(state): State<AppState>,
    session: UploadSession,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let max_size = state.config.max_file_size;
    let mut photo: Option<(Vec<u8>, Option<String>)> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }

        if let Some(content_type) = field.content_type() {
            if !file::is_image_media_type(content_type) {
                return Err(AppError::UnsupportedMediaType);
            }
        }
        let original_name = field.file_name().map(|name| name.to_string());

        // Stop reading as soon as the limit is crossed; nothing is on disk yet
        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_size))?
        {
            if data.len() + chunk.len() > max_size {
                tracing::warn!(limit = max_size, "Upload rejected, file too large");
                return Err(AppError::FileTooLarge { limit: max_size });
            }
            data.extend_from_slice(&chunk);
        }

        photo = Some((data, original_name));
    }

    let (data, original_name) = photo
        .filter(|(data, _)| !data.is_empty())
        .ok_or(AppError::NoFileUploaded)?;

    let stored = state
        .uploads
        .store(session.id(), &data, original_name.as_deref())
        .await?;
    state.metrics.record_upload(stored.size_bytes);

    Ok(Json(UploadResponse {
        success: true,
        filename: stored.filename,
    }))
}

fn multipart_error(error: MultipartError, limit: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge { limit }
    } else {
        AppError::Multipart(error.body_text())
    }
}
