use image::ImageFormat;
use std::path::Path;

/// True when a declared media type names an image kind (`image/*`).
pub fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .parse::<mime::Mime>()
        .map(|parsed| parsed.type_() == mime::IMAGE)
        .unwrap_or(false)
}

/// Detects the image format from magic bytes, ignoring whatever the client declared.
pub fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    sniff_format(data).map(mime_for_format)
}

pub fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Avif => "image/avif",
        ImageFormat::Ico => "image/x-icon",
        _ => "application/octet-stream",
    }
}

pub fn get_file_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Avif => "avif",
        ImageFormat::Ico => "ico",
        _ => "bin",
    }
}

pub async fn delete_file(file_path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(file_path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Removes every regular file directly inside `dir`. Returns how many were deleted.
pub async fn clear_directory(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() && delete_file(&entry.path()).await? {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_support::{jpeg_bytes, png_bytes};
    use tempfile::tempdir;

    #[test]
    fn test_image_media_types() {
        assert!(is_image_media_type("image/jpeg"));
        assert!(is_image_media_type("image/heic"));
        assert!(!is_image_media_type("application/pdf"));
        assert!(!is_image_media_type("text/plain; charset=utf-8"));
        assert!(!is_image_media_type("not a mime"));
    }

    #[test]
    fn test_sniffing_ignores_declared_type() {
        assert_eq!(sniff_mime(&jpeg_bytes(4, 4)), Some("image/jpeg"));
        assert_eq!(sniff_mime(&png_bytes(4, 4)), Some("image/png"));
        assert_eq!(sniff_mime(b"%PDF-1.7"), None);
    }

    #[tokio::test]
    async fn test_clear_directory() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.jpg"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("b.png"), b"b").await.unwrap();
        tokio::fs::create_dir(dir.path().join("nested")).await.unwrap();

        assert_eq!(clear_directory(dir.path()).await.unwrap(), 2);
        assert!(dir.path().join("nested").exists());
        assert_eq!(clear_directory(&dir.path().join("missing")).await.unwrap(), 0);
    }
}
