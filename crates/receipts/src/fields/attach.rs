//! Selection and encoding of receipt images sent alongside the prompt.

use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::debug;

use crate::error::FieldError;
use crate::extract::{
    cached_png_path, is_heic_extension, normalize_extension, FileFormat,
    IMAGE_CONFIDENCE_THRESHOLD,
};

use super::ExtractRequest;

/// An image ready to embed as a `data:` URL.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub path: PathBuf,
    pub mime: String,
    pub data_url: String,
}

/// Returns the file to attach for a low-confidence image, if one qualifies.
///
/// Nothing qualifies with `vision` off. HEIC sources qualify only through
/// their cached PNG. Files larger than `max_bytes` never qualify.
pub fn attachable_image(req: &ExtractRequest, vision: bool, max_bytes: u64) -> Option<PathBuf> {
    if !vision {
        return None;
    }
    let path = req.file_path.as_deref()?;
    let ext = normalize_extension(path.extension()?.to_str()?);
    if FileFormat::from_extension(&ext) != Some(FileFormat::Image) {
        return None;
    }
    if req.ocr_confidence >= IMAGE_CONFIDENCE_THRESHOLD {
        return None;
    }

    let candidate = if is_heic_extension(&ext) {
        let dir = req.artifact_cache_dir.as_deref()?;
        let hash = req.content_hash_hex.as_deref().filter(|h| !h.is_empty())?;
        let cached = cached_png_path(dir, hash);
        if !cached.is_file() {
            debug!("no cached PNG for HEIC source, sending text only");
            return None;
        }
        cached
    } else {
        path.to_path_buf()
    };

    let size = std::fs::metadata(&candidate).ok()?.len();
    if size > max_bytes {
        debug!(size, max_bytes, "image too large to attach");
        return None;
    }
    Some(candidate)
}

pub async fn load_attachment(path: &Path) -> Result<ImageAttachment, FieldError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| FieldError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

    Ok(ImageAttachment {
        path: path.to_path_buf(),
        data_url: format!("data:{};base64,{}", mime, encoded),
        mime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    fn low_confidence(path: PathBuf) -> ExtractRequest {
        ExtractRequest {
            file_path: Some(path),
            ocr_confidence: 0.35,
            ..ExtractRequest::default()
        }
    }

    #[test]
    fn test_low_confidence_image_attaches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let req = low_confidence(path.clone());
        assert_eq!(attachable_image(&req, true, 10 * MB), Some(path));
        assert_eq!(attachable_image(&req, false, 10 * MB), None);
    }

    #[test]
    fn test_confident_image_and_pdf_do_not_attach() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("r.png");
        let pdf = dir.path().join("r.pdf");
        std::fs::write(&image, b"png").unwrap();
        std::fs::write(&pdf, b"pdf").unwrap();

        let mut req = low_confidence(image);
        req.ocr_confidence = 0.6;
        assert_eq!(attachable_image(&req, true, 10 * MB), None);

        assert_eq!(attachable_image(&low_confidence(pdf), true, 10 * MB), None);
        assert_eq!(attachable_image(&ExtractRequest::default(), true, 10 * MB), None);
    }

    #[test]
    fn test_size_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        assert!(attachable_image(&low_confidence(path.clone()), true, 2048).is_some());
        assert!(attachable_image(&low_confidence(path), true, 2047).is_none());
    }

    #[test]
    fn test_heic_requires_cached_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("IMG_1.HEIC");
        std::fs::write(&source, b"heic").unwrap();
        let cache = dir.path().join("cache");

        let mut req = low_confidence(source);
        req.content_hash_hex = Some("abc".to_string());
        req.artifact_cache_dir = Some(cache.clone());
        assert_eq!(attachable_image(&req, true, 10 * MB), None);

        std::fs::create_dir_all(&cache).unwrap();
        let cached = cached_png_path(&cache, "abc");
        std::fs::write(&cached, b"png").unwrap();
        assert_eq!(attachable_image(&req, true, 10 * MB), Some(cached));
    }

    #[tokio::test]
    async fn test_load_attachment_builds_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.png");
        std::fs::write(&path, b"abc").unwrap();

        let attachment = load_attachment(&path).await.unwrap();
        assert_eq!(attachment.mime, "image/png");
        assert_eq!(attachment.data_url, "data:image/png;base64,YWJj");
    }
}
