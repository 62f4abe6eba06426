//! Media picked from the camera or the file system

use bytes::Bytes;
use chrono::Utc;
use momentwall_types::MediaKind;
use std::path::Path;

use crate::error::SubmissionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Camera,
    FilePicker,
}

/// Raw bytes plus what the picker told us about them
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub bytes: Bytes,
    pub file_name: String,
    pub content_type: String,
    pub origin: SourceOrigin,
}

impl MediaSource {
    pub fn new(
        bytes: impl Into<Bytes>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        origin: SourceOrigin,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            origin,
        }
    }

    /// A still captured by the in-app camera
    pub fn camera_capture(jpeg: impl Into<Bytes>) -> Self {
        Self::new(
            jpeg,
            format!("capture-{}.jpg", Utc::now().timestamp_millis()),
            "image/jpeg",
            SourceOrigin::Camera,
        )
    }

    /// Read a file chosen in the picker; the content type comes from its extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SubmissionError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        Ok(Self::new(
            bytes,
            file_name,
            guess_content_type(extension),
            SourceOrigin::FilePicker,
        ))
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_content_type(&self.content_type)
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Size in megabytes as counted against storage quotas
    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / (1024.0 * 1024.0)
    }
}

fn guess_content_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_from_path_detects_video() {
        let mut file = tempfile::Builder::new().suffix(".MP4").tempfile().unwrap();
        file.write_all(&[0u8; 2048]).unwrap();

        let source = MediaSource::from_path(file.path()).await.unwrap();
        assert_eq!(source.content_type, "video/mp4");
        assert_eq!(source.kind(), Some(MediaKind::Video));
        assert_eq!(source.origin, SourceOrigin::FilePicker);
        assert_eq!(source.size_bytes(), 2048);
    }

    #[tokio::test]
    async fn test_unreadable_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = MediaSource::from_path(dir.path().join("gone.jpg")).await;
        assert!(matches!(result, Err(SubmissionError::Io(_))));
    }

    #[test]
    fn test_camera_capture_is_jpeg() {
        let source = MediaSource::camera_capture(vec![1, 2, 3]);
        assert_eq!(source.kind(), Some(MediaKind::Image));
        assert!(source.file_name.ends_with(".jpg"));
    }

    #[test]
    fn test_size_in_megabytes() {
        let source = MediaSource::new(vec![0u8; 3 * 1024 * 1024], "a.png", "image/png", SourceOrigin::FilePicker);
        assert!((source.size_mb() - 3.0).abs() < f64::EPSILON);
    }
}
