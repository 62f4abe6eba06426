//! Media processing: image normalisation and video transcoding
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};

/// Longest edge of a stored image
pub const MAX_IMAGE_EDGE: u32 = 2048;
/// Longest edge of an image preview or video poster
pub const PREVIEW_EDGE: u32 = 480;

/// JPEG renditions of an uploaded image
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub full: Bytes,
    pub preview: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Decode, apply EXIF orientation, bound to `MAX_IMAGE_EDGE` and render a preview.
///
/// CPU bound; call it from `spawn_blocking`.
pub fn normalize_image(bytes: &[u8]) -> RelayResult<NormalizedImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RelayError::Processing(format!("unreadable image: {}", e)))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| RelayError::Processing(format!("unsupported image: {}", e)))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| RelayError::Processing(format!("could not decode image: {}", e)))?;
    image.apply_orientation(orientation);

    let full = fit_within(image, MAX_IMAGE_EDGE);
    let preview = fit_within(full.clone(), PREVIEW_EDGE);

    Ok(NormalizedImage {
        width: full.width(),
        height: full.height(),
        full: encode_jpeg(&full)?,
        preview: encode_jpeg(&preview)?,
    })
}

/// Shrink so the longest edge is at most `edge`; never enlarges
fn fit_within(image: DynamicImage, edge: u32) -> DynamicImage {
    if image.width() <= edge && image.height() <= edge {
        return image;
    }
    image.resize(edge, edge, FilterType::Lanczos3)
}

fn encode_jpeg(image: &DynamicImage) -> RelayResult<Bytes> {
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8())
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .map_err(|e| RelayError::Processing(format!("could not encode image: {}", e)))?;
    Ok(Bytes::from(out))
}

/// Output of a video transcode
#[derive(Debug, Clone)]
pub struct TranscodedVideo {
    pub video: Bytes,
    pub content_type: String,
    pub extension: String,
    /// JPEG still used as the grid thumbnail
    pub poster: Bytes,
}

/// Turns an uploaded video into a playable rendition and a poster frame
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, source: Bytes, content_type: &str) -> RelayResult<TranscodedVideo>;

    fn name(&self) -> &str;
}

/// ffmpeg command line transcoder: H.264/AAC MP4 plus a scaled poster frame
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder;

impl FfmpegTranscoder {
    /// Check if FFmpeg is available
    pub async fn is_available() -> bool {
        match Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) => status.success(),
            Err(_) => false,
        }
    }

    async fn run(args: &[&str]) -> RelayResult<()> {
        let output = Command::new("ffmpeg")
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().last().unwrap_or("").to_string();
        Err(RelayError::Processing(format!("ffmpeg failed: {}", last_line)))
    }

    async fn poster(input: &str, output: &str) -> RelayResult<()> {
        let scale = format!("scale={}:-2", PREVIEW_EDGE);
        // One second in, falling back to the first frame for very short clips
        let at_one_second = Self::run(&[
            "-y", "-ss", "1", "-i", input, "-vframes", "1", "-vf", &scale, "-q:v", "2", output,
        ])
        .await;
        if at_one_second.is_ok() && Path::new(output).exists() {
            return Ok(());
        }
        Self::run(&["-y", "-i", input, "-vframes", "1", "-vf", &scale, "-q:v", "2", output]).await
    }
}

fn path_str(path: &Path) -> RelayResult<&str> {
    path.to_str()
        .ok_or_else(|| RelayError::Processing(format!("path contains invalid UTF-8: {:?}", path)))
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, source: Bytes, content_type: &str) -> RelayResult<TranscodedVideo> {
        let work_dir = tempfile::tempdir()?;
        let input = work_dir.path().join(format!("source.{}", video_extension(content_type)));
        let output = work_dir.path().join("video.mp4");
        let poster = work_dir.path().join("poster.jpg");

        tokio::fs::write(&input, &source).await?;
        debug!(size = source.len(), content_type = content_type, "Transcoding video");

        Self::run(&[
            "-y",
            "-i",
            path_str(&input)?,
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "23",
            "-c:a",
            "aac",
            "-movflags",
            "+faststart",
            path_str(&output)?,
        ])
        .await?;
        Self::poster(path_str(&input)?, path_str(&poster)?).await?;

        Ok(TranscodedVideo {
            video: Bytes::from(tokio::fs::read(&output).await?),
            content_type: "video/mp4".to_string(),
            extension: "mp4".to_string(),
            poster: Bytes::from(tokio::fs::read(&poster).await?),
        })
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Keeps the original video and pairs it with a neutral poster.
/// Used when ffmpeg is not installed.
#[derive(Debug, Clone, Default)]
pub struct PassthroughTranscoder;

#[async_trait]
impl Transcoder for PassthroughTranscoder {
    async fn transcode(&self, source: Bytes, content_type: &str) -> RelayResult<TranscodedVideo> {
        warn!("Using passthrough transcoding");

        let poster = tokio::task::spawn_blocking(placeholder_poster)
            .await
            .map_err(|e| RelayError::Processing(format!("poster task failed: {}", e)))??;

        Ok(TranscodedVideo {
            video: source,
            content_type: content_type.to_string(),
            extension: video_extension(content_type).to_string(),
            poster,
        })
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

fn placeholder_poster() -> RelayResult<Bytes> {
    let image = RgbImage::from_pixel(PREVIEW_EDGE, PREVIEW_EDGE * 9 / 16, Rgb([32, 32, 36]));
    encode_jpeg(&DynamicImage::ImageRgb8(image))
}

/// Pick ffmpeg when it is installed
pub async fn detect_transcoder() -> Arc<dyn Transcoder> {
    if FfmpegTranscoder::is_available().await {
        info!("FFmpeg available, videos will be transcoded");
        Arc::new(FfmpegTranscoder)
    } else {
        warn!("FFmpeg not available, videos will be stored as uploaded");
        Arc::new(PassthroughTranscoder)
    }
}

pub fn video_extension(content_type: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        _ => "mp4",
    }
}
