//! Error types for the upload pipeline
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


use momentwall_types::TierName;
use thiserror::Error;

/// Rejections raised before any byte leaves the device
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Storage quota exceeded: {used_mb:.1} MB used + {requested_mb:.1} MB > {limit_mb:.1} MB allowed")]
    QuotaExceeded {
        used_mb: f64,
        requested_mb: f64,
        limit_mb: f64,
    },

    #[error("Video uploads are not included in the {0:?} tier")]
    VideoNotAllowed(TierName),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Selected file is empty")]
    EmptySource,

    #[error("Watermark failed: {0}")]
    Watermark(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a transfer did not produce a server-confirmed item
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadFailure {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Upload timed out")]
    Timeout,

    #[error("Server rejected the upload: {0}")]
    ServerRejected(String),

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

impl UploadFailure {
    /// Only transport faults are worth replaying
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadFailure::NetworkError(_))
    }
}

/// Caption generation errors; always recovered with the default caption
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Caption API error: {0}")]
    Api(String),

    #[error("Invalid caption response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// An upload request was driven through a transition its state does not allow
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot {action} an upload that is {from}")]
pub struct TransitionError {
    pub from: &'static str,
    pub action: &'static str,
}
