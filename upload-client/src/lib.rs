//! Upload Client
//!
//! Turns a captured or picked file into an upload: local legality checks,
//! caption fallback and watermarking (`SubmissionClient`), then a cancellable
//! background transfer with progress and a hard timeout (`UploadTransport`).

pub mod caption;
pub mod error;
pub mod glyphs;
pub mod http;
pub mod request;
pub mod retry;
pub mod source;
pub mod submission;
pub mod transport;
pub mod watermark;

pub use caption::{caption_or_default, AnthropicCaptionConfig, AnthropicCaptioner, Captioner};
pub use error::*;
pub use http::HttpUploadBackend;
pub use request::{UploadMetadata, UploadRequest, UploadState};
pub use retry::{upload_with_retry, RetryConfig};
pub use source::{MediaSource, SourceOrigin};
pub use submission::{SubmissionClient, SubmissionPlan, UploadIntent};
pub use transport::{ProgressSink, UploadBackend, UploadHandle, UploadOutcome, UploadTransport, UploadUpdate};
pub use watermark::{apply_watermark, Branding};
