//! Multipart HTTP backend for the upload transport

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use momentwall_types::{headers, MediaItem};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use tracing::debug;

use crate::error::UploadFailure;
use crate::request::UploadRequest;
use crate::transport::{ProgressSink, UploadBackend};

const CHUNK_SIZE: usize = 64 * 1024;

/// Posts `metadata` + `file` parts to `<relay>/api/events/<event_id>/media`
#[derive(Debug, Clone)]
pub struct HttpUploadBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploadBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn upload_url(&self, request: &UploadRequest) -> String {
        format!("{}/api/events/{}/media", self.base_url, request.event_id)
    }
}

#[derive(Deserialize)]
struct RejectionBody {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn chunks(payload: &Bytes) -> Vec<Bytes> {
    (0..payload.len())
        .step_by(CHUNK_SIZE)
        .map(|start| payload.slice(start..(start + CHUNK_SIZE).min(payload.len())))
        .collect()
}

/// Body stream that reports progress as the client pulls each chunk
fn progress_body(payload: Bytes, progress: ProgressSink) -> Body {
    let total = payload.len() as u64;
    let mut sent = 0u64;
    let body = stream::iter(chunks(&payload).into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report_bytes(sent, total);
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    Body::wrap_stream(body)
}

fn classify_send_error(error: reqwest::Error) -> UploadFailure {
    if error.is_timeout() {
        UploadFailure::Timeout
    } else {
        UploadFailure::NetworkError(error.to_string())
    }
}

#[async_trait]
impl UploadBackend for HttpUploadBackend {
    async fn send(&self, request: &UploadRequest, progress: ProgressSink) -> Result<MediaItem, UploadFailure> {
        let metadata = serde_json::to_string(&request.metadata())
            .map_err(|e| UploadFailure::NetworkError(format!("could not encode metadata: {}", e)))?;

        let file = Part::stream_with_length(
            progress_body(request.payload.clone(), progress),
            request.payload.len() as u64,
        )
        .file_name(request.file_name.clone())
        .mime_str(&request.content_type)
        .map_err(|e| UploadFailure::NetworkError(format!("invalid content type: {}", e)))?;

        let form = Form::new().text("metadata", metadata).part("file", file);

        let mut builder = self.client.post(self.upload_url(request)).multipart(form);
        for (name, value) in headers::actor_headers(&request.actor) {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status();
        debug!(media_id = %request.id, status = %status, "Upload response received");

        if status.is_success() {
            let body = response.bytes().await.map_err(classify_send_error)?;
            return serde_json::from_slice::<MediaItem>(&body)
                .map_err(|e| UploadFailure::InvalidResponse(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            let reason = serde_json::from_str::<RejectionBody>(&text)
                .ok()
                .and_then(|body| body.reason.or(body.error))
                .unwrap_or_else(|| format!("{}: {}", status, text));
            return Err(UploadFailure::ServerRejected(reason));
        }

        if status.is_server_error() {
            return Err(UploadFailure::NetworkError(format!("server error {}", status)));
        }

        Err(UploadFailure::InvalidResponse(format!("unexpected status {}", status)))
    }
}
