//! Upload transport and progress channel
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
use momentwall_config::UploadConfig;
use momentwall_types::{MediaId, MediaItem};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TransitionError, UploadFailure};
use crate::request::UploadRequest;

/// Terminal result of one transfer
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Ready(MediaItem),
    Failed(UploadFailure),
    Cancelled,
}

/// What the caller observes while a transfer runs: progress updates followed by
/// exactly one `Finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadUpdate {
    Progress(u8),
    Finished(UploadOutcome),
}

/// Reports transfer progress without ever going backwards
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<UploadUpdate>,
    last: Arc<AtomicU8>,
}

impl ProgressSink {
    fn new(tx: mpsc::UnboundedSender<UploadUpdate>) -> Self {
        Self {
            tx,
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Report `percent`; values at or below the last report are dropped
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            let _ = self.tx.send(UploadUpdate::Progress(percent));
        }
    }

    /// Percentage of `sent` out of `total`, held below 100 until the server answers
    pub fn report_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = (sent.saturating_mul(100) / total).min(99) as u8;
        self.report(percent);
    }

    pub fn last(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}

/// Moves bytes and metadata to the server
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Send `request` and return the server's record of it.
    ///
    /// Replaying the same request id must be safe.
    async fn send(&self, request: &UploadRequest, progress: ProgressSink) -> Result<MediaItem, UploadFailure>;
}

/// Runs uploads in the background with a hard ceiling and cancellation
pub struct UploadTransport {
    backend: Arc<dyn UploadBackend>,
    timeout: Duration,
}

impl UploadTransport {
    pub fn new(backend: Arc<dyn UploadBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn from_config(backend: Arc<dyn UploadBackend>, config: &UploadConfig) -> Self {
        Self::new(backend, config.timeout())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Move `request` to `Submitting` and start sending it.
    ///
    /// The returned handle yields progress and then the outcome; apply the
    /// outcome to `request` with `UploadRequest::resolve`.
    pub fn start(&self, request: &mut UploadRequest) -> Result<UploadHandle, TransitionError> {
        request.begin_submit()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let backend = Arc::clone(&self.backend);
        let timeout = self.timeout;
        let token = cancel.clone();
        let request = request.clone();
        let id = request.id.clone();

        info!(
            media_id = %request.id,
            event_id = %request.event_id,
            bytes = request.payload.len(),
            "Starting upload"
        );

        let task = tokio::spawn(async move {
            let progress = ProgressSink::new(tx.clone());

            let outcome = tokio::select! {
                _ = token.cancelled() => UploadOutcome::Cancelled,
                result = tokio::time::timeout(timeout, backend.send(&request, progress.clone())) => {
                    match result {
                        Ok(Ok(item)) if item.id == request.id => {
                            progress.report(100);
                            UploadOutcome::Ready(item)
                        }
                        Ok(Ok(item)) => UploadOutcome::Failed(UploadFailure::InvalidResponse(format!(
                            "server answered for {} instead of {}",
                            item.id, request.id
                        ))),
                        Ok(Err(failure)) => UploadOutcome::Failed(failure),
                        Err(_) => UploadOutcome::Failed(UploadFailure::Timeout),
                    }
                }
            };

            match &outcome {
                UploadOutcome::Ready(_) => debug!(media_id = %request.id, "Upload acknowledged"),
                UploadOutcome::Failed(failure) => {
                    warn!(media_id = %request.id, error = %failure, "Upload failed")
                }
                UploadOutcome::Cancelled => info!(media_id = %request.id, "Upload cancelled"),
            }

            let _ = tx.send(UploadUpdate::Finished(outcome.clone()));
            outcome
        });

        Ok(UploadHandle {
            id,
            updates: rx,
            cancel,
            task,
        })
    }
}

/// Caller's side of a running upload
pub struct UploadHandle {
    id: MediaId,
    updates: mpsc::UnboundedReceiver<UploadUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<UploadOutcome>,
}

impl UploadHandle {
    pub fn id(&self) -> &MediaId {
        &self.id
    }

    /// Abort the transfer; the server is not told
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this upload when triggered, e.g. by a parent view
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next progress update or the final outcome; `None` after `Finished`
    pub async fn next_update(&mut self) -> Option<UploadUpdate> {
        self.updates.recv().await
    }

    /// Wait for the outcome, ignoring progress
    pub async fn finish(self) -> UploadOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => UploadOutcome::Failed(UploadFailure::NetworkError(format!("upload task aborted: {}", e))),
        }
    }

    /// Wait for the outcome, passing each progress update to `on_progress`
    pub async fn wait_with_progress<F>(mut self, mut on_progress: F) -> UploadOutcome
    where
        F: FnMut(u8),
    {
        while let Some(update) = self.updates.recv().await {
            match update {
                UploadUpdate::Progress(percent) => on_progress(percent),
                UploadUpdate::Finished(outcome) => return outcome,
            }
        }
        self.finish().await
    }
}
