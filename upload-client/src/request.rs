//! The in-flight upload and its lifecycle.
//!
//! `Created -> Submitting -> (Processing) -> Complete`, with `Failed` and
//! `Cancelled` as the other terminal states. A request lives only in memory and
//! is dropped once terminal.

use bytes::Bytes;
use chrono::Utc;
use momentwall_types::{
    Actor, EventId, MediaId, MediaItem, MediaKind, ProcessingState, UploaderIdentity, Visibility,
};
use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, UploadFailure};
use crate::transport::UploadOutcome;

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Created,
    Submitting,
    /// Accepted; a video is transcoding on the server
    Processing,
    Complete,
    Failed(UploadFailure),
    Cancelled,
}

impl UploadState {
    pub fn name(&self) -> &'static str {
        match self {
            UploadState::Created => "created",
            UploadState::Submitting => "submitting",
            UploadState::Processing => "processing",
            UploadState::Complete => "complete",
            UploadState::Failed(_) => "failed",
            UploadState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::Complete | UploadState::Failed(_) | UploadState::Cancelled
        )
    }
}

/// Metadata part of the multipart submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub id: MediaId,
    pub event_id: EventId,
    pub kind: MediaKind,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    pub uploader_identity: UploaderIdentity,
    pub uploader_name: String,
    #[serde(default)]
    pub watermark_applied: bool,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A prepared submission with its id already assigned
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub id: MediaId,
    pub event_id: EventId,
    pub kind: MediaKind,
    pub payload: Bytes,
    pub file_name: String,
    pub content_type: String,
    pub caption: Option<String>,
    pub visibility: Visibility,
    pub actor: Actor,
    pub watermark_applied: bool,
    progress_percent: u8,
    state: UploadState,
}

impl UploadRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: EventId,
        kind: MediaKind,
        payload: Bytes,
        file_name: String,
        content_type: String,
        caption: Option<String>,
        visibility: Visibility,
        actor: Actor,
        watermark_applied: bool,
    ) -> Self {
        Self {
            id: MediaId::generate(),
            event_id,
            kind,
            payload,
            file_name,
            content_type,
            caption,
            visibility,
            actor,
            watermark_applied,
            progress_percent: 0,
            state: UploadState::Created,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn metadata(&self) -> UploadMetadata {
        UploadMetadata {
            id: self.id.clone(),
            event_id: self.event_id.clone(),
            kind: self.kind,
            caption: self.caption.clone(),
            visibility: self.visibility,
            uploader_identity: self.actor.identity(),
            uploader_name: self.actor.display_name().to_string(),
            watermark_applied: self.watermark_applied,
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.payload.len() as u64,
        }
    }

    /// Placeholder shown in the gallery while the bytes are in flight
    pub fn optimistic_item(&self) -> MediaItem {
        MediaItem {
            id: self.id.clone(),
            event_id: self.event_id.clone(),
            kind: self.kind,
            url: String::new(),
            preview_url: None,
            processing_state: ProcessingState::Pending,
            caption: self.caption.clone(),
            uploader_identity: self.actor.identity(),
            uploader_name: self.actor.display_name().to_string(),
            visibility: self.visibility,
            like_count: 0,
            watermark_applied: self.watermark_applied,
            comments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Start (or replay after a transport fault) the transfer
    pub fn begin_submit(&mut self) -> Result<(), TransitionError> {
        match &self.state {
            UploadState::Created => {}
            UploadState::Failed(failure) if failure.is_retryable() => {}
            other => return Err(self.invalid(other.name(), "submit")),
        }
        self.state = UploadState::Submitting;
        self.progress_percent = 0;
        Ok(())
    }

    /// Record transfer progress; never moves backwards and never passes 100
    pub fn record_progress(&mut self, percent: u8) {
        if self.state == UploadState::Submitting {
            self.progress_percent = self.progress_percent.max(percent.min(100));
        }
    }

    /// The server accepted the upload
    pub fn acknowledge(&mut self, item: &MediaItem) -> Result<(), TransitionError> {
        if self.state != UploadState::Submitting {
            return Err(self.invalid(self.state.name(), "acknowledge"));
        }
        self.progress_percent = 100;
        self.state = match item.processing_state {
            ProcessingState::Pending => UploadState::Processing,
            ProcessingState::Ready => UploadState::Complete,
        };
        Ok(())
    }

    /// Out-of-band processing finished
    pub fn mark_processed(&mut self) -> Result<(), TransitionError> {
        if self.state != UploadState::Processing {
            return Err(self.invalid(self.state.name(), "complete"));
        }
        self.state = UploadState::Complete;
        Ok(())
    }

    pub fn fail(&mut self, failure: UploadFailure) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(self.invalid(self.state.name(), "fail"));
        }
        self.state = UploadState::Failed(failure);
        Ok(())
    }

    /// Cancel before the server acknowledged the upload
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match self.state {
            UploadState::Created | UploadState::Submitting => {
                self.state = UploadState::Cancelled;
                Ok(())
            }
            _ => Err(self.invalid(self.state.name(), "cancel")),
        }
    }

    /// Apply the transport's terminal outcome
    pub fn resolve(&mut self, outcome: &UploadOutcome) -> Result<(), TransitionError> {
        match outcome {
            UploadOutcome::Ready(item) => self.acknowledge(item),
            UploadOutcome::Failed(failure) => self.fail(failure.clone()),
            UploadOutcome::Cancelled => self.cancel(),
        }
    }

    fn invalid(&self, from: &'static str, action: &'static str) -> TransitionError {
        TransitionError { from, action }
    }
}
