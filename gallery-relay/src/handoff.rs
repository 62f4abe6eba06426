//! Processing handoff: accept an upload, store it, announce it.
//!
//! Images are normalised inline and recorded `ready`. Videos are recorded
//! `pending` with no playable url and transcoded in a background task; the
//! result reaches viewers as `media_processed` or `media_failed`, never as a
//! response to the original request.
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


use bytes::Bytes;
use chrono::Utc;
use momentwall_types::{
    Actor, EventInfo, MediaFailedPayload, MediaItem, MediaKind, MediaProcessedPayload, ProcessingState, RoomMessage,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use upload_client::UploadMetadata;

use crate::broadcast::Broadcaster;
use crate::directory::Directory;
use crate::error::{RelayError, RelayResult};
use crate::processor::{normalize_image, video_extension, Transcoder};
use crate::repository::{CreateOutcome, MediaPatch, MediaRepository};
use crate::storage::{blob_key, BlobStore};
use crate::validation::{revalidate, size_mb, UploadCheck};

#[derive(Clone)]
pub struct ProcessingHandoff {
    directory: Arc<Directory>,
    repository: Arc<MediaRepository>,
    blobs: Arc<dyn BlobStore>,
    transcoder: Arc<dyn Transcoder>,
    broadcaster: Broadcaster,
    guest_max_upload_mb: f64,
}

impl ProcessingHandoff {
    pub fn new(
        directory: Arc<Directory>,
        repository: Arc<MediaRepository>,
        blobs: Arc<dyn BlobStore>,
        transcoder: Arc<dyn Transcoder>,
        broadcaster: Broadcaster,
        guest_max_upload_mb: f64,
    ) -> Self {
        Self {
            directory,
            repository,
            blobs,
            transcoder,
            broadcaster,
            guest_max_upload_mb,
        }
    }

    /// Accept one upload and return the record as initially stored.
    ///
    /// Replaying an id already recorded for the same uploader returns that
    /// record without storing or announcing anything again.
    pub async fn submit(&self, actor: &Actor, metadata: UploadMetadata, file: Bytes) -> RelayResult<MediaItem> {
        let event = self.directory.event(&metadata.event_id).await?;

        if let Some(existing) = self.repository.get(&metadata.id).await {
            return replayed(existing, &event, actor);
        }

        let kind = revalidate(&UploadCheck {
            actor,
            event: &event,
            metadata: &metadata,
            size_bytes: file.len() as u64,
            guest_max_upload_mb: self.guest_max_upload_mb,
            now: Utc::now(),
        })?;

        let mut item = MediaItem {
            id: metadata.id.clone(),
            event_id: event.id.clone(),
            kind,
            url: String::new(),
            preview_url: None,
            processing_state: ProcessingState::Pending,
            caption: metadata
                .caption
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            uploader_identity: actor.identity(),
            uploader_name: actor.display_name().to_string(),
            visibility: metadata.visibility,
            like_count: 0,
            watermark_applied: metadata.watermark_applied,
            comments: Vec::new(),
            created_at: Utc::now(),
        };

        let size_bytes = file.len() as u64;
        let video_source = match kind {
            MediaKind::Image => {
                self.store_image(&mut item, file).await?;
                None
            }
            MediaKind::Video => {
                let key = blob_key(
                    item.event_id.as_str(),
                    item.id.as_str(),
                    &format!("original.{}", video_extension(&metadata.content_type)),
                );
                self.blobs.put(&key, file.clone(), &metadata.content_type).await?;
                Some(file)
            }
        };

        let item = match self.repository.create(item).await {
            CreateOutcome::Created(item) => item,
            // Lost a race against a concurrent submission of the same id
            CreateOutcome::Existing(existing) => return replayed(existing, &event, actor),
        };

        info!(
            media_id = %item.id,
            event_id = %item.event_id,
            kind = ?item.kind,
            size_bytes,
            uploader = %item.uploader_identity,
            "Media accepted"
        );

        self.broadcaster
            .to_event(&item.event_id, &RoomMessage::MediaUploaded(item.clone()))
            .await;

        if let Some(user_id) = actor.user_id() {
            if let Some(update) = self.directory.add_storage(user_id, size_mb(size_bytes)).await {
                self.broadcaster.to_user(user_id, &RoomMessage::UserUpdated(update)).await;
            }
        }

        if let Some(source) = video_source {
            let handoff = self.clone();
            let item = item.clone();
            let content_type = metadata.content_type;
            tokio::spawn(async move {
                handoff.process_video(item, source, content_type).await;
            });
        }

        Ok(item)
    }

    async fn store_image(&self, item: &mut MediaItem, file: Bytes) -> RelayResult<()> {
        let normalized = tokio::task::spawn_blocking(move || normalize_image(&file))
            .await
            .map_err(|e| RelayError::Processing(format!("image task failed: {}", e)))??;

        let full_key = blob_key(item.event_id.as_str(), item.id.as_str(), "full.jpg");
        let preview_key = blob_key(item.event_id.as_str(), item.id.as_str(), "preview.jpg");

        item.url = self.blobs.put(&full_key, normalized.full, "image/jpeg").await?;
        item.preview_url = Some(self.blobs.put(&preview_key, normalized.preview, "image/jpeg").await?);
        item.processing_state = ProcessingState::Ready;
        Ok(())
    }

    /// Transcode, store, update the record and announce the result
    async fn process_video(&self, item: MediaItem, source: Bytes, content_type: String) {
        info!(media_id = %item.id, transcoder = self.transcoder.name(), "Video processing started");

        match self.finish_video(&item, source, &content_type).await {
            Ok(payload) => {
                if self.repository.get(&item.id).await.is_none() {
                    warn!(media_id = %item.id, "Video deleted while processing, result discarded");
                    return;
                }
                self.repository
                    .update(
                        &item.id,
                        MediaPatch::processed(payload.url.clone(), payload.preview_url.clone()),
                    )
                    .await;
                info!(media_id = %item.id, "Video processing complete");
                self.broadcaster
                    .to_event(&item.event_id, &RoomMessage::MediaProcessed(payload))
                    .await;
            }
            Err(e) => {
                error!(media_id = %item.id, error = %e, "Video processing failed");
                self.repository.delete(&item.id).await;
                self.broadcaster
                    .to_event(
                        &item.event_id,
                        &RoomMessage::MediaFailed(MediaFailedPayload {
                            id: item.id.clone(),
                            reason: e.to_string(),
                        }),
                    )
                    .await;
            }
        }
    }

    async fn finish_video(&self, item: &MediaItem, source: Bytes, content_type: &str) -> RelayResult<MediaProcessedPayload> {
        let output = self.transcoder.transcode(source, content_type).await?;

        let video_key = blob_key(
            item.event_id.as_str(),
            item.id.as_str(),
            &format!("video.{}", output.extension),
        );
        let poster_key = blob_key(item.event_id.as_str(), item.id.as_str(), "poster.jpg");

        let url = self.blobs.put(&video_key, output.video, &output.content_type).await?;
        let preview_url = self.blobs.put(&poster_key, output.poster, "image/jpeg").await?;

        Ok(MediaProcessedPayload {
            id: item.id.clone(),
            preview_url,
            url: Some(url),
        })
    }

    pub fn transcoder(&self) -> &dyn Transcoder {
        self.transcoder.as_ref()
    }
}

/// A resubmitted id resolves to its record only for the same uploader and event
fn replayed(existing: MediaItem, event: &EventInfo, actor: &Actor) -> RelayResult<MediaItem> {
    if existing.event_id == event.id && existing.uploader_identity == actor.identity() {
        info!(media_id = %existing.id, "Upload replayed, returning existing record");
        return Ok(existing);
    }
    Err(RelayError::Rejected(format!("media id {} is already in use", existing.id)))
}
