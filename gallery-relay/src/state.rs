//! Shared state handed to every request handler

use chrono::{DateTime, Utc};
use momentwall_config::UploadConfig;
use room_channel::RoomChannel;
use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::directory::Directory;
use crate::handoff::ProcessingHandoff;
use crate::processor::Transcoder;
use crate::repository::MediaRepository;
use crate::storage::BlobStore;

#[derive(Clone)]
pub struct RelayState {
    /// Accounts, tiers and events
    pub directory: Arc<Directory>,
    /// Media records and guestbooks
    pub repository: Arc<MediaRepository>,
    /// Room fan-out
    pub broadcaster: Broadcaster,
    /// Upload acceptance and processing
    pub handoff: ProcessingHandoff,
    pub started_at: DateTime<Utc>,
}

impl RelayState {
    pub fn new(
        directory: Arc<Directory>,
        channel: Arc<dyn RoomChannel>,
        blobs: Arc<dyn BlobStore>,
        transcoder: Arc<dyn Transcoder>,
        upload: &UploadConfig,
    ) -> Self {
        let repository = Arc::new(MediaRepository::new());
        let broadcaster = Broadcaster::new(channel);
        let handoff = ProcessingHandoff::new(
            Arc::clone(&directory),
            Arc::clone(&repository),
            blobs,
            transcoder,
            broadcaster.clone(),
            upload.guest_max_upload_mb,
        );

        Self {
            directory,
            repository,
            broadcaster,
            handoff,
            started_at: Utc::now(),
        }
    }
}
