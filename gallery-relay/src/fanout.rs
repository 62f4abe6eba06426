//! Per-viewer filtering of room traffic.
//!
//! Every socket subscribes to the shared room, so the relay decides per frame
//! whether this viewer may see it. Private items reach their uploader, the
//! host and admins only; a user room is joinable by that user alone.

use momentwall_types::{policy, Actor, EventId, EventInfo, MediaId, MediaItem, RoomEvent, RoomKey, RoomMessage, Visibility};
use std::sync::Arc;
use tracing::debug;

use crate::directory::Directory;
use crate::repository::MediaRepository;

/// Anonymous viewers see public items only
pub(crate) fn visible_to(viewer: Option<&Actor>, item: &MediaItem, event: &EventInfo) -> bool {
    match viewer {
        Some(viewer) => policy::can_view(viewer, item, event),
        None => item.visibility == Visibility::Public,
    }
}

#[derive(Clone)]
pub struct ViewerGate {
    viewer: Option<Actor>,
    directory: Arc<Directory>,
    repository: Arc<MediaRepository>,
}

impl ViewerGate {
    pub fn new(viewer: Option<Actor>, directory: Arc<Directory>, repository: Arc<MediaRepository>) -> Self {
        Self {
            viewer,
            directory,
            repository,
        }
    }

    pub fn viewer(&self) -> Option<&Actor> {
        self.viewer.as_ref()
    }

    pub fn may_join(&self, room: &RoomKey) -> bool {
        match room {
            RoomKey::Event(_) => true,
            RoomKey::User(user_id) => self.viewer.as_ref().and_then(Actor::user_id) == Some(user_id.as_str()),
        }
    }

    /// Whether `event` may be forwarded to this viewer
    pub async fn admits(&self, event: &RoomEvent) -> bool {
        let event_id = match &event.room {
            RoomKey::Event(event_id) => event_id,
            RoomKey::User(_) => return self.may_join(&event.room),
        };
        let message = match event.decode() {
            Ok(message) => message,
            Err(e) => {
                debug!(room = %event.room, error = %e, "Withholding undecodable event");
                return false;
            }
        };

        match message {
            RoomMessage::MediaUploaded(item) => self.can_see(&item).await,
            RoomMessage::MediaProcessed(payload) => self.can_see_record(event_id, &payload.id).await,
            RoomMessage::NewLike(payload) => self.can_see_record(event_id, &payload.id).await,
            RoomMessage::NewComment(payload) => self.can_see_record(event_id, &payload.media_id).await,
            // Removals carry nothing but the id
            RoomMessage::MediaFailed(_) | RoomMessage::MediaDeleted(_) => true,
            RoomMessage::NewMessage(_) | RoomMessage::UserUpdated(_) => true,
        }
    }

    async fn can_see_record(&self, event_id: &EventId, media_id: &MediaId) -> bool {
        match self.repository.get(media_id).await {
            Some(item) if &item.event_id == event_id => self.can_see(&item).await,
            _ => false,
        }
    }

    async fn can_see(&self, item: &MediaItem) -> bool {
        if item.visibility == Visibility::Public {
            return true;
        }
        if self.viewer.is_none() {
            return false;
        }
        match self.directory.event(&item.event_id).await {
            Ok(event) => visible_to(self.viewer.as_ref(), item, &event),
            Err(_) => false,
        }
    }
}
