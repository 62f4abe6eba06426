//! Event gallery session
//!
//! Owned by whatever shows an event. It holds the room connection, the store
//! and the API client for as long as the event is on screen; leaving drops the
//! room membership with it.
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


use momentwall_types::{
    policy, Actor, Comment, EventId, GuestbookEntry, MediaId, NewCommentPayload, NewLikePayload,
    ProcessingState, RoomKey, RoomMessage, UserUpdatedPayload,
};
use room_channel::{ConnectionEvent, RoomConnection};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use upload_client::{UploadFailure, UploadHandle, UploadOutcome, UploadRequest, UploadState, UploadTransport};

use crate::api::GalleryApi;
use crate::error::{Result, StoreError};
use crate::store::{GalleryStore, StoreChange};

/// What `next_event` reports to the view
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Changed(StoreChange),
    /// The viewer's account changed (tier, storage used, name)
    ViewerUpdated,
    /// The collection was refetched after a gap
    Resynced,
    /// The connection is gone and could not be re-established
    Disconnected,
}

pub struct GallerySession {
    api: Arc<dyn GalleryApi>,
    connection: RoomConnection,
    store: GalleryStore,
    viewer: Actor,
    event_room: RoomKey,
    /// Own uploads the server accepted but is still processing
    processing: HashSet<MediaId>,
}

impl GallerySession {
    /// Connect, join the event room (and the viewer's user room), then fetch
    /// the baseline.
    ///
    /// The join is requested before the fetch so the two overlap, and the
    /// store absorbs duplicates. Over a relay socket the join is not
    /// acknowledged, so an event published in the instant before the relay
    /// subscribes can still be missed; the next resync covers it.
    pub async fn enter(
        api: Arc<dyn GalleryApi>,
        mut connection: RoomConnection,
        viewer: Actor,
        event_id: &EventId,
    ) -> Result<Self> {
        let event = api.fetch_event(event_id, &viewer).await?;
        let event_room = RoomKey::event(&event.id);

        connection.connect().await?;
        connection.join_room(event_room.clone()).await?;
        if let Some(user_id) = viewer.user_id() {
            connection.join_room(RoomKey::user(user_id)).await?;
        }

        let mut session = Self {
            api,
            connection,
            store: GalleryStore::new(event, viewer.clone()),
            viewer,
            event_room,
            processing: HashSet::new(),
        };
        session.resync().await?;

        info!(event_id = %event_id, items = session.store.len(), "Entered event gallery");
        Ok(session)
    }

    pub fn store(&self) -> &GalleryStore {
        &self.store
    }

    pub fn viewer(&self) -> &Actor {
        &self.viewer
    }

    pub fn event_id(&self) -> &EventId {
        &self.store.event().id
    }

    /// Refetch the full collection and guestbook
    pub async fn resync(&mut self) -> Result<()> {
        let event_id = self.event_id().clone();
        let items = self.api.fetch_media(&event_id, &self.viewer).await?;
        let entries = self.api.fetch_guestbook(&event_id, &self.viewer).await?;
        self.store.load_baseline(items);
        self.store.load_guestbook(entries);
        Ok(())
    }

    /// Wait for the next broadcast and fold it into the store.
    ///
    /// Returns `None` once the session has left the event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            match self.connection.recv().await? {
                ConnectionEvent::Message { room, message } => {
                    if let Some(event) = self.on_message(&room, message) {
                        return Some(event);
                    }
                }
                ConnectionEvent::Resync { .. } => {
                    return Some(match self.resync().await {
                        Ok(()) => SessionEvent::Resynced,
                        Err(e) => {
                            warn!(error = %e, "Resync failed");
                            SessionEvent::Disconnected
                        }
                    });
                }
                ConnectionEvent::Closed => return Some(self.reconnect().await),
            }
        }
    }

    fn on_message(&mut self, room: &RoomKey, message: RoomMessage) -> Option<SessionEvent> {
        if let RoomMessage::UserUpdated(update) = message {
            return self.on_user_updated(update).then_some(SessionEvent::ViewerUpdated);
        }
        if room != &self.event_room {
            return None;
        }

        match &message {
            RoomMessage::MediaProcessed(p) => self.finish_processing(&p.id, "ready"),
            RoomMessage::MediaFailed(p) => self.finish_processing(&p.id, "failed"),
            _ => {}
        }

        let change = self.store.apply(message);
        change.is_change().then_some(SessionEvent::Changed(change))
    }

    fn on_user_updated(&mut self, update: UserUpdatedPayload) -> bool {
        let Actor::User {
            id,
            display_name,
            tier,
            storage_used_mb,
            ..
        } = &mut self.viewer
        else {
            return false;
        };
        if *id != update.user_id {
            return false;
        }

        if let Some(name) = update.display_name {
            *display_name = name;
        }
        if let Some(new_tier) = update.tier {
            *tier = new_tier;
        }
        if let Some(used) = update.storage_used_mb {
            *storage_used_mb = used;
        }
        debug!(user_id = %id, "Viewer account updated");
        true
    }

    fn finish_processing(&mut self, id: &MediaId, result: &'static str) {
        if self.processing.remove(id) {
            debug!(media_id = %id, result, "Own upload finished processing");
        }
    }

    async fn reconnect(&mut self) -> SessionEvent {
        if let Err(e) = self.connection.connect().await {
            warn!(error = %e, "Reconnect failed");
            return SessionEvent::Disconnected;
        }
        match self.resync().await {
            Ok(()) => SessionEvent::Resynced,
            Err(e) => {
                warn!(error = %e, "Resync after reconnect failed");
                SessionEvent::Disconnected
            }
        }
    }

    /// Show `request` as a placeholder and start sending it
    pub fn begin_upload(&mut self, transport: &UploadTransport, request: &mut UploadRequest) -> Result<UploadHandle> {
        let handle = transport.start(request)?;
        self.store.add_optimistic(request.optimistic_item());
        Ok(handle)
    }

    /// Fold the transfer's outcome into the request and the store.
    ///
    /// Any failure or cancellation removes the placeholder.
    pub fn complete_upload(&mut self, request: &mut UploadRequest, outcome: &UploadOutcome) -> Result<StoreChange> {
        request.resolve(outcome)?;

        let change = match outcome {
            UploadOutcome::Ready(item) => {
                let change = self.store.confirm_upload(item.clone());
                let processing = request.state() == &UploadState::Processing;
                match self.store.get(&item.id).map(|i| i.processing_state) {
                    Some(ProcessingState::Pending) => {
                        self.processing.insert(item.id.clone());
                    }
                    // media_processed overtook the response
                    Some(ProcessingState::Ready) if processing => {
                        let _ = request.mark_processed();
                    }
                    // media_failed or media_deleted overtook the response
                    None if processing => {
                        let _ = request.fail(UploadFailure::ServerRejected(
                            "removed before the upload was confirmed".to_string(),
                        ));
                    }
                    _ => {}
                }
                change
            }
            UploadOutcome::Failed(_) | UploadOutcome::Cancelled => self.store.discard_optimistic(&request.id),
        };
        Ok(change)
    }

    /// Number of own uploads waiting for server-side processing
    pub fn processing_count(&self) -> usize {
        self.processing.len()
    }

    pub async fn like(&mut self, media_id: &MediaId) -> Result<u64> {
        if !self.store.contains(media_id) {
            return Err(StoreError::UnknownMedia(media_id.clone()));
        }
        let like_count = self.api.like(self.event_id(), media_id, &self.viewer).await?;
        self.store.apply(RoomMessage::NewLike(NewLikePayload {
            id: media_id.clone(),
            like_count,
        }));
        Ok(like_count)
    }

    pub async fn comment(&mut self, media_id: &MediaId, text: &str) -> Result<Comment> {
        if !self.store.contains(media_id) {
            return Err(StoreError::UnknownMedia(media_id.clone()));
        }
        let comment = self.api.comment(self.event_id(), media_id, &self.viewer, text).await?;
        self.store.apply(RoomMessage::NewComment(NewCommentPayload {
            media_id: media_id.clone(),
            comment: comment.clone(),
        }));
        Ok(comment)
    }

    /// Delete an item; on success it leaves the store immediately
    pub async fn delete(&mut self, media_id: &MediaId) -> Result<()> {
        let item = self
            .store
            .get(media_id)
            .ok_or_else(|| StoreError::UnknownMedia(media_id.clone()))?;
        if !policy::can_delete(&self.viewer, item, self.store.event()) {
            return Err(StoreError::Forbidden(format!(
                "{} cannot delete {}",
                self.viewer.display_name(),
                media_id
            )));
        }

        self.api.delete_media(self.event_id(), media_id, &self.viewer).await?;
        self.store.remove(media_id);
        info!(media_id = %media_id, "Media deleted");
        Ok(())
    }

    pub async fn post_message(&mut self, message: &str) -> Result<GuestbookEntry> {
        let entry = self.api.post_message(self.event_id(), &self.viewer, message).await?;
        self.store.apply(RoomMessage::NewMessage(entry.clone()));
        Ok(entry)
    }

    /// Leave every room and close the connection
    pub async fn leave(mut self) -> Result<()> {
        let rooms: Vec<RoomKey> = self.connection.joined_rooms().cloned().collect();
        for room in &rooms {
            self.connection.leave_room(room).await?;
        }
        self.connection.disconnect().await?;
        info!(event_id = %self.event_id(), "Left event gallery");
        Ok(())
    }
}
