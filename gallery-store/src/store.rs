//! Client reconciliation store
//!
//! One viewer's in-memory copy of an event's media. Three sources feed it: the
//! baseline fetch, the viewer's own optimistic uploads and room broadcasts. They
//! may overlap and arrive in any order; every mutation is keyed by media id, so
//! the collection never holds two entries with the same id and replaying an
//! event is never destructive.
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
    policy, Actor, Comment, EventInfo, GuestbookEntry, MediaId, MediaItem, RoomMessage,
};
use std::collections::HashSet;
use tracing::debug;

/// What applying one input did to the collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Inserted(MediaId),
    /// An optimistic placeholder was replaced by the server's copy
    Promoted(MediaId),
    Updated(MediaId),
    Removed(MediaId),
    GuestbookAppended(String),
    Ignored,
}

impl StoreChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, StoreChange::Ignored)
    }
}

pub struct GalleryStore {
    event: EventInfo,
    viewer: Actor,
    /// Server order, newest first
    items: Vec<MediaItem>,
    /// Ids held only as local placeholders
    optimistic: HashSet<MediaId>,
    guestbook: Vec<GuestbookEntry>,
}

impl GalleryStore {
    pub fn new(event: EventInfo, viewer: Actor) -> Self {
        Self {
            event,
            viewer,
            items: Vec::new(),
            optimistic: HashSet::new(),
            guestbook: Vec::new(),
        }
    }

    pub fn event(&self) -> &EventInfo {
        &self.event
    }

    pub fn viewer(&self) -> &Actor {
        &self.viewer
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn get(&self, id: &MediaId) -> Option<&MediaItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn contains(&self, id: &MediaId) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_optimistic(&self, id: &MediaId) -> bool {
        self.optimistic.contains(id)
    }

    pub fn guestbook(&self) -> &[GuestbookEntry] {
        &self.guestbook
    }

    /// Replace the collection with a full fetch.
    ///
    /// Server order is kept. Placeholders for uploads still in flight stay in
    /// front unless the fetch already contains them.
    pub fn load_baseline(&mut self, items: Vec<MediaItem>) {
        let mut seen = HashSet::new();
        let mut baseline: Vec<MediaItem> = items
            .into_iter()
            .filter(|item| self.admits(item) && seen.insert(item.id.clone()))
            .collect();

        let mut kept = Vec::new();
        for item in self.items.drain(..) {
            // A placeholder the server already knows is replaced by the fetched copy
            if self.optimistic.contains(&item.id) && !baseline.iter().any(|b| b.id == item.id) {
                kept.push(item);
            }
        }
        self.optimistic.retain(|id| kept.iter().any(|item| &item.id == id));

        kept.append(&mut baseline);
        self.items = kept;
        debug!(event_id = %self.event.id, items = self.items.len(), "Gallery baseline loaded");
    }

    pub fn load_guestbook(&mut self, entries: Vec<GuestbookEntry>) {
        self.guestbook.clear();
        for entry in entries {
            self.append_guestbook(entry);
        }
    }

    /// Show an own upload the moment its transfer starts
    pub fn add_optimistic(&mut self, item: MediaItem) -> StoreChange {
        if self.contains(&item.id) {
            return StoreChange::Ignored;
        }
        let id = item.id.clone();
        self.optimistic.insert(id.clone());
        self.items.insert(0, item);
        StoreChange::Inserted(id)
    }

    /// Merge the server's reply to an own upload.
    ///
    /// The reply never re-adds an entry: if `media_deleted` or `media_failed`
    /// already removed it, the late response is dropped.
    pub fn confirm_upload(&mut self, confirmed: MediaItem) -> StoreChange {
        let id = confirmed.id.clone();
        self.optimistic.remove(&id);
        match self.position(&id) {
            Some(index) => {
                self.items[index].merge_confirmed(confirmed);
                StoreChange::Updated(id)
            }
            None => {
                debug!(media_id = %id, "Upload confirmed after removal, ignored");
                StoreChange::Ignored
            }
        }
    }

    /// Drop a placeholder whose upload failed or was cancelled.
    ///
    /// An entry the server has already broadcast is real and stays.
    pub fn discard_optimistic(&mut self, id: &MediaId) -> StoreChange {
        if !self.optimistic.remove(id) {
            return StoreChange::Ignored;
        }
        self.remove(id)
    }

    /// Remove after a confirmed delete, without waiting for a broadcast
    pub fn remove(&mut self, id: &MediaId) -> StoreChange {
        self.optimistic.remove(id);
        match self.position(id) {
            Some(index) => {
                self.items.remove(index);
                StoreChange::Removed(id.clone())
            }
            None => StoreChange::Ignored,
        }
    }

    /// Apply one room broadcast
    pub fn apply(&mut self, message: RoomMessage) -> StoreChange {
        match message {
            RoomMessage::MediaUploaded(item) => self.on_uploaded(item),
            RoomMessage::MediaProcessed(payload) => self.update(&payload.id, |item| {
                item.apply_processed(payload.url.as_deref(), &payload.preview_url)
            }),
            RoomMessage::MediaFailed(payload) => {
                debug!(media_id = %payload.id, reason = payload.reason, "Media processing failed");
                self.remove(&payload.id)
            }
            RoomMessage::MediaDeleted(payload) => self.remove(&payload.id),
            RoomMessage::NewLike(payload) => {
                self.update(&payload.id, |item| item.like_count = payload.like_count)
            }
            RoomMessage::NewComment(payload) => {
                let comment = payload.comment;
                self.update(&payload.media_id, |item| push_comment(item, comment))
            }
            RoomMessage::NewMessage(entry) => {
                if entry.event_id != self.event.id {
                    return StoreChange::Ignored;
                }
                self.append_guestbook(entry)
            }
            RoomMessage::UserUpdated(_) => StoreChange::Ignored,
        }
    }

    fn on_uploaded(&mut self, item: MediaItem) -> StoreChange {
        if item.event_id != self.event.id || !self.admits(&item) {
            return StoreChange::Ignored;
        }

        match self.position(&item.id) {
            Some(index) if self.optimistic.remove(&item.id) => {
                let id = item.id.clone();
                self.items[index].merge_confirmed(item);
                StoreChange::Promoted(id)
            }
            Some(_) => StoreChange::Ignored,
            None => {
                let id = item.id.clone();
                self.items.insert(0, item);
                StoreChange::Inserted(id)
            }
        }
    }

    fn update<F>(&mut self, id: &MediaId, patch: F) -> StoreChange
    where
        F: FnOnce(&mut MediaItem),
    {
        match self.items.iter_mut().find(|item| &item.id == id) {
            Some(item) => {
                patch(item);
                StoreChange::Updated(id.clone())
            }
            None => {
                debug!(media_id = %id, "Update for unknown media ignored");
                StoreChange::Ignored
            }
        }
    }

    fn append_guestbook(&mut self, entry: GuestbookEntry) -> StoreChange {
        if self.guestbook.iter().any(|e| e.id == entry.id) {
            return StoreChange::Ignored;
        }
        let id = entry.id.clone();
        self.guestbook.push(entry);
        StoreChange::GuestbookAppended(id)
    }

    fn admits(&self, item: &MediaItem) -> bool {
        policy::can_view(&self.viewer, item, &self.event)
    }

    fn position(&self, id: &MediaId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }
}

/// Append unless the same comment is already there (a broadcast echo of a
/// locally applied comment)
fn push_comment(item: &mut MediaItem, comment: Comment) {
    if !item.comments.contains(&comment) {
        item.comments.push(comment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use momentwall_types::{
        EventId, MediaDeletedPayload, MediaFailedPayload, MediaKind, MediaProcessedPayload, NewCommentPayload,
        NewLikePayload, ProcessingState, TierName, UploaderIdentity, UserRole, Visibility,
    };

    fn event() -> EventInfo {
        EventInfo {
            id: EventId::from("E1"),
            host_id: "host-1".to_string(),
            host_tier: TierName::Pro,
            title: "Wedding".to_string(),
            expires_at: None,
        }
    }

    fn item(id: &str, state: ProcessingState) -> MediaItem {
        MediaItem {
            id: MediaId::from(id),
            event_id: EventId::from("E1"),
            kind: MediaKind::Image,
            url: if state == ProcessingState::Ready { format!("{}.jpg", id) } else { String::new() },
            preview_url: None,
            processing_state: state,
            caption: Some("caption".to_string()),
            uploader_identity: UploaderIdentity::from_raw("guest-Alex-1"),
            uploader_name: "Alex".to_string(),
            visibility: Visibility::Public,
            like_count: 0,
            watermark_applied: false,
            comments: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn store() -> GalleryStore {
        GalleryStore::new(event(), Actor::guest("Viewer"))
    }

    fn ids(store: &GalleryStore) -> Vec<&str> {
        store.items().iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_media_uploaded_twice_is_idempotent() {
        let mut store = store();
        let uploaded = RoomMessage::MediaUploaded(item("m1", ProcessingState::Ready));

        assert_eq!(store.apply(uploaded.clone()), StoreChange::Inserted(MediaId::from("m1")));
        let once: Vec<MediaItem> = store.items().to_vec();
        assert_eq!(store.apply(uploaded), StoreChange::Ignored);
        assert_eq!(store.items(), once.as_slice());
    }

    #[test]
    fn test_new_items_are_prepended() {
        let mut store = store();
        store.load_baseline(vec![item("b", ProcessingState::Ready), item("a", ProcessingState::Ready)]);
        store.apply(RoomMessage::MediaUploaded(item("c", ProcessingState::Ready)));
        assert_eq!(ids(&store), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_updates_for_unknown_ids_are_noops() {
        let mut store = store();
        store.load_baseline(vec![item("m1", ProcessingState::Ready)]);
        let before = store.items().to_vec();

        let ghost = MediaId::from("ghost");
        let updates = vec![
            RoomMessage::MediaProcessed(MediaProcessedPayload {
                id: ghost.clone(),
                preview_url: "thumb.jpg".to_string(),
                url: Some("video.mp4".to_string()),
            }),
            RoomMessage::NewLike(NewLikePayload {
                id: ghost.clone(),
                like_count: 3,
            }),
            RoomMessage::NewComment(NewCommentPayload {
                media_id: ghost,
                comment: Comment::new("Sam", "hi"),
            }),
        ];
        for update in updates {
            assert_eq!(store.apply(update), StoreChange::Ignored);
        }
        assert_eq!(store.items(), before.as_slice());
    }

    #[test]
    fn test_optimistic_collapse_broadcast_first() {
        let mut store = store();
        let local = item("m1", ProcessingState::Pending);
        store.add_optimistic(local);

        let mut server = item("m1", ProcessingState::Ready);
        server.url = "http://relay/media/m1.jpg".to_string();
        assert_eq!(
            store.apply(RoomMessage::MediaUploaded(server.clone())),
            StoreChange::Promoted(MediaId::from("m1"))
        );
        store.confirm_upload(server);

        assert_eq!(store.len(), 1);
        assert!(!store.is_optimistic(&MediaId::from("m1")));
        assert_eq!(store.items()[0].processing_state, ProcessingState::Ready);
    }

    #[test]
    fn test_optimistic_collapse_response_first() {
        let mut store = store();
        store.add_optimistic(item("m1", ProcessingState::Pending));

        let server = item("m1", ProcessingState::Ready);
        store.confirm_upload(server.clone());
        assert_eq!(store.apply(RoomMessage::MediaUploaded(server)), StoreChange::Ignored);

        assert_eq!(store.len(), 1);
        assert_eq!(store.items()[0].url, "m1.jpg");
    }

    #[test]
    fn test_processed_overtaking_response_is_kept() {
        let mut store = store();
        let mut local = item("v1", ProcessingState::Pending);
        local.kind = MediaKind::Video;
        store.add_optimistic(local.clone());

        store.apply(RoomMessage::MediaProcessed(MediaProcessedPayload {
            id: MediaId::from("v1"),
            preview_url: "thumb.jpg".to_string(),
            url: Some("video.mp4".to_string()),
        }));
        // The HTTP response still says pending
        store.confirm_upload(local);

        let merged = store.get(&MediaId::from("v1")).unwrap();
        assert!(merged.is_playable());
        assert_eq!(merged.url, "video.mp4");
    }

    #[test]
    fn test_late_confirm_does_not_resurrect_deleted_item() {
        let mut store = store();
        let local = item("m1", ProcessingState::Ready);
        store.add_optimistic(local.clone());
        store.apply(RoomMessage::MediaUploaded(local.clone()));
        store.apply(RoomMessage::MediaDeleted(MediaDeletedPayload {
            id: MediaId::from("m1"),
        }));

        assert_eq!(store.confirm_upload(local), StoreChange::Ignored);
        assert!(store.is_empty());
        assert!(!store.is_optimistic(&MediaId::from("m1")));
    }

    #[test]
    fn test_late_confirm_after_failed_transcode_is_dropped() {
        let mut store = store();
        let mut local = item("v1", ProcessingState::Pending);
        local.kind = MediaKind::Video;
        store.add_optimistic(local.clone());
        store.apply(RoomMessage::MediaFailed(MediaFailedPayload {
            id: MediaId::from("v1"),
            reason: "codec not supported".to_string(),
        }));

        assert_eq!(store.confirm_upload(local), StoreChange::Ignored);
        assert!(store.is_empty());
    }

    #[test]
    fn test_processed_updates_in_place() {
        let mut store = store();
        let mut video = item("m2", ProcessingState::Pending);
        video.kind = MediaKind::Video;
        video.like_count = 4;
        store.load_baseline(vec![item("m0", ProcessingState::Ready), video]);

        store.apply(RoomMessage::MediaProcessed(MediaProcessedPayload {
            id: MediaId::from("m2"),
            preview_url: "thumb.jpg".to_string(),
            url: Some("video.mp4".to_string()),
        }));

        assert_eq!(ids(&store), vec!["m0", "m2"]);
        let updated = &store.items()[1];
        assert!(updated.is_playable());
        assert_eq!(updated.display_url(), "thumb.jpg");
        assert_eq!(updated.like_count, 4);
        assert_eq!(updated.caption.as_deref(), Some("caption"));
    }

    #[test]
    fn test_failed_upload_removes_placeholder() {
        let mut store = store();
        store.add_optimistic(item("m1", ProcessingState::Pending));
        assert_eq!(store.discard_optimistic(&MediaId::from("m1")), StoreChange::Removed(MediaId::from("m1")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_discard_keeps_broadcast_item() {
        let mut store = store();
        store.add_optimistic(item("m1", ProcessingState::Pending));
        store.apply(RoomMessage::MediaUploaded(item("m1", ProcessingState::Ready)));

        // Client timed out after the server had already accepted it
        assert_eq!(store.discard_optimistic(&MediaId::from("m1")), StoreChange::Ignored);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_media_failed_broadcast_removes_item() {
        let mut store = store();
        store.load_baseline(vec![item("v1", ProcessingState::Pending)]);
        store.apply(RoomMessage::MediaFailed(MediaFailedPayload {
            id: MediaId::from("v1"),
            reason: "transcode failed".to_string(),
        }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_like_sets_server_count() {
        let mut store = store();
        store.load_baseline(vec![item("m1", ProcessingState::Ready)]);
        let like = RoomMessage::NewLike(NewLikePayload {
            id: MediaId::from("m1"),
            like_count: 7,
        });
        store.apply(like.clone());
        store.apply(like);
        assert_eq!(store.items()[0].like_count, 7);
    }

    #[test]
    fn test_comment_echo_is_not_duplicated() {
        let mut store = store();
        store.load_baseline(vec![item("m1", ProcessingState::Ready)]);
        let comment = RoomMessage::NewComment(NewCommentPayload {
            media_id: MediaId::from("m1"),
            comment: Comment::new("Sam", "Beautiful"),
        });
        store.apply(comment.clone());
        store.apply(comment);
        assert_eq!(store.items()[0].comments.len(), 1);
    }

    #[test]
    fn test_private_items_hidden_from_other_guests() {
        let mut store = store();
        let mut private = item("p1", ProcessingState::Ready);
        private.visibility = Visibility::Private;

        assert_eq!(store.apply(RoomMessage::MediaUploaded(private.clone())), StoreChange::Ignored);
        store.load_baseline(vec![private.clone()]);
        assert!(store.is_empty());

        let host = Actor::User {
            id: "host-1".to_string(),
            display_name: "Host".to_string(),
            role: UserRole::Member,
            tier: TierName::Pro,
            storage_used_mb: 0.0,
        };
        let mut host_store = GalleryStore::new(event(), host);
        host_store.apply(RoomMessage::MediaUploaded(private));
        assert_eq!(host_store.len(), 1);
    }

    #[test]
    fn test_baseline_dedupes_and_keeps_inflight_placeholders() {
        let mut store = store();
        store.add_optimistic(item("mine", ProcessingState::Pending));
        store.add_optimistic(item("known", ProcessingState::Pending));

        store.load_baseline(vec![
            item("known", ProcessingState::Ready),
            item("a", ProcessingState::Ready),
            item("a", ProcessingState::Ready),
        ]);

        assert_eq!(ids(&store), vec!["mine", "known", "a"]);
        assert!(store.is_optimistic(&MediaId::from("mine")));
        assert!(!store.is_optimistic(&MediaId::from("known")));
        assert!(store.items()[1].is_playable());
    }

    #[test]
    fn test_other_event_is_ignored() {
        let mut store = store();
        let mut foreign = item("x", ProcessingState::Ready);
        foreign.event_id = EventId::from("E9");
        assert_eq!(store.apply(RoomMessage::MediaUploaded(foreign)), StoreChange::Ignored);
    }
}
