//! In-memory media repository
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


use momentwall_types::{Comment, EventId, GuestbookEntry, MediaId, MediaItem, ProcessingState};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Partial update of a media record; `None` leaves a field as it is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPatch {
    pub url: Option<String>,
    pub preview_url: Option<String>,
    pub processing_state: Option<ProcessingState>,
}

impl MediaPatch {
    pub fn processed(url: Option<String>, preview_url: String) -> Self {
        Self {
            url,
            preview_url: Some(preview_url),
            processing_state: Some(ProcessingState::Ready),
        }
    }

    fn apply(&self, item: &mut MediaItem) {
        if let Some(url) = &self.url {
            item.url = url.clone();
        }
        if let Some(preview_url) = &self.preview_url {
            item.preview_url = Some(preview_url.clone());
        }
        if let Some(state) = self.processing_state {
            item.processing_state = state;
        }
    }
}

/// Result of `create`
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(MediaItem),
    /// A record with this id already exists; nothing was written
    Existing(MediaItem),
}

impl CreateOutcome {
    pub fn item(&self) -> &MediaItem {
        match self {
            CreateOutcome::Created(item) | CreateOutcome::Existing(item) => item,
        }
    }
}

#[derive(Default)]
struct Records {
    items: HashMap<MediaId, MediaItem>,
    /// Insertion order per event, oldest first
    order: HashMap<EventId, Vec<MediaId>>,
    /// Updates that arrived before their insert
    parked: HashMap<MediaId, Vec<MediaPatch>>,
    guestbook: HashMap<EventId, Vec<GuestbookEntry>>,
}

/// Media records keyed by id.
///
/// Every write takes the single lock, so writes for one id are linearizable.
#[derive(Default)]
pub struct MediaRepository {
    records: RwLock<Records>,
}

impl MediaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item` unless its id is already taken. Parked patches for the id
    /// are applied before the record becomes visible.
    pub async fn create(&self, mut item: MediaItem) -> CreateOutcome {
        let mut records = self.records.write().await;

        if let Some(existing) = records.items.get(&item.id) {
            debug!(media_id = %item.id, "Media already recorded, returning existing record");
            return CreateOutcome::Existing(existing.clone());
        }

        if let Some(patches) = records.parked.remove(&item.id) {
            debug!(media_id = %item.id, patches = patches.len(), "Applying parked updates");
            for patch in &patches {
                patch.apply(&mut item);
            }
        }

        records
            .order
            .entry(item.event_id.clone())
            .or_default()
            .push(item.id.clone());
        records.items.insert(item.id.clone(), item.clone());
        CreateOutcome::Created(item)
    }

    /// Apply `patch` to the record, or park it until the record is created.
    /// Returns the updated record when it exists.
    pub async fn update(&self, id: &MediaId, patch: MediaPatch) -> Option<MediaItem> {
        let mut records = self.records.write().await;
        match records.items.get_mut(id) {
            Some(item) => {
                patch.apply(item);
                Some(item.clone())
            }
            None => {
                debug!(media_id = %id, "Parking update for a record not yet created");
                records.parked.entry(id.clone()).or_default().push(patch);
                None
            }
        }
    }

    pub async fn delete(&self, id: &MediaId) -> Option<MediaItem> {
        let mut records = self.records.write().await;
        records.parked.remove(id);
        let item = records.items.remove(id)?;
        if let Some(order) = records.order.get_mut(&item.event_id) {
            order.retain(|existing| existing != id);
        }
        Some(item)
    }

    pub async fn get(&self, id: &MediaId) -> Option<MediaItem> {
        self.records.read().await.items.get(id).cloned()
    }

    /// Every record of the event, newest first
    pub async fn fetch_event_media(&self, event_id: &EventId) -> Vec<MediaItem> {
        let records = self.records.read().await;
        records
            .order
            .get(event_id)
            .map(|ids| {
                ids.iter()
                    .rev()
                    .filter_map(|id| records.items.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Unconditional increment; returns the count after it
    pub async fn like(&self, id: &MediaId) -> Option<u64> {
        let mut records = self.records.write().await;
        let item = records.items.get_mut(id)?;
        item.like_count += 1;
        Some(item.like_count)
    }

    pub async fn add_comment(&self, id: &MediaId, comment: Comment) -> Option<Comment> {
        let mut records = self.records.write().await;
        let item = records.items.get_mut(id)?;
        item.comments.push(comment.clone());
        Some(comment)
    }

    pub async fn append_message(&self, entry: GuestbookEntry) -> GuestbookEntry {
        let mut records = self.records.write().await;
        records
            .guestbook
            .entry(entry.event_id.clone())
            .or_default()
            .push(entry.clone());
        entry
    }

    /// Guestbook of the event, oldest first
    pub async fn guestbook(&self, event_id: &EventId) -> Vec<GuestbookEntry> {
        self.records
            .read()
            .await
            .guestbook
            .get(event_id)
            .cloned()
            .unwrap_or_default()
    }
}
