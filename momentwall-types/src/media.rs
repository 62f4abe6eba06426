//! Media identity and metadata model
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::actor::{TierName, UploaderIdentity};

/// Client-assigned media identifier.
///
/// Generated once at submission time and never reassigned; every merge in the
/// gallery store keys on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a new submission
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of the host-created event that scopes a media collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a MIME type; anything that is not an image or a video is rejected
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let major = content_type.split('/').next()?.trim().to_ascii_lowercase();
        match major.as_str() {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// `Pending` only ever applies to a video awaiting transcoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// One entry of a media item's append-only comment list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One uploaded asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub event_id: EventId,
    pub kind: MediaKind,
    /// Empty while a video is pending
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    pub processing_state: ProcessingState,
    #[serde(default)]
    pub caption: Option<String>,
    pub uploader_identity: UploaderIdentity,
    #[serde(default)]
    pub uploader_name: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub watermark_applied: bool,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

impl MediaItem {
    /// A ready item with a non-empty primary URL can be played or opened
    pub fn is_playable(&self) -> bool {
        self.processing_state == ProcessingState::Ready && !self.url.is_empty()
    }

    /// URL the viewer should load first
    pub fn display_url(&self) -> &str {
        self.preview_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.url)
    }

    /// Flip a pending item to ready. A missing `url` keeps the current one.
    pub fn apply_processed(&mut self, url: Option<&str>, preview_url: &str) {
        if let Some(url) = url {
            self.url = url.to_string();
        }
        self.preview_url = Some(preview_url.to_string());
        self.processing_state = ProcessingState::Ready;
    }

    /// Merge the server-confirmed copy of this item into the local one.
    ///
    /// Reapplying is harmless: a ready item never goes back to pending, the
    /// like counter never decreases and the longer comment list wins.
    pub fn merge_confirmed(&mut self, confirmed: MediaItem) {
        let keep_local_processing = self.processing_state == ProcessingState::Ready
            && confirmed.processing_state == ProcessingState::Pending;

        let like_count = self.like_count.max(confirmed.like_count);
        let comments = if self.comments.len() > confirmed.comments.len() {
            std::mem::take(&mut self.comments)
        } else {
            confirmed.comments
        };

        if !keep_local_processing {
            self.url = confirmed.url;
            self.preview_url = confirmed.preview_url;
            self.processing_state = confirmed.processing_state;
        }
        self.caption = confirmed.caption;
        self.uploader_identity = confirmed.uploader_identity;
        self.uploader_name = confirmed.uploader_name;
        self.visibility = confirmed.visibility;
        self.watermark_applied = confirmed.watermark_applied;
        self.created_at = confirmed.created_at;
        self.like_count = like_count;
        self.comments = comments;
    }
}

/// The host-created container that scopes a media collection and a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub id: EventId,
    pub host_id: String,
    pub host_tier: TierName,
    pub title: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EventInfo {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}
