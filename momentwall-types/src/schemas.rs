//! Room event payload schemas
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

use crate::actor::TierName;
use crate::media::{Comment, EventId, MediaId};

// ============================================================================
// Media Payloads
// ============================================================================

// `media_uploaded` carries a full `MediaItem`.

/// Payload for `media_processed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProcessedPayload {
    pub id: MediaId,
    pub preview_url: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Payload for `media_failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFailedPayload {
    pub id: MediaId,
    pub reason: String,
}

/// Payload for `media_deleted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDeletedPayload {
    pub id: MediaId,
}

// ============================================================================
// Engagement Payloads
// ============================================================================

/// Payload for `new_like`; `like_count` is the authoritative post-increment value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLikePayload {
    pub id: MediaId,
    pub like_count: u64,
}

/// Payload for `new_comment`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommentPayload {
    pub media_id: MediaId,
    #[serde(flatten)]
    pub comment: Comment,
}

/// Payload for `new_message`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestbookEntry {
    pub id: String,
    pub event_id: EventId,
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// User Channel Payloads
// ============================================================================

/// Payload for `user_updated`; absent fields are unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdatedPayload {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub tier: Option<TierName>,
    #[serde(default)]
    pub storage_used_mb: Option<f64>,
}
