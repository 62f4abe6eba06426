//! Actors, uploader identities and service tiers
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

const GUEST_PREFIX: &str = "guest-";

/// Ownership attribute of a media item: an account id or a synthesized guest id.
///
/// Used to authorize later edits and deletes, never to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploaderIdentity(String);

impl UploaderIdentity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self(user_id.into())
    }

    /// `guest-<name>-<millis>`
    pub fn guest(display_name: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{}{}-{}", GUEST_PREFIX, display_name.trim(), at.timestamp_millis()))
    }

    /// Reconstruct an identity previously handed out to a guest
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_guest(&self) -> bool {
        self.0.starts_with(GUEST_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploaderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    Member,
    Photographer,
    Admin,
}

/// Named service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    #[default]
    Free,
    Basic,
    Pro,
    Studio,
}

/// Capabilities granted by a tier that affect upload legality
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub storage_limit_mb: f64,
    pub allow_video: bool,
    pub allow_watermark: bool,
    pub allow_branding: bool,
    pub event_lifetime_days: u32,
}

impl TierConfig {
    pub fn for_tier(tier: TierName) -> Self {
        match tier {
            TierName::Free => Self {
                storage_limit_mb: 100.0,
                allow_video: false,
                allow_watermark: false,
                allow_branding: false,
                event_lifetime_days: 7,
            },
            TierName::Basic => Self {
                storage_limit_mb: 1_000.0,
                allow_video: true,
                allow_watermark: false,
                allow_branding: false,
                event_lifetime_days: 30,
            },
            TierName::Pro => Self {
                storage_limit_mb: 10_000.0,
                allow_video: true,
                allow_watermark: true,
                allow_branding: false,
                event_lifetime_days: 90,
            },
            TierName::Studio => Self {
                storage_limit_mb: 50_000.0,
                allow_video: true,
                allow_watermark: true,
                allow_branding: true,
                event_lifetime_days: 365,
            },
        }
    }
}

/// Whoever performs an action against an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    User {
        id: String,
        display_name: String,
        #[serde(default)]
        role: UserRole,
        #[serde(default)]
        tier: TierName,
        #[serde(default)]
        storage_used_mb: f64,
    },
    Guest {
        identity: UploaderIdentity,
        display_name: String,
    },
}

impl Actor {
    /// A guest joining with a self-chosen display name
    pub fn guest(display_name: &str) -> Self {
        Actor::Guest {
            identity: UploaderIdentity::guest(display_name, Utc::now()),
            display_name: display_name.trim().to_string(),
        }
    }

    pub fn identity(&self) -> UploaderIdentity {
        match self {
            Actor::User { id, .. } => UploaderIdentity::user(id.clone()),
            Actor::Guest { identity, .. } => identity.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Actor::User { display_name, .. } | Actor::Guest { display_name, .. } => display_name,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Actor::User { id, .. } => Some(id),
            Actor::Guest { .. } => None,
        }
    }

    pub fn role(&self) -> Option<UserRole> {
        match self {
            Actor::User { role, .. } => Some(*role),
            Actor::Guest { .. } => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(UserRole::Admin)
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Actor::Guest { .. })
    }
}
