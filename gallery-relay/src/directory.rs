//! Accounts and events known to the relay.
//!
//! The relay is its own authorization collaborator: tiers, roles and storage
//! usage come from here, never from what a client claims about itself.

use chrono::{Duration, Utc};
use momentwall_types::{
    headers, Actor, EventId, EventInfo, TierConfig, TierName, UploaderIdentity, UserRole, UserUpdatedPayload,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub tier: TierName,
    #[serde(default)]
    pub storage_used_mb: f64,
}

impl Account {
    pub fn actor(&self) -> Actor {
        Actor::User {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            tier: self.tier,
            storage_used_mb: self.storage_used_mb,
        }
    }
}

/// Contents of the `RELAY_DIRECTORY_FILE` seed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub events: Vec<EventInfo>,
}

#[derive(Debug, Default)]
pub struct Directory {
    accounts: RwLock<HashMap<String, Account>>,
    events: RwLock<HashMap<EventId, EventInfo>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for account in seed.accounts {
            directory.register_account(account).await;
        }
        for event in seed.events {
            directory.register_event(event).await;
        }
        directory
    }

    pub async fn load(path: &Path) -> RelayResult<Self> {
        let raw = tokio::fs::read(path).await?;
        let seed: DirectorySeed = serde_json::from_slice(&raw)?;
        info!(
            path = %path.display(),
            accounts = seed.accounts.len(),
            events = seed.events.len(),
            "Directory seed loaded"
        );
        Ok(Self::from_seed(seed).await)
    }

    pub async fn register_account(&self, account: Account) {
        debug!(user_id = account.id, tier = ?account.tier, "Account registered");
        self.accounts.write().await.insert(account.id.clone(), account);
    }

    pub async fn register_event(&self, event: EventInfo) {
        debug!(event_id = %event.id, host_id = event.host_id, "Event registered");
        self.events.write().await.insert(event.id.clone(), event);
    }

    pub async fn account(&self, user_id: &str) -> Option<Account> {
        self.accounts.read().await.get(user_id).cloned()
    }

    pub async fn event(&self, event_id: &EventId) -> RelayResult<EventInfo> {
        self.events
            .read()
            .await
            .get(event_id)
            .cloned()
            .ok_or_else(|| RelayError::EventNotFound(event_id.to_string()))
    }

    /// Create an event hosted by `host` under the host's own tier
    pub async fn host_event(&self, host: &Account, title: &str) -> EventInfo {
        let lifetime = TierConfig::for_tier(host.tier).event_lifetime_days;
        let event = EventInfo {
            id: EventId::new(Uuid::new_v4().to_string()),
            host_id: host.id.clone(),
            host_tier: host.tier,
            title: title.trim().to_string(),
            expires_at: Some(Utc::now() + Duration::days(i64::from(lifetime))),
        };
        self.register_event(event.clone()).await;
        info!(event_id = %event.id, host_id = host.id, "Event created");
        event
    }

    /// Resolve the acting identity from request headers.
    ///
    /// No headers means an anonymous viewer. A user id the directory does not
    /// know is refused; a guest is taken at its word since it owns nothing
    /// beyond the items it uploads.
    pub async fn resolve_actor(&self, headers: &axum::http::HeaderMap) -> RelayResult<Option<Actor>> {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(user_id) = value(headers::USER_ID) {
            let account = self
                .account(&user_id)
                .await
                .ok_or_else(|| RelayError::Unauthorized(format!("unknown user {}", user_id)))?;
            return Ok(Some(account.actor()));
        }

        match (value(headers::GUEST_IDENTITY), value(headers::GUEST_NAME)) {
            (Some(identity), Some(display_name)) => {
                let identity = UploaderIdentity::from_raw(identity);
                if !identity.is_guest() {
                    return Err(RelayError::Unauthorized(
                        "guest identity must start with guest-".to_string(),
                    ));
                }
                Ok(Some(Actor::Guest {
                    identity,
                    display_name,
                }))
            }
            (None, None) => Ok(None),
            _ => Err(RelayError::Unauthorized(
                "guest identity and name must be sent together".to_string(),
            )),
        }
    }

    /// Account a finished upload against its user; returns the `user_updated` payload
    pub async fn add_storage(&self, user_id: &str, size_mb: f64) -> Option<UserUpdatedPayload> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(user_id)?;
        account.storage_used_mb += size_mb;

        debug!(
            user_id = user_id,
            storage_used_mb = account.storage_used_mb,
            "Storage usage updated"
        );

        Some(UserUpdatedPayload {
            user_id: account.id.clone(),
            display_name: None,
            tier: None,
            storage_used_mb: Some(account.storage_used_mb),
        })
    }
}
