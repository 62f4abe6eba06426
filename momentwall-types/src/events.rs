//! Room event envelope and typed decoding

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{MomentwallError, Result};
use crate::media::{EventId, MediaId, MediaItem};
use crate::schemas::*;

/// Broadcast scope: one room per event, plus one private channel per user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoomKey {
    Event(EventId),
    User(String),
}

impl RoomKey {
    pub fn event(event_id: &EventId) -> Self {
        RoomKey::Event(event_id.clone())
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        RoomKey::User(user_id.into())
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Event(id) => write!(f, "event:{}", id),
            RoomKey::User(id) => write!(f, "user:{}", id),
        }
    }
}

impl FromStr for RoomKey {
    type Err = MomentwallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("event", id)) if !id.is_empty() => Ok(RoomKey::Event(EventId::new(id))),
            Some(("user", id)) if !id.is_empty() => Ok(RoomKey::User(id.to_string())),
            _ => Err(MomentwallError::InvalidRoomKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for RoomKey {
    type Error = MomentwallError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RoomKey> for String {
    fn from(key: RoomKey) -> Self {
        key.to_string()
    }
}

/// Event names on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomEventType {
    MediaUploaded,
    MediaProcessed,
    MediaFailed,
    MediaDeleted,
    NewLike,
    NewComment,
    NewMessage,
    UserUpdated,
}

impl RoomEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomEventType::MediaUploaded => "media_uploaded",
            RoomEventType::MediaProcessed => "media_processed",
            RoomEventType::MediaFailed => "media_failed",
            RoomEventType::MediaDeleted => "media_deleted",
            RoomEventType::NewLike => "new_like",
            RoomEventType::NewComment => "new_comment",
            RoomEventType::NewMessage => "new_message",
            RoomEventType::UserUpdated => "user_updated",
        }
    }
}

/// Envelope fanned out to every member of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    pub event_type: RoomEventType,

    /// Delivery identifier, distinct from any media id
    pub event_id: Uuid,

    pub room: RoomKey,

    pub timestamp: DateTime<Utc>,

    /// Service that published the event
    pub source: String,

    pub payload: serde_json::Value,
}

impl RoomEvent {
    pub fn new(
        event_type: RoomEventType,
        room: RoomKey,
        source: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self> {
        let payload = serde_json::to_value(payload)?;

        Ok(Self {
            event_type,
            event_id: Uuid::new_v4(),
            room,
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        })
    }

    /// Build the envelope for an already-typed message
    pub fn from_message(room: RoomKey, source: impl Into<String>, message: &RoomMessage) -> Result<Self> {
        let source = source.into();
        match message {
            RoomMessage::MediaUploaded(item) => Self::new(RoomEventType::MediaUploaded, room, source, item),
            RoomMessage::MediaProcessed(p) => Self::new(RoomEventType::MediaProcessed, room, source, p),
            RoomMessage::MediaFailed(p) => Self::new(RoomEventType::MediaFailed, room, source, p),
            RoomMessage::MediaDeleted(p) => Self::new(RoomEventType::MediaDeleted, room, source, p),
            RoomMessage::NewLike(p) => Self::new(RoomEventType::NewLike, room, source, p),
            RoomMessage::NewComment(p) => Self::new(RoomEventType::NewComment, room, source, p),
            RoomMessage::NewMessage(p) => Self::new(RoomEventType::NewMessage, room, source, p),
            RoomMessage::UserUpdated(p) => Self::new(RoomEventType::UserUpdated, room, source, p),
        }
    }

    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| MomentwallError::InvalidPayload(e.to_string()))
    }

    /// Decode the payload according to `event_type`
    pub fn decode(&self) -> Result<RoomMessage> {
        let message = match self.event_type {
            RoomEventType::MediaUploaded => RoomMessage::MediaUploaded(self.payload_as()?),
            RoomEventType::MediaProcessed => RoomMessage::MediaProcessed(self.payload_as()?),
            RoomEventType::MediaFailed => RoomMessage::MediaFailed(self.payload_as()?),
            RoomEventType::MediaDeleted => RoomMessage::MediaDeleted(self.payload_as()?),
            RoomEventType::NewLike => RoomMessage::NewLike(self.payload_as()?),
            RoomEventType::NewComment => RoomMessage::NewComment(self.payload_as()?),
            RoomEventType::NewMessage => RoomMessage::NewMessage(self.payload_as()?),
            RoomEventType::UserUpdated => RoomMessage::UserUpdated(self.payload_as()?),
        };
        Ok(message)
    }

    /// `user_updated` belongs on a user channel, everything else on an event room
    pub fn validate(&self) -> Result<()> {
        let user_scoped = self.event_type == RoomEventType::UserUpdated;
        match (&self.room, user_scoped) {
            (RoomKey::User(_), true) | (RoomKey::Event(_), false) => {}
            _ => {
                return Err(MomentwallError::Validation(format!(
                    "{} cannot be delivered to {}",
                    self.event_type.as_str(),
                    self.room
                )))
            }
        }
        self.decode().map(|_| ())
    }
}

/// Typed view of a room event
#[derive(Debug, Clone, PartialEq)]
pub enum RoomMessage {
    MediaUploaded(MediaItem),
    MediaProcessed(MediaProcessedPayload),
    MediaFailed(MediaFailedPayload),
    MediaDeleted(MediaDeletedPayload),
    NewLike(NewLikePayload),
    NewComment(NewCommentPayload),
    NewMessage(GuestbookEntry),
    UserUpdated(UserUpdatedPayload),
}

impl RoomMessage {
    /// The media item this message refers to, if any
    pub fn media_id(&self) -> Option<&MediaId> {
        match self {
            RoomMessage::MediaUploaded(item) => Some(&item.id),
            RoomMessage::MediaProcessed(p) => Some(&p.id),
            RoomMessage::MediaFailed(p) => Some(&p.id),
            RoomMessage::MediaDeleted(p) => Some(&p.id),
            RoomMessage::NewLike(p) => Some(&p.id),
            RoomMessage::NewComment(p) => Some(&p.media_id),
            RoomMessage::NewMessage(_) | RoomMessage::UserUpdated(_) => None,
        }
    }
}
