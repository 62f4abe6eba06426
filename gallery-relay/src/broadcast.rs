//! Best-effort publishing of room events from the relay

use momentwall_types::{EventId, RoomEvent, RoomKey, RoomMessage};
use room_channel::RoomChannel;
use std::sync::Arc;
use tracing::{debug, warn};

/// `source` stamped on every envelope the relay publishes
pub const SOURCE: &str = "gallery-relay";

/// Fire-and-forget fan-out. A failed publish is logged and otherwise
/// ignored; viewers recover by refetching.
#[derive(Clone)]
pub struct Broadcaster {
    channel: Arc<dyn RoomChannel>,
}

impl Broadcaster {
    pub fn new(channel: Arc<dyn RoomChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<dyn RoomChannel> {
        &self.channel
    }

    pub async fn to_event(&self, event_id: &EventId, message: &RoomMessage) {
        self.publish(RoomKey::event(event_id), message).await
    }

    pub async fn to_user(&self, user_id: &str, message: &RoomMessage) {
        self.publish(RoomKey::user(user_id), message).await
    }

    async fn publish(&self, room: RoomKey, message: &RoomMessage) {
        let event = match RoomEvent::from_message(room, SOURCE, message) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Could not encode room event");
                return;
            }
        };

        match self.channel.publish(&event).await {
            Ok(()) => debug!(
                room = %event.room,
                event_type = event.event_type.as_str(),
                "Room event published"
            ),
            Err(e) => warn!(
                room = %event.room,
                event_type = event.event_type.as_str(),
                error = %e,
                "Room event not delivered"
            ),
        }
    }
}
