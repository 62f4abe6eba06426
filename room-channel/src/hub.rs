//! In-process room hub
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


use async_trait::async_trait;
use momentwall_types::{RoomEvent, RoomKey};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

use crate::error::{Result, RoomError};
use crate::traits::{RoomChannel, RoomStream};

/// Room membership and fan-out for a single relay process.
///
/// Each room is a broadcast sender; every subscription is one receiver, so the
/// membership set is exactly the set of live receivers. A room is dropped
/// when its last member's stream is dropped.
#[derive(Clone)]
pub struct RoomHub {
    rooms: Arc<RwLock<Rooms>>,
    capacity: usize,
}

type Rooms = HashMap<RoomKey, broadcast::Sender<RoomEvent>>;

impl RoomHub {
    /// Create a hub buffering up to `capacity` events per room
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Room hub initialized");
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of connections currently joined to `room`
    pub fn member_count(&self, room: &RoomKey) -> usize {
        self.read_rooms()
            .get(room)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of rooms that still have a sender
    pub fn room_count(&self) -> usize {
        self.read_rooms().len()
    }

    /// Drop rooms nobody is joined to; returns how many went
    pub fn prune(&self) -> usize {
        let mut rooms = self.write_rooms();
        let before = rooms.len();
        rooms.retain(|_, tx| tx.receiver_count() > 0);
        before - rooms.len()
    }

    /// Fan out and report how many members received the event
    pub fn broadcast(&self, event: &RoomEvent) -> usize {
        let sender = self.read_rooms().get(&event.room).cloned();

        match sender {
            Some(tx) => match tx.send(event.clone()) {
                Ok(count) => {
                    debug!(
                        room = %event.room,
                        event_type = event.event_type.as_str(),
                        members = count,
                        "Event fanned out"
                    );
                    count
                }
                Err(_) => {
                    self.prune();
                    0
                }
            },
            None => {
                debug!(room = %event.room, "No members joined, event dropped");
                0
            }
        }
    }

    fn join(&self, room: &RoomKey) -> broadcast::Receiver<RoomEvent> {
        let mut rooms = self.write_rooms();
        let tx = rooms
            .entry(room.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let rx = tx.subscribe();
        debug!(room = %room, members = tx.receiver_count(), "Member joined room");
        rx
    }

    fn read_rooms(&self) -> RwLockReadGuard<'_, Rooms> {
        self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_rooms(&self) -> RwLockWriteGuard<'_, Rooms> {
        write_rooms(&self.rooms)
    }
}

fn write_rooms(rooms: &RwLock<Rooms>) -> RwLockWriteGuard<'_, Rooms> {
    rooms.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One member's view of a room; dropping it leaves the room
struct MemberStream {
    events: Option<Pin<Box<BroadcastStream<RoomEvent>>>>,
    room: RoomKey,
    rooms: Weak<RwLock<Rooms>>,
}

impl Stream for MemberStream {
    type Item = Result<RoomEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(events) = this.events.as_mut() else {
            return Poll::Ready(None);
        };
        match events.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                warn!(room = %this.room, skipped, "Room member lagged behind");
                Poll::Ready(Some(Err(RoomError::Lagged(skipped))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MemberStream {
    fn drop(&mut self) {
        // The receiver must go first so the count below no longer includes it
        drop(self.events.take());
        let Some(rooms) = self.rooms.upgrade() else {
            return;
        };
        let mut rooms = write_rooms(&rooms);
        let empty = rooms
            .get(&self.room)
            .map(|tx| tx.receiver_count() == 0)
            .unwrap_or(false);
        if empty {
            rooms.remove(&self.room);
            debug!(room = %self.room, "Last member left, room dropped");
        }
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RoomChannel for RoomHub {
    async fn publish(&self, event: &RoomEvent) -> Result<()> {
        self.broadcast(event);
        Ok(())
    }

    fn subscribe(&self, room: &RoomKey) -> RoomStream {
        let rx = self.join(room);
        Box::pin(MemberStream {
            events: Some(Box::pin(BroadcastStream::new(rx))),
            room: room.clone(),
            rooms: Arc::downgrade(&self.rooms),
        })
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn channel_type(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momentwall_types::{EventId, MediaId, NewLikePayload, RoomEventType};
    use tokio_stream::StreamExt;

    fn like_event(room: &RoomKey, count: u64) -> RoomEvent {
        RoomEvent::new(
            RoomEventType::NewLike,
            room.clone(),
            "test",
            NewLikePayload {
                id: MediaId::from("m1"),
                like_count: count,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_reaches_every_member() {
        let hub = RoomHub::new(16);
        let room = RoomKey::event(&EventId::from("E1"));

        let mut first = hub.subscribe(&room);
        let mut second = hub.subscribe(&room);
        assert_eq!(hub.member_count(&room), 2);

        hub.publish(&like_event(&room, 1)).await.unwrap();

        let a = first.next().await.unwrap().unwrap();
        let b = second.next().await.unwrap().unwrap();
        assert_eq!(a.event_id, b.event_id);
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = RoomHub::new(16);
        let e1 = RoomKey::event(&EventId::from("E1"));
        let e2 = RoomKey::event(&EventId::from("E2"));

        let mut in_e2 = hub.subscribe(&e2);
        hub.publish(&like_event(&e1, 1)).await.unwrap();
        hub.publish(&like_event(&e2, 2)).await.unwrap();

        let received = in_e2.next().await.unwrap().unwrap();
        assert_eq!(received.room, e2);
    }

    #[tokio::test]
    async fn test_publish_to_empty_room_is_not_an_error() {
        let hub = RoomHub::new(16);
        let room = RoomKey::event(&EventId::from("E1"));
        assert!(hub.publish(&like_event(&room, 1)).await.is_ok());
        assert_eq!(hub.broadcast(&like_event(&room, 2)), 0);
    }

    #[tokio::test]
    async fn test_leaving_drops_membership() {
        let hub = RoomHub::new(16);
        let room = RoomKey::event(&EventId::from("E1"));

        let stream = hub.subscribe(&room);
        assert_eq!(hub.member_count(&room), 1);
        drop(stream);

        assert_eq!(hub.member_count(&room), 0);
        assert_eq!(hub.room_count(), 0, "the last member takes the room with it");
        assert_eq!(hub.prune(), 0);
    }

    #[tokio::test]
    async fn test_room_survives_while_members_remain() {
        let hub = RoomHub::new(16);
        let room = RoomKey::event(&EventId::from("E1"));

        let first = hub.subscribe(&room);
        let mut second = hub.subscribe(&room);
        drop(first);
        assert_eq!(hub.room_count(), 1);
        assert_eq!(hub.member_count(&room), 1);

        hub.publish(&like_event(&room, 7)).await.unwrap();
        assert!(second.next().await.unwrap().is_ok());

        drop(second);
        assert_eq!(hub.room_count(), 0);

        // Rejoining recreates the room
        let _again = hub.subscribe(&room);
        assert_eq!(hub.member_count(&room), 1);
    }

    #[tokio::test]
    async fn test_lagging_member_is_told() {
        let hub = RoomHub::new(2);
        let room = RoomKey::event(&EventId::from("E1"));
        let mut slow = hub.subscribe(&room);

        for count in 0..5 {
            hub.publish(&like_event(&room, count)).await.unwrap();
        }

        assert!(matches!(slow.next().await, Some(Err(RoomError::Lagged(_)))));
    }
}
