//! Lifecycle-scoped room connection owned by an event view.
//!
//! A `RoomConnection` is created by whatever needs live updates and torn down
//! with it; there is no process-wide socket. It hides the link (in-process or
//! WebSocket), drops events for rooms it has left and turns transport gaps
//! into explicit resync signals.

use async_trait::async_trait;
use momentwall_types::{RoomEvent, RoomKey, RoomMessage};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};

use crate::error::{Result, RoomError};
use crate::traits::{LinkConnector, RoomChannel, RoomLink, RoomStream};

/// What a connected viewer sees
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A decoded event for a joined room
    Message { room: RoomKey, message: RoomMessage },
    /// Events may have been missed; refetch the full state of `room`
    Resync { room: Option<RoomKey> },
    /// The link went away; reconnect and refetch
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

pub struct RoomConnection {
    connector: Arc<dyn LinkConnector>,
    link: Option<Box<dyn RoomLink>>,
    rooms: HashSet<RoomKey>,
}

impl RoomConnection {
    pub fn new(connector: Arc<dyn LinkConnector>) -> Self {
        Self {
            connector,
            link: None,
            rooms: HashSet::new(),
        }
    }

    /// Connection over an in-process channel, used by tests and embedded viewers
    pub fn local(channel: Arc<dyn RoomChannel>) -> Self {
        Self::new(Arc::new(LocalConnector::new(channel)))
    }

    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomKey> {
        self.rooms.iter()
    }

    pub fn is_joined(&self, room: &RoomKey) -> bool {
        self.rooms.contains(room)
    }

    /// Open the link. Rooms joined before a drop are joined again.
    pub async fn connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }

        let mut link = self.connector.connect().await?;
        for room in &self.rooms {
            link.join(room).await?;
        }
        info!(rooms = self.rooms.len(), "Room connection established");
        self.link = Some(link);
        Ok(())
    }

    pub async fn join_room(&mut self, room: RoomKey) -> Result<()> {
        let link = self.link.as_mut().ok_or(RoomError::NotConnected)?;
        if self.rooms.contains(&room) {
            return Ok(());
        }
        link.join(&room).await?;
        debug!(room = %room, "Joined room");
        self.rooms.insert(room);
        Ok(())
    }

    pub async fn leave_room(&mut self, room: &RoomKey) -> Result<()> {
        if !self.rooms.remove(room) {
            return Ok(());
        }
        if let Some(link) = self.link.as_mut() {
            link.leave(room).await?;
        }
        debug!(room = %room, "Left room");
        Ok(())
    }

    /// Close the link and forget every membership
    pub async fn disconnect(&mut self) -> Result<()> {
        self.rooms.clear();
        if let Some(mut link) = self.link.take() {
            link.close().await?;
            info!("Room connection closed");
        }
        Ok(())
    }

    /// Wait for the next event. Returns `None` while disconnected.
    ///
    /// Malformed events and events for rooms already left are logged and
    /// skipped; they never reach the caller.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        loop {
            let link = self.link.as_mut()?;

            match link.next_event().await {
                Some(Ok(event)) => {
                    if let Some(message) = self.accept(event) {
                        return Some(message);
                    }
                }
                Some(Err(RoomError::Lagged(skipped))) => {
                    warn!(skipped, "Missed room events, requesting resync");
                    return Some(ConnectionEvent::Resync { room: None });
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Dropping undeliverable room event");
                }
                None => {
                    warn!("Room link closed");
                    self.link = None;
                    return Some(ConnectionEvent::Closed);
                }
            }
        }
    }

    fn accept(&self, event: RoomEvent) -> Option<ConnectionEvent> {
        if !self.rooms.contains(&event.room) {
            debug!(room = %event.room, "Ignoring event for a room not joined");
            return None;
        }

        match event.decode() {
            Ok(message) => Some(ConnectionEvent::Message {
                room: event.room,
                message,
            }),
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "Dropping malformed room event"
                );
                None
            }
        }
    }
}

/// Links straight into a `RoomChannel` in the same process
pub struct LocalConnector {
    channel: Arc<dyn RoomChannel>,
}

impl LocalConnector {
    pub fn new(channel: Arc<dyn RoomChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl LinkConnector for LocalConnector {
    async fn connect(&self) -> Result<Box<dyn RoomLink>> {
        Ok(Box::new(LocalLink {
            channel: Arc::clone(&self.channel),
            streams: StreamMap::new(),
            closed: false,
        }))
    }
}

pub struct LocalLink {
    channel: Arc<dyn RoomChannel>,
    streams: StreamMap<RoomKey, RoomStream>,
    closed: bool,
}

#[async_trait]
impl RoomLink for LocalLink {
    async fn join(&mut self, room: &RoomKey) -> Result<()> {
        if self.closed {
            return Err(RoomError::NotConnected);
        }
        if !self.streams.contains_key(room) {
            self.streams.insert(room.clone(), self.channel.subscribe(room));
        }
        Ok(())
    }

    async fn leave(&mut self, room: &RoomKey) -> Result<()> {
        self.streams.remove(room);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<RoomEvent>> {
        if self.closed {
            return None;
        }
        if self.streams.is_empty() {
            // Nothing joined: wait until the owner joins or drops the link
            return std::future::pending().await;
        }
        self.streams.next().await.map(|(_, item)| item)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.streams.clear();
        Ok(())
    }
}
