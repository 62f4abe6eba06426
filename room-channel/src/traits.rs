//! Traits for room fan-out and client links

use async_trait::async_trait;
use futures::Stream;
use momentwall_types::{RoomEvent, RoomKey};
use std::pin::Pin;

use crate::error::{Result, RoomError};

/// Stream of events delivered to one room membership
pub type RoomStream = Pin<Box<dyn Stream<Item = std::result::Result<RoomEvent, RoomError>> + Send>>;

/// Relay-side publish/subscribe scoped by room
#[async_trait]
pub trait RoomChannel: Send + Sync {
    /// Fan an event out to the members of `event.room`.
    /// Fire-and-forget: an empty room is not an error.
    async fn publish(&self, event: &RoomEvent) -> Result<()>;

    /// Become a member of `room`; dropping the stream leaves it
    fn subscribe(&self, room: &RoomKey) -> RoomStream;

    /// Check if the channel is connected
    async fn is_connected(&self) -> bool;

    /// Get the channel type name
    fn channel_type(&self) -> &str;
}

/// Client-side link to a room channel, local or remote
#[async_trait]
pub trait RoomLink: Send {
    async fn join(&mut self, room: &RoomKey) -> Result<()>;

    async fn leave(&mut self, room: &RoomKey) -> Result<()>;

    /// Next event for any joined room; `None` once the link is closed
    async fn next_event(&mut self) -> Option<Result<RoomEvent>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens links for a `RoomConnection`
#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RoomLink>>;
}
