//! NATS-backed room channel for relays running on several nodes
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


use async_nats::connection::State;
use async_trait::async_trait;
use momentwall_config::BroadcastConfig;
use momentwall_types::{RoomEvent, RoomKey};
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{debug, error, info};

use crate::error::{Result, RoomError};
use crate::traits::{RoomChannel, RoomStream};

/// Room channel over core NATS subjects.
///
/// Core NATS (not JetStream) matches the room semantics: a subscriber that is
/// not connected at publish time never sees the event.
pub struct NatsRoomChannel {
    client: Arc<async_nats::Client>,
    subject_prefix: String,
}

impl NatsRoomChannel {
    /// Connect to the NATS server at `url`
    pub async fn new(url: &str, subject_prefix: Option<String>) -> Result<Self> {
        info!(url = url, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| RoomError::Connection(e.to_string()))?;

        let subject_prefix = subject_prefix.unwrap_or_else(|| "momentwall".to_string());

        info!(subject_prefix = subject_prefix, "NATS room channel initialized");

        Ok(Self {
            client: Arc::new(client),
            subject_prefix,
        })
    }

    pub async fn from_config(config: &BroadcastConfig) -> Result<Self> {
        Self::new(&config.message_bus_url, Some(config.subject_prefix.clone())).await
    }

    /// Get the subject for a room
    fn subject_for_room(&self, room: &RoomKey) -> String {
        subject_for_room(&self.subject_prefix, room)
    }
}

/// `<prefix>.room.<key>` with NATS token separators and wildcards escaped
pub fn subject_for_room(prefix: &str, room: &RoomKey) -> String {
    let token: String = room
        .to_string()
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    format!("{}.room.{}", prefix, token)
}

#[async_trait]
impl RoomChannel for NatsRoomChannel {
    async fn publish(&self, event: &RoomEvent) -> Result<()> {
        let subject = self.subject_for_room(&event.room);
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| RoomError::Publish(e.to_string()))?;

        debug!(
            event_type = event.event_type.as_str(),
            event_id = %event.event_id,
            subject = subject,
            "Room event published"
        );

        Ok(())
    }

    fn subscribe(&self, room: &RoomKey) -> RoomStream {
        let subject = self.subject_for_room(room);

        info!(subject = subject, room = %room, "Subscribing to room");

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<RoomEvent>>(100);
        let client = Arc::clone(&self.client);

        // Spawn a task to handle the subscription
        tokio::spawn(async move {
            match client.subscribe(subject.clone()).await {
                Ok(mut subscriber) => {
                    while let Some(message) = subscriber.next().await {
                        let item = serde_json::from_slice::<RoomEvent>(&message.payload)
                            .map_err(RoomError::Serialization);
                        if let Err(e) = &item {
                            error!(error = %e, subject = subject, "Failed to deserialize room event");
                        }
                        if tx.send(item).await.is_err() {
                            debug!(subject = subject, "Room member left, stopping subscription");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to create subscription");
                    let _ = tx.send(Err(RoomError::Subscribe(e.to_string()))).await;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    fn channel_type(&self) -> &str {
        "nats"
    }
}
