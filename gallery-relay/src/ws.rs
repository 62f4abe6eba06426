//! WebSocket endpoint: one socket per viewer, any number of joined rooms
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


use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use momentwall_types::RoomKey;
use room_channel::{ClientFrame, RoomChannel, RoomError, RoomStream};
use std::sync::Arc;
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fanout::ViewerGate;
use crate::state::RelayState;

/// Upgrade after resolving who is connecting; an unknown user is refused
pub async fn handler(ws: WebSocketUpgrade, State(state): State<RelayState>, headers: HeaderMap) -> Response {
    let viewer = match state.directory.resolve_actor(&headers).await {
        Ok(viewer) => viewer,
        Err(e) => return e.into_response(),
    };
    let gate = ViewerGate::new(viewer, Arc::clone(&state.directory), Arc::clone(&state.repository));
    let channel = Arc::clone(state.broadcaster.channel());
    ws.on_upgrade(move |socket| serve_socket(socket, channel, gate))
}

/// Pump client frames into room memberships and room events out to the socket.
///
/// Leaving a room drops its subscription, so membership is exactly the set of
/// live streams. Every frame passes the viewer's gate before it is sent. A
/// lagging member is disconnected; it reconnects and refetches.
async fn serve_socket(socket: WebSocket, channel: Arc<dyn RoomChannel>, gate: ViewerGate) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut rooms: StreamMap<RoomKey, RoomStream> = StreamMap::new();

    info!(
        connection_id = %connection_id,
        authenticated = gate.viewer().is_some(),
        "Viewer connected"
    );

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Join { room }) => {
                        if !gate.may_join(&room) {
                            warn!(connection_id = %connection_id, room = %room, "Refused join to another user's room");
                        } else if !rooms.contains_key(&room) {
                            debug!(connection_id = %connection_id, room = %room, "Joined room");
                            let stream = channel.subscribe(&room);
                            rooms.insert(room, stream);
                        }
                    }
                    Ok(ClientFrame::Leave { room }) => {
                        if rooms.remove(&room).is_some() {
                            debug!(connection_id = %connection_id, room = %room, "Left room");
                        }
                    }
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "Ignoring malformed client frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id = %connection_id, error = %e, "Socket read failed");
                    break;
                }
            },
            Some((room, item)) = rooms.next(), if !rooms.is_empty() => match item {
                Ok(event) => {
                    if !gate.admits(&event).await {
                        continue;
                    }
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "Could not encode room event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RoomError::Lagged(skipped)) => {
                    warn!(connection_id = %connection_id, room = %room, skipped, "Viewer lagged, closing socket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, room = %room, error = %e, "Dropping undeliverable event");
                }
            },
        }
    }

    info!(connection_id = %connection_id, rooms = rooms.len(), "Viewer disconnected");
}
