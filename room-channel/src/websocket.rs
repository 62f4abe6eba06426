//! WebSocket link from a viewer to the relay

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use momentwall_types::{headers, Actor, RoomEvent, RoomKey};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{Result, RoomError};
use crate::protocol::ClientFrame;
use crate::traits::{LinkConnector, RoomLink};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket links to `ws(s)://<relay>/ws`
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    headers: Vec<(&'static str, String)>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Derive the socket URL from the relay's HTTP base URL
    pub fn for_relay(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let url = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}/ws", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}/ws", rest)
        } else {
            format!("{}/ws", base)
        };
        Self::new(url)
    }

    /// Identify the socket as `actor`; the relay filters what it forwards by it
    pub fn with_actor(mut self, actor: &Actor) -> Self {
        self.headers = headers::actor_headers(actor);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LinkConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn RoomLink>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RoomError::Connection(format!("{}: {}", self.url, e)))?;
        for (name, value) in &self.headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| RoomError::Connection(format!("header {}: {}", name, e)))?;
            request.headers_mut().insert(*name, value);
        }

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| RoomError::Connection(format!("{}: {}", self.url, e)))?;

        info!(url = self.url, "Connected to relay");
        Ok(Box::new(WsLink { socket }))
    }
}

pub struct WsLink {
    socket: Socket,
}

impl WsLink {
    async fn send_frame(&mut self, frame: &ClientFrame) -> Result<()> {
        let json = serde_json::to_string(frame)?;
        self.socket.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

#[async_trait]
impl RoomLink for WsLink {
    async fn join(&mut self, room: &RoomKey) -> Result<()> {
        self.send_frame(&ClientFrame::Join { room: room.clone() }).await
    }

    async fn leave(&mut self, room: &RoomKey) -> Result<()> {
        self.send_frame(&ClientFrame::Leave { room: room.clone() }).await
    }

    async fn next_event(&mut self) -> Option<Result<RoomEvent>> {
        while let Some(message) = self.socket.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str::<RoomEvent>(text.as_str()).map_err(RoomError::from));
                }
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Relay closed the socket");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "WebSocket read failed");
                    return None;
                }
            }
        }
        None
    }

    async fn close(&mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}
