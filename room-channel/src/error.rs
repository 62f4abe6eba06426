//! Error types for room channel operations

use thiserror::Error;

/// Errors that can occur while publishing to or following a room
#[derive(Error, Debug)]
pub enum RoomError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] momentwall_types::MomentwallError),

    #[error("Receiver lagged behind and skipped {0} events")]
    Lagged(u64),

    #[error("Not connected")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, RoomError>;
