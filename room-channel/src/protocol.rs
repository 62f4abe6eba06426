//! WebSocket frames sent by clients to the relay

use momentwall_types::RoomKey;
use serde::{Deserialize, Serialize};

/// Connection lifecycle request; server frames are plain `RoomEvent` JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    Join { room: RoomKey },
    Leave { room: RoomKey },
}

impl ClientFrame {
    pub fn room(&self) -> &RoomKey {
        match self {
            ClientFrame::Join { room } | ClientFrame::Leave { room } => room,
        }
    }
}
