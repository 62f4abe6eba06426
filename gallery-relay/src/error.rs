//! Relay error types and their HTTP mapping
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


use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Gallery relay error
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed request body, multipart form or metadata
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown actor headers
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Re-validation refused the operation
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Upload larger than the caller may send
    #[error("Too large: {0}")]
    TooLarge(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Media not found: {0}")]
    MediaNotFound(String),

    /// Image could not be decoded or encoded
    #[error("Media processing error: {0}")]
    Processing(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Broadcast error: {0}")]
    Broadcast(#[from] room_channel::RoomError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) | RelayError::Serialization(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RelayError::Rejected(_) => StatusCode::FORBIDDEN,
            RelayError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::EventNotFound(_) | RelayError::MediaNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Processing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RelayError::Storage(_) | RelayError::Broadcast(_) | RelayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) | RelayError::Serialization(_) => "invalid_request",
            RelayError::Unauthorized(_) => "unauthorized",
            RelayError::Rejected(_) => "server_rejected",
            RelayError::TooLarge(_) => "too_large",
            RelayError::EventNotFound(_) => "event_not_found",
            RelayError::MediaNotFound(_) => "media_not_found",
            RelayError::Processing(_) => "unprocessable_media",
            RelayError::Storage(_) | RelayError::Broadcast(_) | RelayError::Io(_) => "internal",
        }
    }

    fn reason(&self) -> String {
        match self {
            RelayError::InvalidRequest(r)
            | RelayError::Unauthorized(r)
            | RelayError::Rejected(r)
            | RelayError::TooLarge(r)
            | RelayError::Processing(r) => r.clone(),
            RelayError::EventNotFound(id) => format!("event {} does not exist", id),
            RelayError::MediaNotFound(id) => format!("media {} does not exist", id),
            // Internal details stay in the logs
            RelayError::Storage(_) | RelayError::Broadcast(_) | RelayError::Io(_) => {
                "internal error".to_string()
            }
            RelayError::Serialization(e) => e.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    reason: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = %status, "Request refused");
        }

        let body = ErrorBody {
            error: self.code(),
            reason: self.reason(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
