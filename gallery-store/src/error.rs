//! Error types for the gallery store and session

use momentwall_types::MediaId;
use room_channel::RoomError;
use thiserror::Error;
use upload_client::TransitionError;

/// Errors from the gallery HTTP API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by a gallery session
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Gallery API error: {0}")]
    Api(#[from] ApiError),

    #[error("Room connection error: {0}")]
    Room(#[from] RoomError),

    #[error("Upload error: {0}")]
    Upload(#[from] TransitionError),

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Unknown media item: {0}")]
    UnknownMedia(MediaId),
}

pub type Result<T> = std::result::Result<T, StoreError>;
