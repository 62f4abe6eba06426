//! Gallery Relay
//!
//! Reference server for the moment wall: accepts uploads and re-validates
//! them, normalises images, transcodes videos in the background, and fans
//! state changes out to every viewer joined to an event room.

pub mod broadcast;
pub mod directory;
pub mod error;
pub mod fanout;
pub mod handoff;
pub mod processor;
pub mod repository;
pub mod routes;
pub mod state;
pub mod storage;
pub mod validation;
pub mod ws;

pub use broadcast::Broadcaster;
pub use directory::{Account, Directory, DirectorySeed};
pub use error::{RelayError, RelayResult};
pub use fanout::ViewerGate;
pub use handoff::ProcessingHandoff;
pub use processor::{detect_transcoder, FfmpegTranscoder, PassthroughTranscoder, TranscodedVideo, Transcoder};
pub use repository::{CreateOutcome, MediaPatch, MediaRepository};
pub use state::RelayState;
pub use storage::{BlobStore, LocalBlobStore, S3BlobStore};

use axum::Router;
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// The relay application; `media_dir` is served under `/media` when blobs live on local disk
pub fn app(state: RelayState, media_dir: Option<&Path>) -> Router {
    let router = routes::router(state);
    let router = match media_dir {
        Some(dir) => router.nest_service("/media", ServeDir::new(dir)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}
