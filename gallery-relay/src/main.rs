//! Gallery relay service
//!
//! Serves the gallery HTTP API and the room WebSocket for viewers.
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


use anyhow::Context;
use gallery_relay::{app, detect_transcoder, BlobStore, Directory, LocalBlobStore, RelayState, S3BlobStore};
use momentwall_config::{AppConfig, BroadcastBackend};
use momentwall_logging::{LogFormat, LogSettings};
use room_channel::{NatsRoomChannel, RoomChannel, RoomHub};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    let format = match config.log_format.as_deref() {
        Some(raw) => raw.parse()?,
        None => LogFormat::default(),
    };
    momentwall_logging::try_init(&LogSettings::new("gallery-relay", config.log_level()).with_format(format))?;

    info!("Starting gallery relay");

    let channel: Arc<dyn RoomChannel> = match config.broadcast.backend {
        BroadcastBackend::Local => Arc::new(RoomHub::new(config.broadcast.room_capacity)),
        BroadcastBackend::Nats => Arc::new(
            NatsRoomChannel::from_config(&config.broadcast)
                .await
                .context("Failed to connect to message bus")?,
        ),
    };
    info!(backend = channel.channel_type(), "Broadcast channel ready");

    let (blobs, media_dir): (Arc<dyn BlobStore>, Option<PathBuf>) = match &config.object_storage {
        Some(storage) => (
            Arc::new(S3BlobStore::new(storage).context("Failed to initialize object storage")?),
            None,
        ),
        None => {
            let dir = config.relay.media_dir.clone();
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create media directory {}", dir.display()))?;
            info!(media_dir = %dir.display(), "Storing media on local disk");
            (
                Arc::new(LocalBlobStore::new(dir.clone(), &config.relay.public_url)),
                Some(dir),
            )
        }
    };

    let directory = match &config.relay.directory_seed {
        Some(path) => Directory::load(path)
            .await
            .with_context(|| format!("Failed to load directory seed {}", path.display()))?,
        None => {
            warn!("No directory seed configured, starting with an empty directory");
            Directory::new()
        }
    };

    let transcoder = detect_transcoder().await;
    let state = RelayState::new(Arc::new(directory), channel, blobs, transcoder, &config.upload);

    let listener = TcpListener::bind(&config.relay.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.relay.bind_addr))?;
    info!(addr = config.relay.bind_addr, public_url = config.relay.public_url, "Relay listening");

    axum::serve(listener, app(state, media_dir.as_deref()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Relay server failed")?;

    info!("Gallery relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal (Ctrl+C) received");
        },
        _ = terminate => {
            info!("Shutdown signal (SIGTERM) received");
        },
    }
}
