//! Shared harness: an in-process relay on 127.0.0.1:0 plus client helpers
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use gallery_relay::{
    app, Account, Directory, DirectorySeed, LocalBlobStore, RelayResult, RelayState, TranscodedVideo, Transcoder,
};
use gallery_store::{GallerySession, HttpGalleryApi, SessionEvent};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use momentwall_config::UploadConfig;
use momentwall_types::{Actor, EventId, EventInfo, RoomKey, TierName, UserRole};
use room_channel::{RoomConnection, RoomHub, WsConnector};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use upload_client::{CaptionError, Captioner, HttpUploadBackend, UploadTransport};

pub const WAIT: Duration = Duration::from_secs(10);

/// Transcoder that takes a while and returns fixed renditions
pub struct StubTranscoder {
    pub delay: Duration,
}

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transcode(&self, source: Bytes, _content_type: &str) -> RelayResult<TranscodedVideo> {
        tokio::time::sleep(self.delay).await;
        Ok(TranscodedVideo {
            video: source,
            content_type: "video/mp4".to_string(),
            extension: "mp4".to_string(),
            poster: Bytes::from_static(b"poster frame"),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Captioner that always answers with the same sentence
pub struct FixedCaptioner(pub &'static str);

#[async_trait]
impl Captioner for FixedCaptioner {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn caption(&self, _image: &[u8], _content_type: &str) -> Result<String, CaptionError> {
        Ok(self.0.to_string())
    }
}

pub struct TestRelay {
    pub base_url: String,
    pub hub: Arc<RoomHub>,
    pub state: RelayState,
    _media_dir: TempDir,
}

pub fn host() -> Account {
    Account {
        id: "host-1".to_string(),
        display_name: "Host".to_string(),
        role: UserRole::Member,
        tier: TierName::Basic,
        storage_used_mb: 0.0,
    }
}

fn event(id: &str, host_tier: TierName) -> EventInfo {
    EventInfo {
        id: EventId::from(id),
        host_id: "host-1".to_string(),
        host_tier,
        title: format!("Event {}", id),
        expires_at: None,
    }
}

/// Start a relay with events E1, E2 (basic host) and FREE (free host)
pub async fn spawn_relay(transcode_delay: Duration) -> TestRelay {
    momentwall_logging::init_for_tests("warn");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let media_dir = tempfile::tempdir().unwrap();

    let directory = Directory::from_seed(DirectorySeed {
        accounts: vec![host()],
        events: vec![
            event("E1", TierName::Basic),
            event("E2", TierName::Basic),
            event("FREE", TierName::Free),
        ],
    })
    .await;

    let hub = Arc::new(RoomHub::new(64));
    let state = RelayState::new(
        Arc::new(directory),
        hub.clone(),
        Arc::new(LocalBlobStore::new(media_dir.path(), &base_url)),
        Arc::new(StubTranscoder {
            delay: transcode_delay,
        }),
        &UploadConfig::default(),
    );

    let router = app(state.clone(), Some(media_dir.path()));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    TestRelay {
        base_url,
        hub,
        state,
        _media_dir: media_dir,
    }
}

impl TestRelay {
    pub fn transport(&self) -> UploadTransport {
        UploadTransport::new(Arc::new(HttpUploadBackend::new(&self.base_url)), Duration::from_secs(30))
    }

    pub fn api(&self) -> HttpGalleryApi {
        HttpGalleryApi::new(&self.base_url)
    }

    /// Open a gallery session over a real WebSocket and wait until the relay
    /// has the membership in place
    pub async fn enter(&self, viewer: Actor, event_id: &str) -> GallerySession {
        let room = RoomKey::event(&EventId::from(event_id));
        let before = self.hub.member_count(&room);

        let connector = WsConnector::for_relay(&self.base_url).with_actor(&viewer);
        let connection = RoomConnection::new(Arc::new(connector));
        let session = GallerySession::enter(
            Arc::new(self.api()),
            connection,
            viewer,
            &EventId::from(event_id),
        )
        .await
        .unwrap();

        tokio::time::timeout(WAIT, async {
            while self.hub.member_count(&room) <= before {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay should register the room membership");
        session
    }
}

/// Next event from the session, failing the test if nothing arrives
pub async fn next_event(session: &mut GallerySession) -> SessionEvent {
    tokio::time::timeout(WAIT, session.next_event())
        .await
        .expect("session event should arrive")
        .expect("session still open")
}

/// A JPEG around `target_mb` in size, from pixel noise that does not compress well
pub fn noisy_jpeg(target_mb: f64) -> Bytes {
    let side = ((target_mb * 1024.0 * 1024.0 / 1.2).sqrt() as u32).max(16);
    let mut seed: u32 = 0x2545_f491;
    let image = RgbImage::from_fn(side, side, |_, _| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let [r, g, b, _] = seed.to_le_bytes();
        Rgb([r, g, b])
    });

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(out)
}
