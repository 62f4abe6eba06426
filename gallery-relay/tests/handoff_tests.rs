//! Upload handoff behaviour against an in-process room hub and a temp media dir

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use gallery_relay::{
    Account, Broadcaster, Directory, LocalBlobStore, MediaRepository, ProcessingHandoff, RelayError, RelayResult,
    TranscodedVideo, Transcoder, ViewerGate,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use momentwall_types::{
    Actor, EventId, EventInfo, MediaDeletedPayload, MediaId, MediaKind, NewLikePayload, ProcessingState, RoomEvent,
    RoomKey, RoomMessage, TierName, UserRole, Visibility,
};
use room_channel::{RoomChannel, RoomHub, RoomStream};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use upload_client::UploadMetadata;

struct StubTranscoder;

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn transcode(&self, source: Bytes, _content_type: &str) -> RelayResult<TranscodedVideo> {
        Ok(TranscodedVideo {
            video: source,
            content_type: "video/mp4".to_string(),
            extension: "mp4".to_string(),
            poster: Bytes::from_static(b"poster"),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

struct BrokenTranscoder;

#[async_trait]
impl Transcoder for BrokenTranscoder {
    async fn transcode(&self, _source: Bytes, _content_type: &str) -> RelayResult<TranscodedVideo> {
        Err(RelayError::Processing("codec not supported".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

struct Fixture {
    hub: Arc<RoomHub>,
    directory: Arc<Directory>,
    repository: Arc<MediaRepository>,
    handoff: ProcessingHandoff,
    media_dir: TempDir,
}

async fn fixture(transcoder: Arc<dyn Transcoder>) -> Fixture {
    let hub = Arc::new(RoomHub::new(32));
    let directory = Arc::new(Directory::new());
    directory
        .register_account(Account {
            id: "host-1".to_string(),
            display_name: "Host".to_string(),
            role: UserRole::Member,
            tier: TierName::Basic,
            storage_used_mb: 0.0,
        })
        .await;
    for (id, tier) in [("E1", TierName::Basic), ("FREE", TierName::Free)] {
        directory
            .register_event(EventInfo {
                id: EventId::from(id),
                host_id: "host-1".to_string(),
                host_tier: tier,
                title: id.to_string(),
                expires_at: None,
            })
            .await;
    }

    let media_dir = tempfile::tempdir().unwrap();
    let repository = Arc::new(MediaRepository::new());
    let handoff = ProcessingHandoff::new(
        Arc::clone(&directory),
        Arc::clone(&repository),
        Arc::new(LocalBlobStore::new(media_dir.path(), "http://relay.test")),
        transcoder,
        Broadcaster::new(hub.clone() as Arc<dyn RoomChannel>),
        50.0,
    );

    Fixture {
        hub,
        directory,
        repository,
        handoff,
        media_dir,
    }
}

fn jpeg() -> Bytes {
    let image = RgbImage::from_pixel(64, 48, Rgb([240, 120, 40]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(out)
}

fn metadata(id: &str, event: &str, actor: &Actor, content_type: &str, size: usize) -> UploadMetadata {
    UploadMetadata {
        id: MediaId::from(id),
        event_id: EventId::from(event),
        kind: MediaKind::from_content_type(content_type).unwrap(),
        caption: Some("  Sunset moment ".to_string()),
        visibility: Visibility::Public,
        uploader_identity: actor.identity(),
        uploader_name: actor.display_name().to_string(),
        watermark_applied: false,
        file_name: "upload".to_string(),
        content_type: content_type.to_string(),
        size_bytes: size as u64,
    }
}

async fn next(stream: &mut RoomStream) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("event should arrive")
        .expect("stream open")
        .expect("event decodes")
}

#[tokio::test]
async fn test_image_is_ready_and_announced() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let mut room = f.hub.subscribe(&RoomKey::event(&EventId::from("E1")));
    let guest = Actor::guest("Alex");
    let file = jpeg();

    let item = f
        .handoff
        .submit(&guest, metadata("m1", "E1", &guest, "image/jpeg", file.len()), file)
        .await
        .unwrap();

    assert_eq!(item.processing_state, ProcessingState::Ready);
    assert_eq!(item.caption.as_deref(), Some("Sunset moment"));
    assert_eq!(item.url, "http://relay.test/media/events/E1/m1/full.jpg");
    assert_eq!(
        item.preview_url.as_deref(),
        Some("http://relay.test/media/events/E1/m1/preview.jpg")
    );
    assert!(f.media_dir.path().join("events/E1/m1/full.jpg").exists());

    match next(&mut room).await.decode().unwrap() {
        RoomMessage::MediaUploaded(announced) => assert_eq!(announced, item),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_replay_returns_existing_record() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let guest = Actor::guest("Alex");
    let file = jpeg();

    let first = f
        .handoff
        .submit(&guest, metadata("m1", "E1", &guest, "image/jpeg", file.len()), file.clone())
        .await
        .unwrap();
    let mut room = f.hub.subscribe(&RoomKey::event(&EventId::from("E1")));
    let replay = f
        .handoff
        .submit(&guest, metadata("m1", "E1", &guest, "image/jpeg", file.len()), file.clone())
        .await
        .unwrap();

    assert_eq!(first, replay);
    assert_eq!(f.repository.fetch_event_media(&EventId::from("E1")).await.len(), 1);
    let silent = tokio::time::timeout(Duration::from_millis(100), room.next()).await;
    assert!(silent.is_err(), "a replay is not announced again");

    let other = Actor::guest("Sam");
    let stolen = f
        .handoff
        .submit(&other, metadata("m1", "E1", &other, "image/jpeg", file.len()), file)
        .await;
    assert!(matches!(stolen, Err(RelayError::Rejected(_))));
}

#[tokio::test]
async fn test_video_is_pending_then_processed() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let mut room = f.hub.subscribe(&RoomKey::event(&EventId::from("E1")));
    let guest = Actor::guest("Alex");
    let file = Bytes::from_static(b"\x00\x00\x00\x18ftypmp42 not really a movie");

    let item = f
        .handoff
        .submit(&guest, metadata("m2", "E1", &guest, "video/mp4", file.len()), file)
        .await
        .unwrap();
    assert_eq!(item.processing_state, ProcessingState::Pending);
    assert_eq!(item.url, "");

    assert!(matches!(
        next(&mut room).await.decode().unwrap(),
        RoomMessage::MediaUploaded(_)
    ));
    match next(&mut room).await.decode().unwrap() {
        RoomMessage::MediaProcessed(payload) => {
            assert_eq!(payload.id, MediaId::from("m2"));
            assert_eq!(payload.preview_url, "http://relay.test/media/events/E1/m2/poster.jpg");
            assert_eq!(
                payload.url.as_deref(),
                Some("http://relay.test/media/events/E1/m2/video.mp4")
            );
        }
        other => panic!("unexpected {:?}", other),
    }

    let stored = f.repository.get(&MediaId::from("m2")).await.unwrap();
    assert!(stored.is_playable());
}

#[tokio::test]
async fn test_failed_transcode_removes_record() {
    let f = fixture(Arc::new(BrokenTranscoder)).await;
    let mut room = f.hub.subscribe(&RoomKey::event(&EventId::from("E1")));
    let guest = Actor::guest("Alex");
    let file = Bytes::from_static(b"bogus video");

    f.handoff
        .submit(&guest, metadata("m3", "E1", &guest, "video/webm", file.len()), file)
        .await
        .unwrap();

    next(&mut room).await;
    match next(&mut room).await.decode().unwrap() {
        RoomMessage::MediaFailed(payload) => {
            assert_eq!(payload.id, MediaId::from("m3"));
            assert!(payload.reason.contains("codec not supported"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(f.repository.get(&MediaId::from("m3")).await.is_none());
}

#[tokio::test]
async fn test_guest_video_refused_on_free_event() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let guest = Actor::guest("Alex");
    let file = Bytes::from_static(b"movie");

    let result = f
        .handoff
        .submit(&guest, metadata("m4", "FREE", &guest, "video/mp4", file.len()), file)
        .await;

    assert!(matches!(result, Err(RelayError::Rejected(_))));
    assert!(f.repository.get(&MediaId::from("m4")).await.is_none());
    assert!(!f.media_dir.path().join("events/FREE/m4").exists());
}

#[tokio::test]
async fn test_user_upload_updates_storage_on_user_channel() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let mut channel = f.hub.subscribe(&RoomKey::user("host-1"));
    let host = f.directory.account("host-1").await.unwrap().actor();
    let file = jpeg();

    f.handoff
        .submit(&host, metadata("m5", "E1", &host, "image/jpeg", file.len()), file.clone())
        .await
        .unwrap();

    match next(&mut channel).await.decode().unwrap() {
        RoomMessage::UserUpdated(update) => {
            assert_eq!(update.user_id, "host-1");
            let used = update.storage_used_mb.unwrap();
            assert!(used > 0.0 && used < 1.0);
        }
        other => panic!("unexpected {:?}", other),
    }
    let account = f.directory.account("host-1").await.unwrap();
    assert!(account.storage_used_mb > 0.0);
}

#[tokio::test]
async fn test_private_upload_reaches_only_entitled_sockets() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let room = RoomKey::event(&EventId::from("E1"));
    let mut stream = f.hub.subscribe(&room);
    let alex = Actor::guest("Alex");
    let file = jpeg();

    let mut private = metadata("m6", "E1", &alex, "image/jpeg", file.len());
    private.visibility = Visibility::Private;
    f.handoff.submit(&alex, private, file).await.unwrap();
    let announced = next(&mut stream).await;

    let gate = |viewer: Option<Actor>| ViewerGate::new(viewer, f.directory.clone(), f.repository.clone());
    let host = f.directory.account("host-1").await.unwrap().actor();

    assert!(gate(Some(alex.clone())).admits(&announced).await);
    assert!(gate(Some(host.clone())).admits(&announced).await);
    assert!(!gate(Some(Actor::guest("Sam"))).admits(&announced).await);
    assert!(!gate(None).admits(&announced).await);

    // Follow-ups that only carry the id are judged by the stored record
    let like = RoomEvent::from_message(
        room.clone(),
        "test",
        &RoomMessage::NewLike(NewLikePayload {
            id: MediaId::from("m6"),
            like_count: 1,
        }),
    )
    .unwrap();
    assert!(gate(Some(host.clone())).admits(&like).await);
    assert!(!gate(Some(Actor::guest("Sam"))).admits(&like).await);

    let deleted = RoomEvent::from_message(
        room,
        "test",
        &RoomMessage::MediaDeleted(MediaDeletedPayload { id: MediaId::from("m6") }),
    )
    .unwrap();
    assert!(gate(Some(Actor::guest("Sam"))).admits(&deleted).await);
}

#[tokio::test]
async fn test_user_room_is_joinable_by_its_user_only() {
    let f = fixture(Arc::new(StubTranscoder)).await;
    let host = f.directory.account("host-1").await.unwrap().actor();
    let own_room = RoomKey::user("host-1");
    let gate = |viewer: Option<Actor>| ViewerGate::new(viewer, f.directory.clone(), f.repository.clone());

    assert!(gate(Some(host)).may_join(&own_room));
    assert!(!gate(Some(Actor::guest("Sam"))).may_join(&own_room));
    assert!(!gate(None).may_join(&own_room));
    assert!(gate(None).may_join(&RoomKey::event(&EventId::from("E1"))));
}
