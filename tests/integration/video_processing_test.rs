//! Video upload end to end: pending placeholder, background transcode, in-place update

mod support;

use bytes::Bytes;
use gallery_store::{GalleryApi, SessionEvent, StoreChange};
use momentwall_config::UploadConfig;
use momentwall_types::{Actor, MediaKind, ProcessingState, Visibility};
use std::time::Duration;
use support::{host, next_event, spawn_relay};
use upload_client::{MediaSource, SourceOrigin, SubmissionClient, UploadIntent, UploadOutcome, UploadState};

#[tokio::test]
async fn test_pending_video_becomes_playable_in_place() {
    let relay = spawn_relay(Duration::from_millis(500)).await;
    let uploader = host().actor();

    let mut viewer = relay.enter(Actor::guest("Sam"), "E2").await;
    let mut own = relay.enter(uploader.clone(), "E2").await;

    let client = SubmissionClient::new(&UploadConfig::default());
    let mut request = client
        .prepare(UploadIntent {
            source: MediaSource::new(
                Bytes::from_static(b"\x00\x00\x00\x18ftypmp42 first dance"),
                "dance.mp4",
                "video/mp4",
                SourceOrigin::FilePicker,
            ),
            event: own.store().event().clone(),
            caption: Some("First dance".to_string()),
            visibility: Visibility::Public,
            actor: uploader,
            watermark: false,
            branding: None,
        })
        .await
        .unwrap();
    assert_eq!(request.kind, MediaKind::Video);

    let transport = relay.transport();
    let outcome = own.begin_upload(&transport, &mut request).unwrap().finish().await;
    let accepted = match &outcome {
        UploadOutcome::Ready(item) => item.clone(),
        other => panic!("upload should be accepted, got {:?}", other),
    };
    assert_eq!(accepted.processing_state, ProcessingState::Pending);
    assert_eq!(accepted.url, "");

    own.complete_upload(&mut request, &outcome).unwrap();
    assert_eq!(request.state(), &UploadState::Processing);
    assert_eq!(own.processing_count(), 1);

    // Second viewer: placeholder first
    assert_eq!(
        next_event(&mut viewer).await,
        SessionEvent::Changed(StoreChange::Inserted(accepted.id.clone()))
    );
    let placeholder = viewer.store().get(&accepted.id).unwrap();
    assert!(!placeholder.is_playable());

    // Then the same cell flips to a playable thumbnail
    assert_eq!(
        next_event(&mut viewer).await,
        SessionEvent::Changed(StoreChange::Updated(accepted.id.clone()))
    );
    assert_eq!(viewer.store().len(), 1);
    let ready = viewer.store().get(&accepted.id).unwrap();
    assert!(ready.is_playable());
    assert!(ready.url.ends_with("/video.mp4"));
    assert_eq!(ready.display_url(), ready.preview_url.as_deref().unwrap());
    assert!(ready.display_url().ends_with("/poster.jpg"));
    assert_eq!(ready.caption.as_deref(), Some("First dance"));

    // Uploader sees the same transition and stops tracking the job
    loop {
        if let SessionEvent::Changed(StoreChange::Updated(id)) = next_event(&mut own).await {
            assert_eq!(id, accepted.id);
            break;
        }
    }
    assert_eq!(own.store().len(), 1);
    assert!(own.store().get(&accepted.id).unwrap().is_playable());
    assert_eq!(own.processing_count(), 0);

    // A late refetch agrees with the broadcasts
    let refetched = relay
        .api()
        .fetch_media(own.event_id(), own.viewer())
        .await
        .unwrap();
    assert_eq!(refetched.len(), 1);
    assert_eq!(refetched[0].processing_state, ProcessingState::Ready);
}
