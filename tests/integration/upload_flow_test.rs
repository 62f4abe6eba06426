//! Image upload end to end: caption fallback, transport, broadcast, and the
//! galleries of the uploader and of a second viewer.

mod support;

use gallery_store::{SessionEvent, StoreChange};
use momentwall_config::UploadConfig;
use momentwall_types::{Actor, MediaKind, ProcessingState, Visibility};
use std::sync::Arc;
use std::time::Duration;
use support::{host, next_event, noisy_jpeg, spawn_relay, FixedCaptioner};
use upload_client::{
    MediaSource, SourceOrigin, SubmissionClient, UploadFailure, UploadIntent, UploadOutcome, UploadState,
};

#[tokio::test]
async fn test_captioned_image_reaches_second_viewer_once() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let uploader = host().actor();

    let mut viewer = relay.enter(Actor::guest("Sam"), "E1").await;
    let mut own = relay.enter(uploader.clone(), "E1").await;
    let event = own.store().event().clone();

    let client = SubmissionClient::new(&UploadConfig::default()).with_captioner(Arc::new(FixedCaptioner("Sunset moment")));
    let photo = noisy_jpeg(2.0);
    let mut request = client
        .prepare(UploadIntent {
            source: MediaSource::new(photo, "sunset.jpg", "image/jpeg", SourceOrigin::FilePicker),
            event,
            caption: None,
            visibility: Visibility::Public,
            actor: uploader,
            watermark: false,
            branding: None,
        })
        .await
        .unwrap();
    assert_eq!(request.caption.as_deref(), Some("Sunset moment"));

    let transport = relay.transport();
    let handle = own.begin_upload(&transport, &mut request).unwrap();
    assert!(own.store().is_optimistic(&request.id));

    let mut progress = Vec::new();
    let outcome = handle.wait_with_progress(|p| progress.push(p)).await;
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "progress never goes back");
    assert_eq!(progress.last(), Some(&100));

    let item = match &outcome {
        UploadOutcome::Ready(item) => item.clone(),
        other => panic!("upload should succeed, got {:?}", other),
    };
    assert_eq!(item.id, request.id);
    assert_eq!(item.processing_state, ProcessingState::Ready);
    assert_eq!(item.caption.as_deref(), Some("Sunset moment"));

    own.complete_upload(&mut request, &outcome).unwrap();
    assert_eq!(request.state(), &UploadState::Complete);

    // The echo of our own upload collapses into the confirmed entry
    let _ = tokio::time::timeout(Duration::from_millis(300), own.next_event()).await;
    assert_eq!(own.store().len(), 1);
    assert!(!own.store().is_optimistic(&item.id));

    // The other viewer gains exactly one grid item
    assert_eq!(
        next_event(&mut viewer).await,
        SessionEvent::Changed(StoreChange::Inserted(item.id.clone()))
    );
    assert_eq!(viewer.store().len(), 1);
    let shown = viewer.store().get(&item.id).unwrap();
    assert_eq!(shown.caption.as_deref(), Some("Sunset moment"));
    assert_eq!(shown.kind, MediaKind::Image);
    assert!(shown.is_playable());

    // The stored rendition is reachable at the announced url
    let fetched = reqwest::get(&shown.url).await.unwrap();
    assert!(fetched.status().is_success());
}

#[tokio::test]
async fn test_server_rejection_removes_placeholder() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let guest = Actor::guest("Alex");
    let mut session = relay.enter(guest.clone(), "FREE").await;

    // Bypass the client checks to exercise the relay's own re-validation
    let mut request = upload_client::UploadRequest::new(
        session.event_id().clone(),
        MediaKind::Video,
        bytes::Bytes::from_static(b"\x00\x00\x00\x18ftypmp42"),
        "clip.mp4".to_string(),
        "video/mp4".to_string(),
        None,
        Visibility::Public,
        guest,
        false,
    );

    let transport = relay.transport();
    let handle = session.begin_upload(&transport, &mut request).unwrap();
    assert_eq!(session.store().len(), 1);

    let outcome = handle.finish().await;
    match &outcome {
        UploadOutcome::Failed(UploadFailure::ServerRejected(reason)) => {
            assert!(reason.contains("video"), "unexpected reason {}", reason)
        }
        other => panic!("expected a server rejection, got {:?}", other),
    }

    session.complete_upload(&mut request, &outcome).unwrap();
    assert!(session.store().is_empty());
    assert!(matches!(request.state(), UploadState::Failed(_)));
}

#[tokio::test]
async fn test_likes_and_comments_fan_out() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let uploader = host().actor();
    let mut own = relay.enter(uploader.clone(), "E1").await;

    let client = SubmissionClient::new(&UploadConfig::default());
    let mut request = client
        .prepare(UploadIntent {
            source: MediaSource::camera_capture(noisy_jpeg(0.1)),
            event: own.store().event().clone(),
            caption: Some("First dance".to_string()),
            visibility: Visibility::Public,
            actor: uploader,
            watermark: false,
            branding: None,
        })
        .await
        .unwrap();
    let outcome = own.begin_upload(&relay.transport(), &mut request).unwrap().finish().await;
    own.complete_upload(&mut request, &outcome).unwrap();

    let mut viewer = relay.enter(Actor::guest("Sam"), "E1").await;
    assert!(viewer.store().contains(&request.id), "baseline includes earlier uploads");

    // One viewer may like repeatedly; every click counts
    assert_eq!(viewer.like(&request.id).await.unwrap(), 1);
    assert_eq!(viewer.like(&request.id).await.unwrap(), 2);
    viewer.comment(&request.id, "So lovely").await.unwrap();

    let mut likes = 0;
    let mut comments = 0;
    while likes < 2 || comments < 1 {
        match next_event(&mut own).await {
            SessionEvent::Changed(StoreChange::Updated(id)) if id == request.id => {
                let item = own.store().get(&id).unwrap();
                likes = item.like_count;
                comments = item.comments.len();
            }
            _ => {}
        }
    }
    let item = own.store().get(&request.id).unwrap();
    assert_eq!(item.like_count, 2);
    assert_eq!(item.comments[0].author, "Sam");
    assert_eq!(item.comments[0].text, "So lovely");

    viewer.post_message("Congratulations!").await.unwrap();
    loop {
        if let SessionEvent::Changed(StoreChange::GuestbookAppended(_)) = next_event(&mut own).await {
            break;
        }
    }
    assert_eq!(own.store().guestbook().len(), 1);
    assert_eq!(own.store().guestbook()[0].author, "Sam");
}
