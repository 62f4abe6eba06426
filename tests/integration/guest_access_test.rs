//! Guest uploads: identity, public visibility, private items and delete rights

mod support;

use gallery_store::{ApiError, GalleryApi, SessionEvent, StoreChange, StoreError};
use momentwall_config::UploadConfig;
use momentwall_types::{Actor, EventId, RoomKey, Visibility};
use room_channel::{RoomConnection, WsConnector};
use std::sync::Arc;
use std::time::Duration;
use support::{next_event, noisy_jpeg, spawn_relay};
use upload_client::{MediaSource, SubmissionClient, UploadIntent, UploadOutcome, UploadRequest};

async fn upload_as(
    relay: &support::TestRelay,
    session: &mut gallery_store::GallerySession,
    visibility: Visibility,
) -> UploadRequest {
    let client = SubmissionClient::new(&UploadConfig::default());
    let mut request = client
        .prepare(UploadIntent {
            source: MediaSource::camera_capture(noisy_jpeg(0.2)),
            event: session.store().event().clone(),
            caption: Some("Cake!".to_string()),
            visibility,
            actor: session.viewer().clone(),
            watermark: true,
            branding: None,
        })
        .await
        .unwrap();

    let outcome = session
        .begin_upload(&relay.transport(), &mut request)
        .unwrap()
        .finish()
        .await;
    assert!(matches!(outcome, UploadOutcome::Ready(_)), "got {:?}", outcome);
    session.complete_upload(&mut request, &outcome).unwrap();
    request
}

#[tokio::test]
async fn test_guest_upload_visible_but_not_deletable_by_others() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let alex = Actor::guest("Alex");
    let sam = Actor::guest("Sam");

    let mut other = relay.enter(sam.clone(), "E1").await;
    let mut own = relay.enter(alex.clone(), "E1").await;
    let request = upload_as(&relay, &mut own, Visibility::Public).await;

    let item = own.store().get(&request.id).unwrap().clone();
    assert!(item.uploader_identity.as_str().starts_with("guest-Alex-"));
    assert_eq!(item.uploader_identity, alex.identity());
    assert_eq!(item.uploader_name, "Alex");
    assert!(!item.watermark_applied, "guests are never watermarked");

    assert_eq!(
        next_event(&mut other).await,
        SessionEvent::Changed(StoreChange::Inserted(request.id.clone()))
    );

    // Denied locally without a round trip
    assert!(matches!(other.delete(&request.id).await, Err(StoreError::Forbidden(_))));

    // And denied by the relay when asked directly
    let direct = relay.api().delete_media(own.event_id(), &request.id, &sam).await;
    assert!(matches!(direct, Err(ApiError::Rejected { status: 403, .. })));
    assert!(other.store().contains(&request.id));

    // The uploader may delete; the other viewer drops it from the broadcast
    own.delete(&request.id).await.unwrap();
    assert!(own.store().is_empty());
    assert_eq!(
        next_event(&mut other).await,
        SessionEvent::Changed(StoreChange::Removed(request.id.clone()))
    );
    assert!(other.store().is_empty());
}

#[tokio::test]
async fn test_private_upload_hidden_from_other_guests() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let sam = Actor::guest("Sam");
    let mut other = relay.enter(sam.clone(), "E1").await;
    let mut own = relay.enter(Actor::guest("Alex"), "E1").await;
    let request = upload_as(&relay, &mut own, Visibility::Private).await;
    let public = upload_as(&relay, &mut own, Visibility::Public).await;

    // The private broadcast is withheld from Sam's socket; the public one follows it
    assert_eq!(
        next_event(&mut other).await,
        SessionEvent::Changed(StoreChange::Inserted(public.id.clone()))
    );
    assert!(!other.store().contains(&request.id));

    let listed = relay.api().fetch_media(own.event_id(), &sam).await.unwrap();
    assert!(listed.iter().all(|item| item.id != request.id));
    assert!(listed.iter().any(|item| item.id == public.id));

    let host = support::host().actor();
    let listed = relay.api().fetch_media(own.event_id(), &host).await.unwrap();
    assert!(listed.iter().any(|item| item.id == request.id), "the host sees private items");

    let like = relay.api().like(own.event_id(), &request.id, &sam).await;
    assert!(matches!(like, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_user_room_join_refused_for_other_viewers() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let host_room = RoomKey::user("host-1");
    let event_room = RoomKey::event(&EventId::from("E1"));

    let connector = WsConnector::for_relay(&relay.base_url).with_actor(&Actor::guest("Sam"));
    let mut connection = RoomConnection::new(Arc::new(connector));
    connection.connect().await.unwrap();
    connection.join_room(host_room.clone()).await.unwrap();
    connection.join_room(event_room.clone()).await.unwrap();

    // Frames are handled in order, so once the event join lands the user join was decided
    tokio::time::timeout(support::WAIT, async {
        while relay.hub.member_count(&event_room) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("event room joined");
    assert_eq!(relay.hub.member_count(&host_room), 0);
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let relay = spawn_relay(Duration::from_millis(10)).await;
    let result = relay
        .api()
        .fetch_event(&EventId::from("nope"), &Actor::guest("Alex"))
        .await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));

    let health: serde_json::Value = reqwest::get(format!("{}/health", relay.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["broadcast"], "local");
}
