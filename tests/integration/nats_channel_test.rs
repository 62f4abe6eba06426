//! Room fan-out through a real NATS server.
//!
//! Run with a server on `NATS_URL` (default nats://localhost:4222):
//! `cargo test -p momentwall-tests --test nats_channel_test -- --ignored`

use futures::StreamExt;
use momentwall_types::{EventId, MediaId, NewLikePayload, RoomEvent, RoomKey, RoomMessage};
use room_channel::{NatsRoomChannel, RoomChannel};
use std::time::Duration;

fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

#[tokio::test]
#[ignore = "needs a running NATS server"]
async fn test_nats_rooms_fan_out_and_stay_isolated() {
    let prefix = format!("momentwall-test-{}", std::process::id());
    let channel = NatsRoomChannel::new(&nats_url(), Some(prefix)).await.unwrap();
    assert!(channel.is_connected().await);
    assert_eq!(channel.channel_type(), "nats");

    let wedding = RoomKey::event(&EventId::from("wedding"));
    let party = RoomKey::event(&EventId::from("party"));
    let mut first = channel.subscribe(&wedding);
    let mut second = channel.subscribe(&wedding);
    let mut elsewhere = channel.subscribe(&party);

    // Subscriptions are registered by background tasks
    tokio::time::sleep(Duration::from_millis(300)).await;

    let message = RoomMessage::NewLike(NewLikePayload {
        id: MediaId::from("m1"),
        like_count: 3,
    });
    let event = RoomEvent::from_message(wedding.clone(), "nats-test", &message).unwrap();
    channel.publish(&event).await.unwrap();

    for member in [&mut first, &mut second] {
        let received = tokio::time::timeout(Duration::from_secs(5), member.next())
            .await
            .expect("event should arrive")
            .expect("stream open")
            .expect("event decodes");
        assert_eq!(received.event_id, event.event_id);
        assert_eq!(received.decode().unwrap(), message);
    }

    let silent = tokio::time::timeout(Duration::from_millis(300), elsewhere.next()).await;
    assert!(silent.is_err(), "other rooms see nothing");
}
