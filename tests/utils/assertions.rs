//! Waiting helpers - everything here is event-driven with a hard timeout
#![allow(dead_code)] // Test utilities may not all be used in every test

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

use roomsync::{room::models::Room, store::path, RealtimeStore, RoomEvent};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Next event on `events` that satisfies `matches`
pub async fn next_event_matching<F>(
    events: &mut broadcast::Receiver<RoomEvent>,
    mut matches: F,
) -> RoomEvent
where
    F: FnMut(&RoomEvent) -> bool,
{
    timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed before a matching event"),
            }
        }
    })
    .await
    .expect("timed out waiting for a room event")
}

/// First state of the room record that satisfies `matches`
pub async fn wait_for_room<F>(store: &dyn RealtimeStore, room_id: &str, mut matches: F) -> Room
where
    F: FnMut(&Room) -> bool,
{
    let mut subscription = store.subscribe(&path::room(room_id)).await.unwrap();
    timeout(TIMEOUT, async {
        loop {
            match subscription.next().await {
                Some(Some(value)) => {
                    if let Ok(room) = serde_json::from_value::<Room>(value) {
                        if matches(&room) {
                            return room;
                        }
                    }
                }
                Some(None) => continue,
                None => panic!("room subscription closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for room state")
}

pub async fn wait_for_room_deleted(store: &dyn RealtimeStore, room_id: &str) {
    let mut subscription = store.subscribe(&path::room(room_id)).await.unwrap();
    timeout(TIMEOUT, async {
        while let Some(value) = subscription.next().await {
            if value.is_none() {
                return;
            }
        }
        panic!("room subscription closed");
    })
    .await
    .expect("timed out waiting for room deletion")
}

/// Polls `check` until it holds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let polled = timeout(TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}
