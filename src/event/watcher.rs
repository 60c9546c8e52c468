use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{bus::EventBus, events::RoomEvent};
use crate::room::models::Room;
use crate::shared::AppError;
use crate::store::{path, RealtimeStore};

/// Turns store change notifications on one room into [`RoomEvent`]s
pub struct RoomWatcher {
    store: Arc<dyn RealtimeStore>,
    room_id: String,
    /// The observing player, when the watcher runs on behalf of one
    self_id: Option<String>,
    event_bus: EventBus,
}

impl RoomWatcher {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        room_id: String,
        self_id: Option<String>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            room_id,
            self_id,
            event_bus,
        }
    }

    /// Subscribes to the room and spawns the diffing task.
    ///
    /// Stops after the room or the observing player disappears.
    pub async fn start(self) -> Result<JoinHandle<()>, AppError> {
        let mut subscription = self.store.subscribe(&path::room(&self.room_id)).await?;
        info!(room_id = %self.room_id, "Room watcher started");

        Ok(tokio::spawn(async move {
            let mut previous: Option<Room> = None;
            let mut first = true;

            while let Some(value) = subscription.next().await {
                let next = parse_room(&self.room_id, value);
                let events = if first {
                    initial_events(next.as_ref(), self.self_id.as_deref())
                } else {
                    diff_rooms(previous.as_ref(), next.as_ref(), self.self_id.as_deref())
                };
                first = false;

                let finished = events
                    .iter()
                    .any(|e| matches!(e, RoomEvent::RoomRemoved | RoomEvent::RemovedFromRoom));
                for event in events {
                    self.event_bus.emit_to_room(&self.room_id, event).await;
                }
                if finished {
                    break;
                }
                previous = next;
            }

            debug!(room_id = %self.room_id, "Room watcher stopped");
        }))
    }
}

fn parse_room(room_id: &str, value: Option<Value>) -> Option<Room> {
    let value = value?;
    match serde_json::from_value(value) {
        Ok(room) => Some(room),
        Err(e) => {
            // leftovers of hooks that fired after deletion
            warn!(room_id = %room_id, error = %e, "Unreadable room record, treating as removed");
            None
        }
    }
}

/// Events for the first snapshot a watcher sees
pub fn initial_events(room: Option<&Room>, self_id: Option<&str>) -> Vec<RoomEvent> {
    let Some(room) = room else {
        return vec![RoomEvent::RoomRemoved];
    };

    let mut events = vec![
        RoomEvent::StatusChanged {
            from: None,
            to: room.status(),
        },
        RoomEvent::PlayersUpdated {
            players: room.players_in_join_order(),
        },
    ];
    if let Some(payload) = &room.game_data {
        events.push(RoomEvent::GameDataReceived {
            payload: payload.clone(),
        });
    }
    if let Some(state) = &room.game_state {
        events.push(RoomEvent::GameStateUpdated {
            state: state.clone(),
        });
    }
    if !room.results.is_empty() {
        events.push(RoomEvent::ResultsUpdated {
            results: room.results.clone(),
        });
    }
    if room.status().is_terminal() {
        events.push(RoomEvent::RoomClosed {
            status: room.status(),
            reason: room.meta.closed_reason.clone(),
        });
    }
    if self_id.is_some_and(|id| !room.has_player(id)) {
        events.push(RoomEvent::RemovedFromRoom);
    }
    events
}

/// Events describing how `prev` became `next`
pub fn diff_rooms(prev: Option<&Room>, next: Option<&Room>, self_id: Option<&str>) -> Vec<RoomEvent> {
    let (prev, next) = match (prev, next) {
        (_, None) => return vec![RoomEvent::RoomRemoved],
        (None, Some(next)) => return initial_events(Some(next), self_id),
        (Some(prev), Some(next)) => (prev, next),
    };

    let mut events = Vec::new();

    if prev.status() != next.status() {
        events.push(RoomEvent::StatusChanged {
            from: Some(prev.status()),
            to: next.status(),
        });
    }
    if next.meta.round > prev.meta.round {
        events.push(RoomEvent::RoundStarted {
            round: next.meta.round,
        });
    }
    if prev.meta.host_id != next.meta.host_id {
        events.push(RoomEvent::HostChanged {
            host_id: next.meta.host_id.clone(),
        });
    }
    if prev.players != next.players {
        events.push(RoomEvent::PlayersUpdated {
            players: next.players_in_join_order(),
        });
    }
    if let Some(payload) = &next.game_data {
        if prev.game_data.as_ref() != Some(payload) {
            events.push(RoomEvent::GameDataReceived {
                payload: payload.clone(),
            });
        }
    }
    if let Some(state) = &next.game_state {
        if prev.game_state.as_ref() != Some(state) {
            events.push(RoomEvent::GameStateUpdated {
                state: state.clone(),
            });
        }
    }
    if prev.results != next.results {
        events.push(RoomEvent::ResultsUpdated {
            results: next.results.clone(),
        });
    }
    if next.status().is_terminal() && !prev.status().is_terminal() {
        events.push(RoomEvent::RoomClosed {
            status: next.status(),
            reason: next.meta.closed_reason.clone(),
        });
    }
    if let Some(id) = self_id {
        if prev.has_player(id) && !next.has_player(id) {
            events.push(RoomEvent::RemovedFromRoom);
        }
    }

    events
}
