use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::events::RoomEvent;

pub const DEFAULT_ROOM_CAPACITY: usize = 100;

/// Event bus for distributing room events to the handlers of one client
#[derive(Debug, Clone)]
pub struct EventBus {
    /// Room-specific event channels: room_id -> sender
    room_channels: Arc<RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// Creates a bus whose room channels buffer `capacity` events per receiver
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            room_channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Emits an event to all subscribers of a specific room
    pub async fn emit_to_room(&self, room_id: &str, event: RoomEvent) {
        let event_type = event.event_type();
        let sender = self.sender_for(room_id).await;

        match sender.send(event) {
            Ok(receiver_count) => {
                debug!(
                    room_id = %room_id,
                    event_type,
                    receivers = receiver_count,
                    "Room event emitted"
                );
            }
            Err(_) => {
                debug!(room_id = %room_id, event_type, "Room event emitted with no receivers");
            }
        }
    }

    /// Subscribe to events for a specific room
    pub async fn subscribe_to_room(&self, room_id: &str) -> broadcast::Receiver<RoomEvent> {
        self.sender_for(room_id).await.subscribe()
    }

    /// Drops the room's channel; subscribers drain what is buffered and then stop
    pub async fn close_room(&self, room_id: &str) {
        if self.room_channels.write().await.remove(room_id).is_some() {
            debug!(room_id = %room_id, "Room channel closed");
        }
    }

    pub async fn has_room(&self, room_id: &str) -> bool {
        self.room_channels.read().await.contains_key(room_id)
    }

    async fn sender_for(&self, room_id: &str) -> broadcast::Sender<RoomEvent> {
        if let Some(sender) = self.room_channels.read().await.get(room_id) {
            return sender.clone();
        }

        debug!(room_id = %room_id, "Creating new room channel");
        let mut room_channels = self.room_channels.write().await;
        room_channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}
