use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::controller::NavigationIntent;
use crate::room::models::{ContentPayload, PlayerEntry, ResultRecord, RoomStatus};

/// Changes a client observes on the room it is in
///
/// Events represent facts about the shared room record that have already
/// happened. They are derived from store change notifications, one batch per
/// observed write, so every client sees the same facts in the same order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// `meta.status` changed; `from` is unset on the first observation
    StatusChanged {
        from: Option<RoomStatus>,
        to: RoomStatus,
    },

    /// The host opened a new round
    RoundStarted { round: u32 },

    /// Any player record was added, removed or edited
    PlayersUpdated { players: Vec<PlayerEntry> },

    /// `meta.hostId` moved to another player
    HostChanged { host_id: String },

    /// The host published content for the current round
    GameDataReceived { payload: ContentPayload },

    GameStateUpdated { state: Value },

    ResultsUpdated {
        results: BTreeMap<String, ResultRecord>,
    },

    /// The room reached `closed` or `ended`
    RoomClosed {
        status: RoomStatus,
        reason: Option<String>,
    },

    /// The room record is gone
    RoomRemoved,

    /// This client's player record is gone while the room lives on
    RemovedFromRoom,

    /// A non-host in the lobby view should move to the game view
    NavigateToGame { intent: NavigationIntent },
}

impl RoomEvent {
    /// Get a human-readable description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::StatusChanged { .. } => "status_changed",
            RoomEvent::RoundStarted { .. } => "round_started",
            RoomEvent::PlayersUpdated { .. } => "players_updated",
            RoomEvent::HostChanged { .. } => "host_changed",
            RoomEvent::GameDataReceived { .. } => "game_data_received",
            RoomEvent::GameStateUpdated { .. } => "game_state_updated",
            RoomEvent::ResultsUpdated { .. } => "results_updated",
            RoomEvent::RoomClosed { .. } => "room_closed",
            RoomEvent::RoomRemoved => "room_removed",
            RoomEvent::RemovedFromRoom => "removed_from_room",
            RoomEvent::NavigateToGame { .. } => "navigate_to_game",
        }
    }

    /// Whether this event means the client no longer has a room to be in
    pub fn ends_membership(&self) -> bool {
        matches!(
            self,
            RoomEvent::RoomClosed { .. } | RoomEvent::RoomRemoved | RoomEvent::RemovedFromRoom
        )
    }
}
