use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{RoomSnapshot, RoomStatus};
use crate::shared::AppError;

pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_NAME_LENGTH: usize = 50;

/// Request payload for creating a new room
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    /// Left unset for a lobby-first room where the host picks the game later
    pub game_type: Option<String>,
    #[serde(default)]
    pub config: Value,
    pub host_name: String,
    pub max_players: Option<u32>,
}

impl CreateRoomRequest {
    pub fn new(game_type: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self {
            game_type: Some(game_type.into()),
            config: Value::Null,
            host_name: host_name.into(),
            max_players: None,
        }
    }

    /// A room created without a game; it starts in the lobby
    pub fn lobby(host_name: impl Into<String>) -> Self {
        Self {
            game_type: None,
            config: Value::Null,
            host_name: host_name.into(),
            max_players: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = Some(max_players);
        self
    }
}

/// Result of leaving a room
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// Left; the room carries on
    Left,
    /// The departing host handed the room to another player
    HostTransferred { new_host_id: String },
    /// The host left alone; the room was marked closed and then deleted
    RoomClosed,
    /// The last player left and the room was deleted
    RoomDeleted,
}

/// Read-only summary of a room for listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub game_type: Option<String>,
    pub host_name: Option<String>,
    pub status: RoomStatus,
    pub player_count: usize,
    pub max_players: u32,
}

impl From<&RoomSnapshot> for RoomSummary {
    fn from(snapshot: &RoomSnapshot) -> Self {
        let room = &snapshot.room;
        Self {
            id: snapshot.room_id.clone(),
            game_type: room.meta.game_type.clone(),
            host_name: room.player(room.host_id()).map(|p| p.name.clone()),
            status: room.status(),
            player_count: room.player_count(),
            max_players: room.meta.max_players,
        }
    }
}

/// Trims a display name and checks its length
pub fn validate_player_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    let length = name.chars().count();

    if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) {
        return Err(AppError::Validation(format!(
            "Name must be {MIN_NAME_LENGTH}-{MAX_NAME_LENGTH} characters"
        )));
    }

    Ok(name.to_string())
}
