use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumIter, EnumString};

/// Room lifecycle status, stored at `meta.status`
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RoomStatus {
    Lobby,
    Waiting,
    Playing,
    Finished,
    Closed,
    Ended,
}

impl RoomStatus {
    /// New players may only join before the game starts
    pub fn is_joinable(self) -> bool {
        matches!(self, RoomStatus::Lobby | RoomStatus::Waiting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoomStatus::Closed | RoomStatus::Ended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlayerStatus {
    #[default]
    Active,
    Finished,
    Disconnected,
}

/// Room-wide fields, only written by the current host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    pub host_id: String,
    pub status: RoomStatus,
    pub max_players: u32,
    #[serde(default)]
    pub config: Value,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_reason: Option<String>,
    #[serde(default = "first_round")]
    pub round: u32,
    /// Bumped by every committed room-wide mutation
    #[serde(default)]
    pub version: u64,
}

fn first_round() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub name: String,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub status: PlayerStatus,
    #[serde(default)]
    pub online: bool,
    pub joined_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub finished: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub exited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<i64>,
}

impl PlayerRecord {
    pub fn new(name: String, is_host: bool, joined_at: i64) -> Self {
        Self {
            name,
            is_host,
            is_ready: is_host,
            score: 0,
            status: PlayerStatus::Active,
            online: true,
            joined_at,
            last_seen: Some(joined_at),
            finished: false,
            finished_at: None,
            exited: false,
            exited_at: None,
        }
    }

    /// Most recent sign of life from this player
    pub fn last_activity(&self) -> i64 {
        self.last_seen.unwrap_or(self.joined_at).max(self.joined_at)
    }

    pub fn is_still_playing(&self) -> bool {
        !self.finished && self.status != PlayerStatus::Disconnected
    }
}

/// The canonical game content the host generated, shared verbatim with every player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    pub data: Value,
    /// Exact configuration that produced `data`
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
    #[serde(default = "first_round")]
    pub round: u32,
    pub generated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub score: i64,
    /// Milliseconds taken, when the game tracks duration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub finished_at: i64,
}

/// A room record as stored under `rooms/{roomId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub meta: RoomMeta,
    #[serde(default)]
    pub players: BTreeMap<String, PlayerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_data: Option<ContentPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<Value>,
    #[serde(default)]
    pub results: BTreeMap<String, ResultRecord>,
}

/// A player record paired with its session id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub id: String,
    #[serde(flatten)]
    pub record: PlayerRecord,
}

impl Room {
    /// Creates a room with the host as its sole player
    pub fn new(
        host_id: String,
        host_name: String,
        game_type: Option<String>,
        config: Value,
        max_players: u32,
        now: i64,
    ) -> Self {
        let status = if game_type.is_some() {
            RoomStatus::Waiting
        } else {
            RoomStatus::Lobby
        };

        let mut players = BTreeMap::new();
        players.insert(host_id.clone(), PlayerRecord::new(host_name, true, now));

        Self {
            meta: RoomMeta {
                game_type,
                host_id,
                status,
                max_players,
                config,
                created_at: now,
                closed_reason: None,
                round: 1,
                version: 0,
            },
            players,
            game_data: None,
            game_state: None,
            results: BTreeMap::new(),
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.meta.status
    }

    pub fn host_id(&self) -> &str {
        &self.meta.host_id
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.meta.host_id == player_id
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.meta.max_players as usize
    }

    pub fn has_player(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerRecord> {
        self.players.get(player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut PlayerRecord> {
        self.players.get_mut(player_id)
    }

    /// Players ordered by join time, ties broken by session id
    pub fn players_in_join_order(&self) -> Vec<PlayerEntry> {
        let mut entries: Vec<PlayerEntry> = self
            .players
            .iter()
            .map(|(id, record)| PlayerEntry {
                id: id.clone(),
                record: record.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.record
                .joined_at
                .cmp(&b.record.joined_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        entries
    }

    /// Exactly one host flag, and it belongs to `meta.hostId`
    pub fn has_consistent_host(&self) -> bool {
        let hosts: Vec<&String> = self
            .players
            .iter()
            .filter(|(_, p)| p.is_host)
            .map(|(id, _)| id)
            .collect();
        hosts.len() == 1 && hosts[0] == &self.meta.host_id
    }

    pub fn all_exited(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.exited)
    }

    /// A room nobody is in, or that everyone has exited, must not linger.
    /// Neither may a closed room once no one in it is online.
    pub fn is_garbage(&self) -> bool {
        self.players.is_empty()
            || self.all_exited()
            || (self.status() == RoomStatus::Closed && self.players.values().all(|p| !p.online))
    }

    /// Latest activity across all players, or creation time for an empty room
    pub fn last_activity(&self) -> i64 {
        self.players
            .values()
            .map(PlayerRecord::last_activity)
            .max()
            .unwrap_or(self.meta.created_at)
    }
}

/// A room together with the code it lives under
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub room: Room,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn two_player_room() -> Room {
        let mut room = Room::new(
            "host-1".to_string(),
            "Hana".to_string(),
            Some("math".to_string()),
            json!({"questionCount": 10}),
            4,
            1_000,
        );
        room.players.insert(
            "player-2".to_string(),
            PlayerRecord::new("Pat".to_string(), false, 2_000),
        );
        room
    }

    #[test]
    fn test_new_room_with_game_type_is_waiting() {
        let room = two_player_room();
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert!(room.has_consistent_host());
        assert!(room.players["host-1"].is_ready);
        assert!(!room.players["player-2"].is_ready);
    }

    #[test]
    fn test_new_room_without_game_type_is_lobby() {
        let room = Room::new("h".to_string(), "Hana".to_string(), None, Value::Null, 4, 0);
        assert_eq!(room.status(), RoomStatus::Lobby);
    }

    #[test]
    fn test_wire_field_names() {
        let room = two_player_room();
        let value = serde_json::to_value(&room).unwrap();

        assert_eq!(value["meta"]["hostId"], json!("host-1"));
        assert_eq!(value["meta"]["gameType"], json!("math"));
        assert_eq!(value["meta"]["maxPlayers"], json!(4));
        assert_eq!(value["meta"]["status"], json!("waiting"));
        assert_eq!(value["meta"]["createdAt"], json!(1_000));
        assert_eq!(value["players"]["host-1"]["isHost"], json!(true));
        assert_eq!(value["players"]["host-1"]["joinedAt"], json!(1_000));
        assert_eq!(value["players"]["player-2"]["status"], json!("active"));
        assert!(value.get("gameData").is_none());
    }

    #[test]
    fn test_deserializes_sparse_store_record() {
        // the store drops empty objects and false-y optional fields never written
        let value = json!({
            "meta": {"hostId": "h", "status": "playing", "maxPlayers": 2, "createdAt": 5},
            "players": {"h": {"name": "Hana", "isHost": true, "joinedAt": 5}},
            "gameData": {"data": [1, 2], "generatedAt": 6}
        });
        let room: Room = serde_json::from_value(value).unwrap();

        assert_eq!(room.meta.round, 1);
        assert_eq!(room.meta.config, Value::Null);
        assert!(room.results.is_empty());
        assert_eq!(room.players["h"].status, PlayerStatus::Active);
        assert_eq!(room.game_data.unwrap().data, json!([1, 2]));
    }

    #[test]
    fn test_players_in_join_order() {
        let mut room = two_player_room();
        room.players.insert(
            "a-early".to_string(),
            PlayerRecord::new("Early".to_string(), false, 1_500),
        );

        let order: Vec<String> = room
            .players_in_join_order()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(order, vec!["host-1", "a-early", "player-2"]);
    }

    #[test]
    fn test_inconsistent_host_detected() {
        let mut room = two_player_room();
        room.players.get_mut("player-2").unwrap().is_host = true;
        assert!(!room.has_consistent_host());

        let mut room = two_player_room();
        room.meta.host_id = "player-2".to_string();
        assert!(!room.has_consistent_host());
    }

    #[test]
    fn test_garbage_rules() {
        let mut room = two_player_room();
        assert!(!room.is_garbage());

        room.players.get_mut("host-1").unwrap().exited = true;
        assert!(!room.is_garbage());

        room.players.get_mut("player-2").unwrap().exited = true;
        assert!(room.is_garbage());

        room.players.clear();
        assert!(room.is_garbage());
    }

    #[test]
    fn test_closed_room_with_only_offline_players_is_garbage() {
        let mut room = two_player_room();
        room.meta.status = RoomStatus::Closed;
        room.players.get_mut("host-1").unwrap().online = false;
        assert!(!room.is_garbage());

        room.players.remove("player-2");
        assert!(room.is_garbage());

        // the same records in an open room still count
        room.meta.status = RoomStatus::Waiting;
        assert!(!room.is_garbage());
    }

    #[test]
    fn test_status_string_forms() {
        assert_eq!(RoomStatus::Playing.to_string(), "playing");
        assert_eq!(RoomStatus::from_str("ended").unwrap(), RoomStatus::Ended);
        assert!(RoomStatus::Waiting.is_joinable());
        assert!(!RoomStatus::Playing.is_joinable());
        assert!(RoomStatus::Closed.is_terminal());
    }
}
