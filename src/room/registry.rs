use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{
    cleanup_task::schedule_room_deletion,
    code::{normalize_room_code, RandomRoomCodeGenerator, RoomCodeGenerator},
    models::{PlayerRecord, Room, RoomSnapshot, RoomStatus},
    repository::RoomRepository,
    types::{validate_player_name, CreateRoomRequest, LeaveOutcome},
};
use crate::{
    config::SyncConfig,
    shared::{now_millis, AppError},
};

pub const HOST_LEFT_REASON: &str = "host_left";

/// Creates, joins, leaves and ends rooms
#[derive(Clone)]
pub struct RoomRegistry {
    repository: RoomRepository,
    config: Arc<SyncConfig>,
    codes: Arc<dyn RoomCodeGenerator>,
}

impl RoomRegistry {
    pub fn new(repository: RoomRepository, config: Arc<SyncConfig>) -> Self {
        Self::with_code_generator(repository, config, Arc::new(RandomRoomCodeGenerator::new()))
    }

    pub fn with_code_generator(
        repository: RoomRepository,
        config: Arc<SyncConfig>,
        codes: Arc<dyn RoomCodeGenerator>,
    ) -> Self {
        Self {
            repository,
            config,
            codes,
        }
    }

    pub fn repository(&self) -> &RoomRepository {
        &self.repository
    }

    /// Creates a room with `host_id` as its sole player and returns its code
    #[instrument(skip(self, request), fields(host_name = %request.host_name))]
    pub async fn create_room(
        &self,
        host_id: &str,
        request: CreateRoomRequest,
    ) -> Result<RoomSnapshot, AppError> {
        let host_name = validate_player_name(&request.host_name)?;
        let max_players = request
            .max_players
            .unwrap_or(self.config.default_max_players);
        if !(2..=self.config.max_room_capacity).contains(&max_players) {
            return Err(AppError::Validation(format!(
                "Room size must be between 2 and {}",
                self.config.max_room_capacity
            )));
        }
        if let Some(game_type) = &request.game_type {
            validate_game_type(game_type)?;
        }
        let config_size = serde_json::to_vec(&request.config)?.len();
        if config_size > self.config.max_payload_bytes {
            return Err(AppError::ContentTooLarge {
                size: config_size,
                limit: self.config.max_payload_bytes,
            });
        }

        let room = Room::new(
            host_id.to_string(),
            host_name,
            request.game_type,
            request.config,
            max_players,
            now_millis(),
        );

        for attempt in 1..=self.config.code_max_attempts {
            let room_id = self.codes.generate(self.config.room_code_length);

            if self.repository.exists(&room_id).await? {
                debug!(room_id = %room_id, attempt, "Room code collision, retrying");
                continue;
            }
            if !self.repository.create_if_absent(&room_id, &room).await? {
                debug!(room_id = %room_id, attempt, "Room code taken concurrently, retrying");
                continue;
            }

            info!(
                room_id = %room_id,
                host_id = %host_id,
                status = %room.status(),
                "Room created successfully"
            );
            return Ok(RoomSnapshot { room_id, room });
        }

        warn!(
            attempts = self.config.code_max_attempts,
            "Could not allocate a room code"
        );
        Err(AppError::RoomCodeExhausted(self.config.code_max_attempts))
    }

    /// Adds `player_id` to the room after checking every join precondition
    #[instrument(skip(self))]
    pub async fn join_room(
        &self,
        room_id: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<RoomSnapshot, AppError> {
        let room_id = normalize_room_code(room_id)?;
        let name = validate_player_name(player_name)?;
        let joined_at = now_millis();

        let mutation = self
            .repository
            .mutate(&room_id, |room| {
                if room.is_full() {
                    return Err(AppError::RoomFull(room_id.clone()));
                }
                if !room.status().is_joinable() {
                    return Err(AppError::RoomNotJoinable {
                        room_id: room_id.clone(),
                        status: room.status(),
                    });
                }
                if room.has_player(player_id) {
                    return Err(AppError::AlreadyInRoom(room_id.clone()));
                }
                room.players.insert(
                    player_id.to_string(),
                    PlayerRecord::new(name.clone(), false, joined_at),
                );
                Ok(room.player_count())
            })
            .await?;

        info!(
            room_id = %room_id,
            player_id = %player_id,
            new_player_count = mutation.value,
            "Player joined room successfully"
        );

        let room = mutation.room.ok_or(AppError::Internal)?;
        Ok(RoomSnapshot { room_id, room })
    }

    /// Removes `player_id`, handing the host role on or closing the room as needed
    #[instrument(skip(self))]
    pub async fn leave_room(&self, room_id: &str, player_id: &str) -> Result<LeaveOutcome, AppError> {
        let mutation = self
            .repository
            .mutate(room_id, |room| {
                if !room.has_player(player_id) {
                    return Err(AppError::NotInRoom);
                }

                // nothing is handed on in a room that is already over
                if !room.is_host(player_id) || room.status().is_terminal() {
                    room.players.remove(player_id);
                    return Ok(LeaveOutcome::Left);
                }

                match pick_successor(room, player_id) {
                    Some(successor) => {
                        promote(room, player_id, &successor);
                        room.players.remove(player_id);
                        Ok(LeaveOutcome::HostTransferred {
                            new_host_id: successor,
                        })
                    }
                    None => {
                        room.meta.status = RoomStatus::Closed;
                        room.meta.closed_reason = Some(HOST_LEFT_REASON.to_string());
                        Ok(LeaveOutcome::RoomClosed)
                    }
                }
            })
            .await?;

        match mutation.value {
            LeaveOutcome::RoomClosed => {
                info!(
                    room_id = %room_id,
                    grace_ms = self.config.closed_grace.as_millis() as u64,
                    "Host left alone, room closed"
                );
                // let subscribers observe the closed status before the record vanishes
                tokio::time::sleep(self.config.closed_grace).await;
                self.repository.delete_room(room_id).await?;
                Ok(LeaveOutcome::RoomClosed)
            }
            _ if mutation.deleted() => {
                info!(room_id = %room_id, player_id = %player_id, "Room deleted after player left");
                Ok(LeaveOutcome::RoomDeleted)
            }
            outcome => {
                info!(room_id = %room_id, player_id = %player_id, outcome = ?outcome, "Player left room");
                Ok(outcome)
            }
        }
    }

    /// Host-only: marks the room ended and schedules its deletion
    #[instrument(skip(self))]
    pub async fn end_room(&self, room_id: &str, caller_id: &str) -> Result<JoinHandle<()>, AppError> {
        self.repository
            .mutate(room_id, |room| {
                require_host(room, caller_id)?;
                room.meta.status = room.status().transition_to(RoomStatus::Ended)?;
                Ok(())
            })
            .await?;

        info!(
            room_id = %room_id,
            ttl_secs = self.config.ended_room_ttl.as_secs(),
            "Room ended, deletion scheduled"
        );
        Ok(schedule_room_deletion(
            self.repository.clone(),
            room_id.to_string(),
            self.config.ended_room_ttl,
        ))
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        self.repository.get_room(room_id).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomSnapshot>, AppError> {
        self.repository.list_rooms().await
    }
}

pub fn require_host(room: &Room, caller_id: &str) -> Result<(), AppError> {
    if room.is_host(caller_id) {
        Ok(())
    } else {
        Err(AppError::NotHost)
    }
}

/// Game types are short identifiers used as route keys
pub fn validate_game_type(game_type: &str) -> Result<(), AppError> {
    let valid = !game_type.is_empty()
        && game_type.len() <= 32
        && game_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Unknown game type: {game_type}")))
    }
}

/// First online player in join order, else first in join order
pub fn pick_successor(room: &Room, departing_id: &str) -> Option<String> {
    let candidates: Vec<_> = room
        .players_in_join_order()
        .into_iter()
        .filter(|p| p.id != departing_id)
        .collect();

    candidates
        .iter()
        .find(|p| p.record.online)
        .or_else(|| candidates.first())
        .map(|p| p.id.clone())
}

/// Moves the host flag from `from` to `to` and points `meta.hostId` at `to`
pub fn promote(room: &mut Room, from: &str, to: &str) {
    if let Some(old) = room.player_mut(from) {
        old.is_host = false;
    }
    if let Some(new) = room.player_mut(to) {
        new.is_host = true;
        new.is_ready = true;
    }
    room.meta.host_id = to.to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::presence::HOST_DISCONNECTED_REASON;
    use crate::store::InMemoryRealtimeStore;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hands out a scripted sequence of codes
    struct ScriptedCodes(Mutex<Vec<String>>);

    impl ScriptedCodes {
        fn new(codes: &[&str]) -> Self {
            Self(Mutex::new(codes.iter().rev().map(|c| c.to_string()).collect()))
        }
    }

    impl RoomCodeGenerator for ScriptedCodes {
        fn generate(&self, _length: usize) -> String {
            self.0.lock().unwrap().pop().unwrap_or_else(|| "ZZZZZZ".to_string())
        }
    }

    fn test_config() -> Arc<SyncConfig> {
        Arc::new(SyncConfig {
            closed_grace: Duration::from_millis(10),
            ended_room_ttl: Duration::from_millis(20),
            code_max_attempts: 3,
            ..SyncConfig::default()
        })
    }

    fn registry() -> RoomRegistry {
        let repo = RoomRepository::new(Arc::new(InMemoryRealtimeStore::new()));
        RoomRegistry::new(repo, test_config())
    }

    async fn room_with_players(registry: &RoomRegistry, players: &[&str]) -> String {
        let snapshot = registry
            .create_room("host", CreateRoomRequest::new("math", "Hana"))
            .await
            .unwrap();
        for player in players {
            registry
                .join_room(&snapshot.room_id, player, &format!("name-{player}"))
                .await
                .unwrap();
        }
        snapshot.room_id
    }

    #[tokio::test]
    async fn test_create_room_defaults() {
        let registry = registry();
        let snapshot = registry
            .create_room("host", CreateRoomRequest::new("math", "Hana"))
            .await
            .unwrap();

        assert_eq!(snapshot.room_id.len(), 6);
        let stored = registry.get_room(&snapshot.room_id).await.unwrap().unwrap();
        assert_eq!(stored.status(), RoomStatus::Waiting);
        assert_eq!(stored.player_count(), 1);
        assert_eq!(stored.meta.max_players, 4);
        assert!(stored.has_consistent_host());
    }

    #[tokio::test]
    async fn test_create_lobby_room() {
        let registry = registry();
        let snapshot = registry
            .create_room("host", CreateRoomRequest::lobby("Hana"))
            .await
            .unwrap();
        assert_eq!(snapshot.room.status(), RoomStatus::Lobby);
    }

    #[tokio::test]
    async fn test_create_retries_on_collision() {
        let repo = RoomRepository::new(Arc::new(InMemoryRealtimeStore::new()));
        let registry = RoomRegistry::with_code_generator(
            repo,
            test_config(),
            Arc::new(ScriptedCodes::new(&["AAAA11", "AAAA11", "BBBB22"])),
        );

        let first = registry
            .create_room("h1", CreateRoomRequest::new("math", "Hana"))
            .await
            .unwrap();
        let second = registry
            .create_room("h2", CreateRoomRequest::new("math", "Hiro"))
            .await
            .unwrap();

        assert_eq!(first.room_id, "AAAA11");
        assert_eq!(second.room_id, "BBBB22");
    }

    #[tokio::test]
    async fn test_create_gives_up_after_bounded_attempts() {
        let repo = RoomRepository::new(Arc::new(InMemoryRealtimeStore::new()));
        let registry = RoomRegistry::with_code_generator(
            repo,
            test_config(),
            Arc::new(ScriptedCodes::new(&["AAAA11", "AAAA11", "AAAA11", "AAAA11"])),
        );
        registry
            .create_room("h1", CreateRoomRequest::new("math", "Hana"))
            .await
            .unwrap();

        let result = registry
            .create_room("h2", CreateRoomRequest::new("math", "Hiro"))
            .await;
        assert!(matches!(result, Err(AppError::RoomCodeExhausted(3))));
    }

    #[tokio::test]
    async fn test_create_validates_before_writing() {
        let registry = registry();

        let bad_name = registry
            .create_room("host", CreateRoomRequest::new("math", "H"))
            .await;
        assert!(matches!(bad_name, Err(AppError::Validation(_))));

        let bad_size = registry
            .create_room(
                "host",
                CreateRoomRequest::new("math", "Hana").with_max_players(1),
            )
            .await;
        assert!(matches!(bad_size, Err(AppError::Validation(_))));

        let bad_game = registry
            .create_room("host", CreateRoomRequest::new("no spaces", "Hana"))
            .await;
        assert!(matches!(bad_game, Err(AppError::Validation(_))));

        assert!(registry.list_rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_join_room_appends_one_player() {
        let registry = registry();
        let room_id = room_with_players(&registry, &[]).await;

        let snapshot = registry
            .join_room(&room_id.to_lowercase(), "p1", " Pat ")
            .await
            .unwrap();

        assert_eq!(snapshot.room.player_count(), 2);
        let record = snapshot.room.player("p1").unwrap();
        assert_eq!(record.name, "Pat");
        assert!(!record.is_host);
        assert!(record.online);
    }

    #[tokio::test]
    async fn test_join_errors_are_distinguishable() {
        let registry = registry();

        let missing = registry.join_room("NOPE00", "p1", "Pat").await;
        assert!(matches!(missing, Err(AppError::RoomNotFound(_))));

        let room_id = room_with_players(&registry, &["p1"]).await;
        let duplicate = registry.join_room(&room_id, "p1", "Pat").await;
        assert!(matches!(duplicate, Err(AppError::AlreadyInRoom(_))));

        registry
            .repository()
            .mutate(&room_id, |room| {
                room.meta.status = RoomStatus::Playing;
                Ok(())
            })
            .await
            .unwrap();
        let playing = registry.join_room(&room_id, "p2", "Pia").await;
        assert!(matches!(
            playing,
            Err(AppError::RoomNotJoinable {
                status: RoomStatus::Playing,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_join_full_room() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1", "p2", "p3"]).await;

        let result = registry.join_room(&room_id, "p4", "Quinn").await;
        assert!(matches!(result, Err(AppError::RoomFull(_))));
    }

    #[tokio::test]
    async fn test_concurrent_joins_respect_capacity() {
        let registry = Arc::new(registry());
        let room_id = room_with_players(&registry, &["p1"]).await;

        let handles = (0..5)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let room_id = room_id.clone();
                tokio::spawn(async move {
                    registry
                        .join_room(&room_id, &format!("c{i}"), &format!("player-{i}"))
                        .await
                })
            })
            .collect::<Vec<_>>();

        let results = futures::future::join_all(handles).await;
        let successes = results.into_iter().filter_map(|r| r.unwrap().ok()).count();
        assert_eq!(successes, 2);

        let room = registry.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.player_count(), 4);
    }

    #[tokio::test]
    async fn test_non_host_leave() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1"]).await;

        let outcome = registry.leave_room(&room_id, "p1").await.unwrap();
        assert_eq!(outcome, LeaveOutcome::Left);

        let room = registry.get_room(&room_id).await.unwrap().unwrap();
        assert!(!room.has_player("p1"));
        assert!(room.has_consistent_host());
    }

    #[tokio::test]
    async fn test_host_leave_hands_off_in_join_order() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1", "p2"]).await;

        let outcome = registry.leave_room(&room_id, "host").await.unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome::HostTransferred {
                new_host_id: "p1".to_string()
            }
        );

        let room = registry.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.host_id(), "p1");
        assert!(room.has_consistent_host());
        assert_eq!(room.player_count(), 2);
    }

    #[tokio::test]
    async fn test_handoff_prefers_online_players() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1", "p2"]).await;
        registry
            .repository()
            .mutate(&room_id, |room| {
                room.player_mut("p1").unwrap().online = false;
                Ok(())
            })
            .await
            .unwrap();

        let outcome = registry.leave_room(&room_id, "host").await.unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome::HostTransferred {
                new_host_id: "p2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_host_leaving_alone_closes_then_deletes() {
        let registry = registry();
        let room_id = room_with_players(&registry, &[]).await;

        let store = registry.repository().store().clone();
        let mut sub = store.subscribe(&format!("rooms/{room_id}/meta/status")).await.unwrap();
        assert_eq!(sub.next().await.unwrap(), Some(json!("waiting")));

        let outcome = registry.leave_room(&room_id, "host").await.unwrap();
        assert_eq!(outcome, LeaveOutcome::RoomClosed);

        // subscribers see the closed status before the deletion
        assert_eq!(sub.next().await.unwrap(), Some(json!("closed")));
        assert_eq!(sub.next().await.unwrap(), None);
        assert!(registry.get_room(&room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_leave_when_not_member() {
        let registry = registry();
        let room_id = room_with_players(&registry, &[]).await;

        let result = registry.leave_room(&room_id, "stranger").await;
        assert!(matches!(result, Err(AppError::NotInRoom)));
    }

    #[tokio::test]
    async fn test_host_leave_reports_deletion_when_only_exited_players_remain() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1", "p2"]).await;
        registry
            .repository()
            .mutate(&room_id, |room| {
                for id in ["p1", "p2"] {
                    let player = room.player_mut(id).unwrap();
                    player.finished = true;
                    player.exited = true;
                }
                Ok(())
            })
            .await
            .unwrap();

        let outcome = registry.leave_room(&room_id, "host").await.unwrap();
        assert_eq!(outcome, LeaveOutcome::RoomDeleted);
        assert!(registry.get_room(&room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_leaving_a_room_closed_by_host_disconnect() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1", "p2"]).await;
        registry
            .repository()
            .mutate(&room_id, |room| {
                room.meta.status = RoomStatus::Closed;
                room.meta.closed_reason = Some(HOST_DISCONNECTED_REASON.to_string());
                room.player_mut("host").unwrap().online = false;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(registry.leave_room(&room_id, "p1").await.unwrap(), LeaveOutcome::Left);
        let room = registry.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.host_id(), "host");
        assert_eq!(room.player_count(), 2);

        // the last online player out takes the room with them
        assert_eq!(
            registry.leave_room(&room_id, "p2").await.unwrap(),
            LeaveOutcome::RoomDeleted
        );
        assert!(registry.get_room(&room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_end_room_is_host_only_and_schedules_deletion() {
        let registry = registry();
        let room_id = room_with_players(&registry, &["p1"]).await;

        let denied = registry.end_room(&room_id, "p1").await;
        assert!(matches!(denied, Err(AppError::NotHost)));

        let handle = registry.end_room(&room_id, "host").await.unwrap();
        let room = registry.get_room(&room_id).await.unwrap().unwrap();
        assert_eq!(room.status(), RoomStatus::Ended);

        handle.await.unwrap();
        assert!(registry.get_room(&room_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_room_codes_unique_across_creations() {
        let registry = registry();
        let mut codes = std::collections::HashSet::new();
        for i in 0..25 {
            let snapshot = registry
                .create_room(&format!("host-{i}"), CreateRoomRequest::new("math", "Hana"))
                .await
                .unwrap();
            assert!(codes.insert(snapshot.room_id));
        }
        assert_eq!(registry.list_rooms().await.unwrap().len(), 25);
    }
}
