use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use super::ranking::Leaderboard;
use crate::controller::CompletionPolicy;
use crate::event::{RoomEvent, RoomEventError, RoomEventHandler};
use crate::room::models::{PlayerRecord, PlayerStatus, ResultRecord, RoomStatus};
use crate::room::repository::RoomRepository;
use crate::shared::{now_millis, AppError};

/// A player's final numbers as reported by the game engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultInput {
    pub score: i64,
    pub time: Option<u64>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// `false` when this player had already submitted for the round
    pub recorded: bool,
    /// Whether this submission flipped the room to `finished`
    pub room_finished: bool,
    pub leaderboard: Leaderboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited,
    /// This exit was the last one; the room is gone
    RoomDeleted,
    /// The room or the player record no longer existed
    AlreadyGone,
}

/// Collects per-player results and handles the finish-then-exit cleanup
#[derive(Clone)]
pub struct ResultAggregator {
    repository: RoomRepository,
    policy: CompletionPolicy,
}

impl ResultAggregator {
    pub fn new(repository: RoomRepository, policy: CompletionPolicy) -> Self {
        Self { repository, policy }
    }

    /// Records the caller's own result and marks them finished
    #[instrument(skip(self, input), fields(score = input.score))]
    pub async fn submit_result(
        &self,
        room_id: &str,
        player_id: &str,
        input: ResultInput,
    ) -> Result<SubmitOutcome, AppError> {
        let now = now_millis();
        let policy = self.policy;

        let mutation = self
            .repository
            .mutate(room_id, |room| {
                let status = room.status();
                if !matches!(status, RoomStatus::Playing | RoomStatus::Finished) {
                    return Err(AppError::InvalidTransition {
                        from: status,
                        to: RoomStatus::Finished,
                    });
                }
                let is_host = room.is_host(player_id);
                let player = room.player_mut(player_id).ok_or(AppError::RemovedFromRoom)?;
                if player.finished {
                    return Ok((false, false));
                }

                player.finished = true;
                player.finished_at = Some(now);
                player.status = PlayerStatus::Finished;
                player.score = player.score.max(input.score);
                room.results.insert(
                    player_id.to_string(),
                    ResultRecord {
                        score: input.score,
                        time: input.time,
                        details: input.details.clone(),
                        finished_at: now,
                    },
                );

                let flip = status == RoomStatus::Playing
                    && match policy {
                        CompletionPolicy::HostFinishes => is_host,
                        CompletionPolicy::AllFinished => {
                            !room.players.values().any(PlayerRecord::is_still_playing)
                        }
                    };
                if flip {
                    room.meta.status = RoomStatus::Finished;
                }
                Ok((true, flip))
            })
            .await?;

        let (recorded, room_finished) = mutation.value;
        let leaderboard = mutation
            .room
            .as_ref()
            .map(Leaderboard::from_room)
            .unwrap_or_default();

        if recorded {
            info!(
                room_id = %room_id,
                player_id = %player_id,
                room_finished,
                "Result submitted"
            );
        } else {
            debug!(room_id = %room_id, player_id = %player_id, "Result already submitted");
        }

        Ok(SubmitOutcome {
            recorded,
            room_finished,
            leaderboard,
        })
    }

    /// Marks the caller exited; the last exit deletes the room.
    /// Only a player with a submitted result may exit.
    #[instrument(skip(self))]
    pub async fn exit(&self, room_id: &str, player_id: &str) -> Result<ExitOutcome, AppError> {
        let now = now_millis();
        let result = self
            .repository
            .mutate(room_id, |room| {
                let player = room.player_mut(player_id).ok_or(AppError::NotInRoom)?;
                if !player.finished {
                    return Err(AppError::NotFinished);
                }
                if !player.exited {
                    player.exited = true;
                    player.exited_at = Some(now);
                }
                Ok(())
            })
            .await;

        match result {
            Ok(mutation) if mutation.deleted() => {
                info!(room_id = %room_id, player_id = %player_id, "Last player exited, room deleted");
                Ok(ExitOutcome::RoomDeleted)
            }
            Ok(_) => {
                info!(room_id = %room_id, player_id = %player_id, "Player exited");
                Ok(ExitOutcome::Exited)
            }
            Err(AppError::RoomNotFound(_)) | Err(AppError::NotInRoom) => {
                debug!(room_id = %room_id, player_id = %player_id, "Exit on a room already gone");
                Ok(ExitOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }
}

/// Recomputes the leaderboard on every players/results change
pub struct LeaderboardSubscriber {
    snapshot: Mutex<(BTreeMap<String, PlayerRecord>, BTreeMap<String, ResultRecord>)>,
    sender: watch::Sender<Leaderboard>,
}

impl LeaderboardSubscriber {
    /// Creates the subscriber together with the first receiver of its board
    pub fn channel() -> (Self, watch::Receiver<Leaderboard>) {
        let (sender, receiver) = watch::channel(Leaderboard::default());
        let subscriber = Self {
            snapshot: Mutex::new((BTreeMap::new(), BTreeMap::new())),
            sender,
        };
        (subscriber, receiver)
    }

    pub fn subscribe(&self) -> watch::Receiver<Leaderboard> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl RoomEventHandler for LeaderboardSubscriber {
    async fn handle_room_event(
        &self,
        room_id: &str,
        event: RoomEvent,
    ) -> Result<(), RoomEventError> {
        let board = {
            let mut snapshot = self
                .snapshot
                .lock()
                .map_err(|_| RoomEventError::HandlerError("leaderboard lock poisoned".to_string()))?;
            match event {
                RoomEvent::PlayersUpdated { players } => {
                    snapshot.0 = players.into_iter().map(|p| (p.id, p.record)).collect();
                }
                RoomEvent::ResultsUpdated { results } => snapshot.1 = results,
                _ => return Ok(()),
            }
            Leaderboard::compute(&snapshot.0, &snapshot.1)
        };

        debug!(
            room_id = %room_id,
            ranked = board.ranking.len(),
            still_playing = board.still_playing.len(),
            "Leaderboard recomputed"
        );
        self.sender.send_replace(board);
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "LeaderboardSubscriber"
    }
}
