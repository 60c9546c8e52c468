use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::types::{ContentCardinality, PreparedContent, WaitOptions};
use crate::config::SyncConfig;
use crate::room::models::{ContentPayload, Room, RoomStatus};
use crate::room::registry::require_host;
use crate::room::repository::RoomRepository;
use crate::shared::{now_millis, AppError};
use crate::store::path;

/// Host-side publication and player-side consumption of the shared payload
#[derive(Clone)]
pub struct ContentProtocol {
    repository: RoomRepository,
    config: Arc<SyncConfig>,
}

impl ContentProtocol {
    pub fn new(repository: RoomRepository, config: Arc<SyncConfig>) -> Self {
        Self { repository, config }
    }

    pub fn cardinality(&self) -> ContentCardinality {
        self.config.content_cardinality
    }

    /// Writes the host's payload to `gameData` exactly once per round
    #[instrument(skip(self, prepared))]
    pub async fn publish_content(
        &self,
        room_id: &str,
        caller_id: &str,
        prepared: PreparedContent,
    ) -> Result<ContentPayload, AppError> {
        let generated_at = now_millis();
        let size = serde_json::to_vec(&prepared)?.len();
        if size > self.config.max_payload_bytes {
            warn!(room_id = %room_id, size, limit = self.config.max_payload_bytes, "Content too large");
            return Err(AppError::ContentTooLarge {
                size,
                limit: self.config.max_payload_bytes,
            });
        }
        let cardinality = self.cardinality();

        let mutation = self
            .repository
            .mutate(room_id, |room| {
                require_host(room, caller_id)?;
                if room.status() != RoomStatus::Waiting {
                    return Err(AppError::InvalidTransition {
                        from: room.status(),
                        to: RoomStatus::Playing,
                    });
                }
                let already_published = match cardinality {
                    ContentCardinality::OneShot => room.game_data.is_some(),
                    ContentCardinality::MultiRound => room
                        .game_data
                        .as_ref()
                        .is_some_and(|existing| existing.round == room.meta.round),
                };
                if already_published {
                    return Err(AppError::ContentAlreadyPublished);
                }

                let payload = ContentPayload {
                    data: prepared.data.clone(),
                    config: prepared.config.clone(),
                    game_type: room.meta.game_type.clone(),
                    round: room.meta.round,
                    generated_at,
                };
                room.game_data = Some(payload.clone());
                Ok(payload)
            })
            .await?;

        info!(
            room_id = %room_id,
            round = mutation.value.round,
            size,
            "Game content published"
        );
        Ok(mutation.value)
    }

    /// Resolves with the published payload, or with why it never will arrive
    #[instrument(skip(self, options), fields(timeout = ?options.timeout))]
    pub async fn wait_for_content(
        &self,
        room_id: &str,
        player_id: &str,
        options: WaitOptions,
    ) -> Result<ContentPayload, AppError> {
        let mut subscription = self
            .repository
            .store()
            .subscribe(&path::room(room_id))
            .await?;

        let deadline = async {
            match options.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = options.cancel.cancelled() => {
                    debug!(room_id = %room_id, "Content wait cancelled");
                    return Err(AppError::Cancelled);
                }
                _ = &mut deadline => {
                    warn!(room_id = %room_id, "Timed out waiting for host content");
                    return Err(AppError::ContentWaitTimeout);
                }
                value = subscription.next() => {
                    let Some(value) = value else {
                        return Err(AppError::Connectivity("room subscription closed".to_string()));
                    };
                    if let Some(result) = content_wait_step(value, player_id) {
                        match &result {
                            Ok(payload) => info!(room_id = %room_id, round = payload.round, "Game content received"),
                            Err(e) => info!(room_id = %room_id, error = %e, "Content wait ended without content"),
                        }
                        return result;
                    }
                }
            }
        }
    }
}

/// Decides whether one observed room value settles a content wait
fn content_wait_step(
    value: Option<Value>,
    player_id: &str,
) -> Option<Result<ContentPayload, AppError>> {
    let Some(room) = value.and_then(|v| serde_json::from_value::<Room>(v).ok()) else {
        return Some(Err(AppError::RoomClosed(None)));
    };

    if room.status().is_terminal() {
        return Some(Err(AppError::RoomClosed(room.meta.closed_reason)));
    }
    if !room.has_player(player_id) {
        return Some(Err(AppError::RemovedFromRoom));
    }

    room.game_data
        .filter(|payload| payload.round == room.meta.round)
        .map(Ok)
}
