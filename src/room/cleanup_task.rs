use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use super::models::{Room, RoomStatus};
use super::repository::RoomRepository;
use crate::config::SyncConfig;
use crate::shared::{now_millis, AppError};
use crate::store::{path, TransactionDecision};

/// Configuration for the cleanup task
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// How often to run the cleanup task
    pub cleanup_interval: Duration,
    /// How long a room may go without any player activity
    pub inactivity_threshold: Duration,
    pub closed_grace: Duration,
    pub ended_ttl: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for CleanupConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            cleanup_interval: config.sweep_interval,
            inactivity_threshold: config.stale_player_threshold,
            closed_grace: config.closed_grace,
            ended_ttl: config.ended_room_ttl,
        }
    }
}

/// Why the sweeper removed a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepReason {
    /// Not a parseable room, e.g. a hook write that landed after deletion
    Malformed,
    /// No players, every player has exited, or closed with no one online
    Empty,
    /// Closed or ended for longer than its grace period
    Expired(RoomStatus),
    /// No player activity within the inactivity threshold
    Stale,
}

/// Decides whether a raw room record should be swept at time `now`
pub fn sweep_reason(value: &Value, config: &CleanupConfig, now: i64) -> Option<SweepReason> {
    let Ok(room) = serde_json::from_value::<Room>(value.clone()) else {
        return Some(SweepReason::Malformed);
    };

    if room.is_garbage() {
        return Some(SweepReason::Empty);
    }

    let idle = Duration::from_millis(now.saturating_sub(room.last_activity()).max(0) as u64);
    match room.status() {
        RoomStatus::Closed if idle >= config.closed_grace => {
            Some(SweepReason::Expired(RoomStatus::Closed))
        }
        RoomStatus::Ended if idle >= config.ended_ttl => Some(SweepReason::Expired(RoomStatus::Ended)),
        _ if idle >= config.inactivity_threshold => Some(SweepReason::Stale),
        _ => None,
    }
}

/// Starts the background cleanup task that periodically removes dead rooms
#[instrument(skip(repository))]
pub async fn start_cleanup_task(repository: RoomRepository, config: CleanupConfig) {
    info!(
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        inactivity_threshold_secs = config.inactivity_threshold.as_secs(),
        "Starting room cleanup background task"
    );

    let mut cleanup_interval = interval(config.cleanup_interval);

    loop {
        cleanup_interval.tick().await;

        debug!("Running room cleanup task");

        match sweep_stale_rooms(&repository, &config, now_millis()).await {
            Ok(0) => debug!("No rooms to clean up"),
            Ok(deleted_count) => info!(deleted_count, "Room cleanup completed"),
            Err(e) => error!(error = %e, "Room cleanup task failed"),
        }
    }
}

/// Deletes every room the sweeper considers dead and returns how many went
#[instrument(skip(repository, config))]
pub async fn sweep_stale_rooms(
    repository: &RoomRepository,
    config: &CleanupConfig,
    now: i64,
) -> Result<usize, AppError> {
    let candidates: Vec<String> = repository
        .list_raw()
        .await?
        .into_iter()
        .filter(|(_, value)| sweep_reason(value, config, now).is_some())
        .map(|(room_id, _)| room_id)
        .collect();

    if candidates.is_empty() {
        return Ok(0);
    }

    let mut deleted_count = 0;
    for room_id in candidates {
        // re-evaluated under the store lock; a heartbeat since the scan keeps the room
        let mut reason = None;
        let outcome = repository
            .store()
            .transaction(&path::room(&room_id), &mut |current: Option<Value>| {
                reason = current.as_ref().and_then(|v| sweep_reason(v, config, now));
                match reason {
                    Some(_) => TransactionDecision::Commit(None),
                    None => TransactionDecision::Abort,
                }
            })
            .await;

        match outcome {
            Ok(outcome) if outcome.committed => {
                deleted_count += 1;
                info!(room_id = %room_id, reason = ?reason, "Swept room");
            }
            Ok(_) => debug!(room_id = %room_id, "Room revived before sweep"),
            Err(e) => warn!(room_id = %room_id, error = %e, "Failed to sweep room"),
        }
    }

    Ok(deleted_count)
}

/// Deletes an ended room after `delay` unless it has been deleted or reused by then
pub fn schedule_room_deletion(
    repository: RoomRepository,
    room_id: String,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;

        let outcome = repository
            .store()
            .transaction(&path::room(&room_id), &mut |current: Option<Value>| {
                let ended = current
                    .and_then(|v| serde_json::from_value::<Room>(v).ok())
                    .is_some_and(|room| room.status() == RoomStatus::Ended);
                if ended {
                    TransactionDecision::Commit(None)
                } else {
                    TransactionDecision::Abort
                }
            })
            .await;

        match outcome {
            Ok(outcome) if outcome.committed => {
                info!(room_id = %room_id, "Ended room deleted")
            }
            Ok(_) => debug!(room_id = %room_id, "Ended room already gone"),
            Err(e) => warn!(room_id = %room_id, error = %e, "Scheduled room deletion failed"),
        }
    })
}
