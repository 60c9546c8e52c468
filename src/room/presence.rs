use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::models::{PlayerRecord, PlayerStatus};
use crate::shared::{now_millis, AppError};
use crate::store::{path, ConnectionId, DisconnectAction, RealtimeStore, TransactionDecision};

pub const HOST_DISCONNECTED_REASON: &str = "host_disconnected";

/// What the store does to a player's record when its connection drops uncleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum DisconnectMode {
    /// Keep the record, flip `online` off and mark the player disconnected
    MarkOffline,
    /// Delete the record outright
    RemovePlayer,
}

/// Liveness for one client connection: disconnect hooks plus a heartbeat
pub struct PresenceTracker {
    store: Arc<dyn RealtimeStore>,
    connection: ConnectionId,
    mode: DisconnectMode,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl PresenceTracker {
    /// Opens a store connection the hooks are scoped to
    pub async fn connect(
        store: Arc<dyn RealtimeStore>,
        mode: DisconnectMode,
    ) -> Result<Self, AppError> {
        let connection = store.connect().await?;
        Ok(Self {
            store,
            connection,
            mode,
            heartbeat: Mutex::new(None),
        })
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn mode(&self) -> DisconnectMode {
        self.mode
    }

    /// Arms the player's disconnect hooks
    #[instrument(skip(self), fields(connection = %self.connection, mode = %self.mode))]
    pub async fn register(&self, room_id: &str, player_id: &str) -> Result<(), AppError> {
        match self.mode {
            DisconnectMode::MarkOffline => {
                self.store
                    .on_disconnect(
                        self.connection,
                        &path::player_field(room_id, player_id, "online"),
                        DisconnectAction::Set(json!(false)),
                    )
                    .await?;
                self.store
                    .on_disconnect(
                        self.connection,
                        &path::player_field(room_id, player_id, "status"),
                        DisconnectAction::Set(json!(PlayerStatus::Disconnected)),
                    )
                    .await?;
            }
            DisconnectMode::RemovePlayer => {
                self.store
                    .on_disconnect(
                        self.connection,
                        &path::player(room_id, player_id),
                        DisconnectAction::Remove,
                    )
                    .await?;
            }
        }
        debug!(room_id = %room_id, player_id = %player_id, "Presence hooks registered");
        Ok(())
    }

    /// Arms the room-closing hooks that travel with the host role
    #[instrument(skip(self), fields(connection = %self.connection))]
    pub async fn register_host_hooks(&self, room_id: &str) -> Result<(), AppError> {
        self.store
            .on_disconnect(
                self.connection,
                &path::meta_field(room_id, "status"),
                DisconnectAction::Set(json!("closed")),
            )
            .await?;
        self.store
            .on_disconnect(
                self.connection,
                &path::meta_field(room_id, "closedReason"),
                DisconnectAction::Set(json!(HOST_DISCONNECTED_REASON)),
            )
            .await?;
        info!(room_id = %room_id, "Host disconnect hooks registered");
        Ok(())
    }

    pub async fn cancel_host_hooks(&self, room_id: &str) -> Result<(), AppError> {
        for field in ["status", "closedReason"] {
            self.store
                .cancel_on_disconnect(self.connection, &path::meta_field(room_id, field))
                .await?;
        }
        info!(room_id = %room_id, "Host disconnect hooks cancelled");
        Ok(())
    }

    /// Disarms every hook of this connection. Call before any intentional navigation.
    pub async fn cancel_disconnect_handler(&self) -> Result<(), AppError> {
        self.store.cancel_all_on_disconnect(self.connection).await
    }

    /// Restores `online` and an active status after a reconnection.
    ///
    /// Returns `false` when the player record no longer exists.
    #[instrument(skip(self))]
    pub async fn mark_online(&self, room_id: &str, player_id: &str) -> Result<bool, AppError> {
        let now = now_millis();
        let committed = touch_player(&*self.store, room_id, player_id, |record| {
            record.online = true;
            record.last_seen = Some(now);
            if record.status == PlayerStatus::Disconnected {
                record.status = if record.finished {
                    PlayerStatus::Finished
                } else {
                    PlayerStatus::Active
                };
            }
        })
        .await?;

        if committed {
            info!(room_id = %room_id, player_id = %player_id, "Player back online");
        }
        Ok(committed)
    }

    /// Touches `lastSeen` every `period` until stopped or the record disappears
    pub fn start_heartbeat(&self, room_id: &str, player_id: &str, period: Duration) {
        let store = Arc::clone(&self.store);
        let room_id = room_id.to_string();
        let player_id = player_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let now = now_millis();
                match touch_player(&*store, &room_id, &player_id, |record| {
                    record.last_seen = Some(now)
                })
                .await
                {
                    Ok(true) => debug!(room_id = %room_id, player_id = %player_id, "Heartbeat"),
                    Ok(false) => {
                        info!(room_id = %room_id, player_id = %player_id, "Player gone, heartbeat stopped");
                        break;
                    }
                    Err(e) => warn!(room_id = %room_id, error = %e, "Heartbeat write failed"),
                }
            }
        });

        if let Some(previous) = self.replace_heartbeat(Some(handle)) {
            previous.abort();
        }
    }

    pub fn stop_heartbeat(&self) {
        if let Some(handle) = self.replace_heartbeat(None) {
            handle.abort();
            debug!(connection = %self.connection, "Heartbeat stopped");
        }
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Drops the store connection, letting every armed hook fire
    #[instrument(skip(self), fields(connection = %self.connection))]
    pub async fn disconnect(&self) -> Result<(), AppError> {
        self.stop_heartbeat();
        self.store.disconnect(self.connection).await
    }

    fn replace_heartbeat(&self, handle: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.heartbeat.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, handle),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), handle),
        }
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

/// Rewrites a player's own record in place; never recreates a missing one
async fn touch_player<F>(
    store: &dyn RealtimeStore,
    room_id: &str,
    player_id: &str,
    mut edit: F,
) -> Result<bool, AppError>
where
    F: FnMut(&mut PlayerRecord) + Send,
{
    let outcome = store
        .transaction(
            &path::player(room_id, player_id),
            &mut |current: Option<Value>| {
                let Some(mut record) =
                    current.and_then(|v| serde_json::from_value::<PlayerRecord>(v).ok())
                else {
                    return TransactionDecision::Abort;
                };
                edit(&mut record);
                match serde_json::to_value(&record) {
                    Ok(value) => TransactionDecision::Commit(Some(value)),
                    Err(_) => TransactionDecision::Abort,
                }
            },
        )
        .await?;
    Ok(outcome.committed)
}
