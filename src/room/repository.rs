use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::models::{Room, RoomSnapshot};
use crate::shared::AppError;
use crate::store::{path, RealtimeStore, TransactionDecision, WriteBatch};

/// Result of a committed room mutation
#[derive(Debug, Clone)]
pub struct RoomMutation<T> {
    pub value: T,
    /// The room after the write, `None` when the write deleted it
    pub room: Option<Room>,
}

impl<T> RoomMutation<T> {
    pub fn deleted(&self) -> bool {
        self.room.is_none()
    }
}

/// Typed access to room records in the realtime store
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn RealtimeStore>,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RealtimeStore> {
        &self.store
    }

    #[instrument(skip(self))]
    pub async fn get_room(&self, room_id: &str) -> Result<Option<Room>, AppError> {
        debug!(room_id = %room_id, "Fetching room");
        match self.store.get(&path::room(room_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, room_id: &str) -> Result<bool, AppError> {
        Ok(self.store.get(&path::room(room_id)).await?.is_some())
    }

    /// Every record under `rooms/`, parsed or not
    pub async fn list_raw(&self) -> Result<Vec<(String, Value)>, AppError> {
        let rooms = match self.store.get(path::ROOMS).await? {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => Vec::new(),
        };
        Ok(rooms)
    }

    #[instrument(skip(self))]
    pub async fn list_rooms(&self) -> Result<Vec<RoomSnapshot>, AppError> {
        let mut rooms = Vec::new();
        for (room_id, value) in self.list_raw().await? {
            match serde_json::from_value::<Room>(value) {
                Ok(room) => rooms.push(RoomSnapshot { room_id, room }),
                Err(e) => warn!(room_id = %room_id, error = %e, "Skipping malformed room record"),
            }
        }
        debug!(room_count = rooms.len(), "Rooms listed");
        Ok(rooms)
    }

    /// Writes `room` only if nothing lives at its code yet
    #[instrument(skip(self, room))]
    pub async fn create_if_absent(&self, room_id: &str, room: &Room) -> Result<bool, AppError> {
        let value = serde_json::to_value(room)?;
        let outcome = self
            .store
            .transaction(&path::room(room_id), &mut |current: Option<Value>| {
                if current.is_some() {
                    TransactionDecision::Abort
                } else {
                    TransactionDecision::Commit(Some(value.clone()))
                }
            })
            .await?;

        if !outcome.committed {
            debug!(room_id = %room_id, "Room code already taken");
        }
        Ok(outcome.committed)
    }

    /// Applies `apply` to the room atomically and bumps `meta.version`.
    ///
    /// The closure runs against the latest stored record; returning an error
    /// aborts without writing. A room left garbage (no players, or everyone
    /// exited) is deleted in the same write.
    pub async fn mutate<T, F>(&self, room_id: &str, mut apply: F) -> Result<RoomMutation<T>, AppError>
    where
        T: Send,
        F: FnMut(&mut Room) -> Result<T, AppError> + Send,
    {
        let mut outcome: Option<Result<RoomMutation<T>, AppError>> = None;

        {
            let mut update = |current: Option<Value>| -> TransactionDecision {
                let Some(value) = current else {
                    outcome = Some(Err(AppError::RoomNotFound(room_id.to_string())));
                    return TransactionDecision::Abort;
                };
                let mut room: Room = match serde_json::from_value(value) {
                    Ok(room) => room,
                    Err(e) => {
                        outcome = Some(Err(e.into()));
                        return TransactionDecision::Abort;
                    }
                };

                match apply(&mut room) {
                    Err(e) => {
                        outcome = Some(Err(e));
                        TransactionDecision::Abort
                    }
                    Ok(value) if room.is_garbage() => {
                        outcome = Some(Ok(RoomMutation { value, room: None }));
                        TransactionDecision::Commit(None)
                    }
                    Ok(value) => {
                        room.meta.version += 1;
                        match serde_json::to_value(&room) {
                            Ok(serialized) => {
                                outcome = Some(Ok(RoomMutation {
                                    value,
                                    room: Some(room),
                                }));
                                TransactionDecision::Commit(Some(serialized))
                            }
                            Err(e) => {
                                outcome = Some(Err(e.into()));
                                TransactionDecision::Abort
                            }
                        }
                    }
                }
            };
            self.store
                .transaction(&path::room(room_id), &mut update)
                .await?;
        }

        let mutation = outcome.unwrap_or(Err(AppError::Internal))?;
        if mutation.deleted() {
            info!(room_id = %room_id, "Room deleted as garbage");
        }
        Ok(mutation)
    }

    #[instrument(skip(self))]
    pub async fn delete_room(&self, room_id: &str) -> Result<(), AppError> {
        info!(room_id = %room_id, "Deleting room");
        self.store.remove(&path::room(room_id)).await
    }

    /// Deletes several rooms in one atomic write
    pub async fn delete_rooms(&self, room_ids: &[String]) -> Result<(), AppError> {
        let batch = room_ids
            .iter()
            .fold(WriteBatch::new(), |batch, id| batch.remove(path::room(id)));
        self.store.update(batch).await
    }
}
