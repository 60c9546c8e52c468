use async_trait::async_trait;
use thiserror::Error;

use super::events::RoomEvent;
use crate::shared::AppError;

/// Errors that can occur when handling room events
#[derive(Debug, Error)]
pub enum RoomEventError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Session is gone")]
    SessionGone,

    #[error("Handler error: {0}")]
    HandlerError(String),
}

impl From<AppError> for RoomEventError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::RoomNotFound(room_id) => RoomEventError::RoomNotFound(room_id),
            other => RoomEventError::HandlerError(other.to_string()),
        }
    }
}

/// Trait for components that can handle room events
///
/// This provides a clean interface for reacting to room-specific events
/// without being tied to the store or to a particular game.
#[async_trait]
pub trait RoomEventHandler: Send + Sync {
    /// Handle a room event
    ///
    /// The handler should:
    /// - Process the event appropriately for its purpose
    /// - Handle any necessary state updates or notifications
    /// - Return Ok(()) on success or RoomEventError on failure
    async fn handle_room_event(
        &self,
        room_id: &str,
        event: RoomEvent,
    ) -> Result<(), RoomEventError>;

    /// Get a human-readable name for this handler (for logging/debugging)
    fn handler_name(&self) -> &'static str;
}
