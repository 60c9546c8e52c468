use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SyncConfig;
use crate::room::models::RoomStatus;
use crate::store::RealtimeStore;

/// Shared application state for the inspector surface
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RealtimeStore>,
    pub config: Arc<SyncConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn RealtimeStore>, config: Arc<SyncConfig>) -> Self {
        Self { store, config }
    }
}

/// Milliseconds since the Unix epoch, the timestamp unit of the wire schema
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Coarse classification used by callers to pick how a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input caught before any store write
    Validation,
    /// A read-then-check precondition did not hold
    Precondition,
    /// The store could not be reached or refused the request
    Connectivity,
    /// The room went away underneath the caller (closed, deleted, kicked)
    RoomLifecycle,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Room is full: {0}")]
    RoomFull(String),

    #[error("Room {room_id} cannot be joined while {status}")]
    RoomNotJoinable { room_id: String, status: RoomStatus },

    #[error("Already in room: {0}")]
    AlreadyInRoom(String),

    #[error("Only the host can do that")]
    NotHost,

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("The host cannot kick themselves")]
    CannotKickSelf,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: RoomStatus, to: RoomStatus },

    #[error("No result submitted yet; finish the game before exiting")]
    NotFinished,

    #[error("Game content was already published for this round")]
    ContentAlreadyPublished,

    #[error("Game content is {size} bytes, limit is {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("Timed out waiting for the host to publish game content")]
    ContentWaitTimeout,

    #[error("Room was closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    RoomClosed(Option<String>),

    #[error("Removed from room")]
    RemovedFromRoom,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Could not find a free room code after {0} attempts")]
    RoomCodeExhausted(u32),

    #[error("Not currently in a room")]
    NotInRoom,

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::ContentTooLarge { .. } => ErrorKind::Validation,
            AppError::RoomNotFound(_)
            | AppError::RoomFull(_)
            | AppError::RoomNotJoinable { .. }
            | AppError::AlreadyInRoom(_)
            | AppError::NotHost
            | AppError::PlayerNotFound(_)
            | AppError::CannotKickSelf
            | AppError::InvalidTransition { .. }
            | AppError::ContentAlreadyPublished
            | AppError::NotFinished
            | AppError::RoomCodeExhausted(_)
            | AppError::NotInRoom => ErrorKind::Precondition,
            AppError::Store(_)
            | AppError::Connectivity(_)
            | AppError::JwtError(_)
            | AppError::Unauthorized(_) => ErrorKind::Connectivity,
            AppError::ContentWaitTimeout
            | AppError::RoomClosed(_)
            | AppError::RemovedFromRoom
            | AppError::Cancelled => ErrorKind::RoomLifecycle,
            AppError::Serialization(_) | AppError::Internal => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::RoomNotFound(_) | AppError::PlayerNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotHost => StatusCode::FORBIDDEN,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Precondition | ErrorKind::RoomLifecycle => StatusCode::CONFLICT,
                ErrorKind::Connectivity => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        assert_eq!(
            AppError::Validation("bad name".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::RoomFull("ABC123".to_string()).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(AppError::NotHost.kind(), ErrorKind::Precondition);
        assert_eq!(
            AppError::Store("unreachable".to_string()).kind(),
            ErrorKind::Connectivity
        );
        assert_eq!(AppError::RoomClosed(None).kind(), ErrorKind::RoomLifecycle);
    }

    #[test]
    fn test_room_closed_message_includes_reason() {
        let err = AppError::RoomClosed(Some("host_left".to_string()));
        assert_eq!(err.to_string(), "Room was closed: host_left");

        let err = AppError::RoomClosed(None);
        assert_eq!(err.to_string(), "Room was closed: no reason given");
    }

    #[test]
    fn test_not_joinable_message_names_status() {
        let err = AppError::RoomNotJoinable {
            room_id: "ABC123".to_string(),
            status: RoomStatus::Playing,
        };
        assert_eq!(err.to_string(), "Room ABC123 cannot be joined while playing");
    }
}
