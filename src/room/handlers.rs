use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{code::normalize_room_code, repository::RoomRepository, types::RoomSummary};
use crate::results::Leaderboard;
use crate::shared::{AppError, AppState};
use crate::store::path;

/// HTTP handler for listing all rooms
///
/// GET /rooms
/// Returns a summary of every live room
#[instrument(name = "list_rooms", skip(state))]
pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    let repository = RoomRepository::new(Arc::clone(&state.store));
    let rooms: Vec<RoomSummary> = repository
        .list_rooms()
        .await?
        .iter()
        .map(RoomSummary::from)
        .collect();

    info!(room_count = rooms.len(), "Rooms listed successfully");
    Ok(Json(rooms))
}

/// HTTP handler for inspecting one room
///
/// GET /rooms/:room_id
/// Returns the raw record exactly as clients see it in the store
#[instrument(name = "get_room", skip(state))]
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let room_id = normalize_room_code(&room_id)?;
    let record = state
        .store
        .get(&path::room(&room_id))
        .await?
        .ok_or(AppError::RoomNotFound(room_id))?;

    Ok(Json(record))
}

/// GET /rooms/:room_id/leaderboard
#[instrument(name = "get_leaderboard", skip(state))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Leaderboard>, AppError> {
    let room_id = normalize_room_code(&room_id)?;
    let repository = RoomRepository::new(Arc::clone(&state.store));
    let room = repository
        .get_room(&room_id)
        .await?
        .ok_or(AppError::RoomNotFound(room_id))?;

    Ok(Json(Leaderboard::from_room(&room)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::models::{ResultRecord, Room, RoomStatus};
    use crate::shared::test_utils::AppStateBuilder;
    use crate::store::{InMemoryRealtimeStore, RealtimeStore};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use serde_json::json;
    use tower::ServiceExt; // for `oneshot`

    async fn seeded_app() -> (Router, Arc<InMemoryRealtimeStore>) {
        let store = Arc::new(InMemoryRealtimeStore::new());
        let mut room = Room::new(
            "host".to_string(),
            "Hana".to_string(),
            Some("math".to_string()),
            json!({"questionCount": 5}),
            4,
            1_000,
        );
        room.meta.status = RoomStatus::Playing;
        room.results.insert(
            "host".to_string(),
            ResultRecord {
                score: 40,
                time: Some(9_000),
                details: Default::default(),
                finished_at: 2_000,
            },
        );
        store
            .set(&path::room("ABCD23"), serde_json::to_value(&room).unwrap())
            .await
            .unwrap();

        let app_state = AppStateBuilder::new().with_store(store.clone()).build();
        let app = Router::new()
            .route("/rooms", get(list_rooms))
            .route("/rooms/:room_id", get(get_room))
            .route("/rooms/:room_id/leaderboard", get(get_leaderboard))
            .with_state(app_state);
        (app, store)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_rooms_handler() {
        let (app, _store) = seeded_app().await;

        let response = app.oneshot(get_request("/rooms")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rooms: Vec<RoomSummary> = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "ABCD23");
        assert_eq!(rooms[0].host_name.as_deref(), Some("Hana"));
        assert_eq!(rooms[0].status, RoomStatus::Playing);
        assert_eq!(rooms[0].player_count, 1);
    }

    #[tokio::test]
    async fn test_get_room_returns_wire_tree() {
        let (app, _store) = seeded_app().await;

        // codes are normalized, so lower case works too
        let response = app.oneshot(get_request("/rooms/abcd23")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = body_json(response).await;
        assert_eq!(record["meta"]["hostId"], "host");
        assert_eq!(record["meta"]["status"], "playing");
        assert_eq!(record["players"]["host"]["isHost"], true);
    }

    #[tokio::test]
    async fn test_get_room_not_found() {
        let (app, _store) = seeded_app().await;

        let response = app.oneshot(get_request("/rooms/ZZZZ99")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_room_rejects_bad_code() {
        let (app, _store) = seeded_app().await;

        let response = app.oneshot(get_request("/rooms/ab")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_leaderboard_handler() {
        let (app, _store) = seeded_app().await;

        let response = app
            .oneshot(get_request("/rooms/ABCD23/leaderboard"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let board = body_json(response).await;
        assert_eq!(board["ranking"][0]["playerId"], "host");
        assert_eq!(board["ranking"][0]["rank"], 1);
        assert_eq!(board["ranking"][0]["score"], 40);
    }
}
