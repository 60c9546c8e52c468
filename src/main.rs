mod demo;

use axum::{routing::get, Router};
use roomsync::{
    room::{
        self,
        cleanup_task::{start_cleanup_task, CleanupConfig},
    },
    shared::AppState,
    InMemoryRealtimeStore, RealtimeStore, RoomRepository, SyncConfig,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomsync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting room sync inspector");

    let config = Arc::new(SyncConfig::from_env());
    let store: Arc<dyn RealtimeStore> = Arc::new(InMemoryRealtimeStore::new());
    let app_state = AppState::new(Arc::clone(&store), Arc::clone(&config));

    // Start the stale room sweeper
    tokio::spawn(start_cleanup_task(
        RoomRepository::new(Arc::clone(&store)),
        CleanupConfig::from(config.as_ref()),
    ));

    if std::env::var("ROOMSYNC_DEMO").is_ok_and(|v| v == "1") {
        if let Err(e) = demo::run(Arc::clone(&store), Arc::clone(&config)).await {
            error!(error = %e, "Demo session failed");
        }
    }

    let app = Router::new()
        .route("/rooms", get(room::list_rooms))
        .route("/rooms/:room_id", get(room::get_room))
        .route("/rooms/:room_id/leaderboard", get(room::get_leaderboard))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Inspector running");
    axum::serve(listener, app).await?;

    Ok(())
}
