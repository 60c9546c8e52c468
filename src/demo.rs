use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use roomsync::{
    content::WaitOptions,
    game::{ArithmeticDrill, DrillConfig},
    room::types::CreateRoomRequest,
    session::{AnonymousIdentityProvider, IdentityProvider, TokenConfig},
    AppError, RealtimeStore, RoomSessionController, SyncConfig,
};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

struct Seat {
    controller: RoomSessionController,
    drill: Arc<ArithmeticDrill>,
}

async fn seat(
    provider: &AnonymousIdentityProvider,
    store: &Arc<dyn RealtimeStore>,
    config: &Arc<SyncConfig>,
) -> Result<Seat, AppError> {
    let drill = Arc::new(ArithmeticDrill::new(DrillConfig {
        question_count: 5,
        ..DrillConfig::default()
    }));
    let controller = RoomSessionController::builder(provider.issue().await?, Arc::clone(store))
        .with_config(Arc::clone(config))
        .with_adapter(drill.clone())
        .build()
        .await?;
    Ok(Seat { controller, drill })
}

/// Answers every question, getting one in `miss_every` wrong
fn play(drill: &ArithmeticDrill, miss_every: Option<usize>) -> Result<(), AppError> {
    let mut asked = 0;
    while let Some(question) = drill.current_question() {
        asked += 1;
        let wrong = miss_every.is_some_and(|n| asked % n == 0);
        drill.answer(if wrong { question.answer + 1 } else { question.answer })?;
    }
    Ok(())
}

/// Plays a scripted host plus two players session against `store`
#[instrument(skip_all)]
pub async fn run(store: Arc<dyn RealtimeStore>, config: Arc<SyncConfig>) -> Result<(), AppError> {
    let provider = AnonymousIdentityProvider::new(TokenConfig::new());
    let host = seat(&provider, &store, &config).await?;
    let players = [
        seat(&provider, &store, &config).await?,
        seat(&provider, &store, &config).await?,
    ];

    let snapshot = host
        .controller
        .create_room(CreateRoomRequest::new("math", "Demo Host"))
        .await?;
    let room_id = snapshot.room_id;
    info!(room_id = %room_id, "Demo room created");

    let mut waits = Vec::new();
    for (index, player) in players.iter().enumerate() {
        player
            .controller
            .join_room(&room_id, &format!("Demo Player {}", index + 1))
            .await?;
        let controller = player.controller.clone();
        waits.push(tokio::spawn(async move {
            controller.wait_for_game_start(WaitOptions::default()).await
        }));
    }

    host.controller.handle_start_game().await?;
    for wait in waits {
        wait.await.map_err(|_| AppError::Internal)??;
    }

    play(&host.drill, None)?;
    play(&players[0].drill, Some(2))?;
    play(&players[1].drill, Some(3))?;

    let mut leaderboard = host.controller.leaderboard().await.ok_or(AppError::NotInRoom)?;
    let board = tokio::time::timeout(
        SETTLE_TIMEOUT,
        leaderboard.wait_for(|board| board.ranking.len() == 3),
    )
    .await
    .map_err(|_| AppError::Connectivity("results never settled".to_string()))?
    .map_err(|_| AppError::Internal)?
    .clone();

    for entry in &board.ranking {
        info!(
            rank = entry.rank,
            name = %entry.name,
            score = entry.score,
            time_ms = ?entry.time,
            "Demo result"
        );
    }

    for seat in players.iter().chain(std::iter::once(&host)) {
        let outcome = seat.controller.exit_after_results().await?;
        info!(session_id = %seat.controller.session_id(), outcome = ?outcome, "Demo seat exited");
    }
    Ok(())
}
