use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::adapter::{EngineEvent, EngineReporter, GameAdapter};
use crate::controller::WeakSessionController;
use crate::event::{RoomEvent, RoomEventError, RoomEventHandler};
use crate::results::ResultInput;
use crate::room::models::ContentPayload;
use crate::shared::AppError;

/// Forwards room events to the adapter's optional hooks
pub struct GameAdapterBridge {
    adapter: Arc<dyn GameAdapter>,
}

impl GameAdapterBridge {
    pub fn new(adapter: Arc<dyn GameAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl RoomEventHandler for GameAdapterBridge {
    async fn handle_room_event(
        &self,
        _room_id: &str,
        event: RoomEvent,
    ) -> Result<(), RoomEventError> {
        match event {
            RoomEvent::PlayersUpdated { players } => self.adapter.on_players_update(&players),
            RoomEvent::GameDataReceived { payload } => self.adapter.on_game_data_received(&payload),
            RoomEvent::GameStateUpdated { state } => self.adapter.on_game_state_update(&state),
            _ => {}
        }
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "GameAdapterBridge"
    }
}

/// Shows the waiting indicator until dropped, on every exit path
pub struct WaitingIndicator {
    adapter: Arc<dyn GameAdapter>,
}

impl WaitingIndicator {
    pub fn show(adapter: Arc<dyn GameAdapter>) -> Self {
        adapter.on_waiting_for_content(true);
        Self { adapter }
    }
}

impl Drop for WaitingIndicator {
    fn drop(&mut self) {
        self.adapter.on_waiting_for_content(false);
    }
}

/// Starts the engine on `payload` and pumps what it reports back into the session
pub fn start_engine(
    adapter: Arc<dyn GameAdapter>,
    payload: &ContentPayload,
    controller: WeakSessionController,
) -> Result<JoinHandle<()>, AppError> {
    let (reporter, mut events) = EngineReporter::channel();
    adapter.start_multiplayer_game(payload, reporter)?;
    info!(game_type = adapter.game_type(), round = payload.round, "Game engine started");

    Ok(tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(controller) = controller.upgrade() else {
                debug!("Session dropped, engine pump stopping");
                break;
            };

            match event {
                EngineEvent::Started => debug!("Engine reported start"),
                EngineEvent::AnswerSubmitted { correct } => debug!(correct, "Answer submitted"),
                EngineEvent::ScoreChanged { score } => {
                    if let Err(e) = controller.update_score(score).await {
                        warn!(score, error = %e, "Failed to sync score");
                    }
                }
                EngineEvent::Finished {
                    score,
                    time_ms,
                    details,
                } => {
                    let input = ResultInput {
                        score,
                        time: time_ms,
                        details,
                    };
                    if let Err(e) = controller.finish_game(input).await {
                        warn!(score, error = %e, "Failed to submit result");
                    }
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PreparedContent;
    use crate::room::models::{PlayerEntry, PlayerRecord};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAdapter {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingAdapter {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GameAdapter for RecordingAdapter {
        fn game_type(&self) -> &str {
            "test"
        }

        fn get_game_config(&self) -> Value {
            Value::Null
        }

        async fn prepare_multiplayer_game(
            &self,
            config: &Value,
        ) -> Result<PreparedContent, AppError> {
            Ok(PreparedContent {
                data: json!([]),
                config: config.clone(),
            })
        }

        fn start_multiplayer_game(
            &self,
            _payload: &ContentPayload,
            _reporter: EngineReporter,
        ) -> Result<(), AppError> {
            Ok(())
        }

        fn get_current_score(&self) -> i64 {
            0
        }

        fn on_players_update(&self, players: &[PlayerEntry]) {
            self.calls.lock().unwrap().push(format!("players:{}", players.len()));
        }

        fn on_game_state_update(&self, _state: &Value) {
            self.calls.lock().unwrap().push("state".to_string());
        }

        fn on_waiting_for_content(&self, waiting: bool) {
            self.calls.lock().unwrap().push(format!("waiting:{waiting}"));
        }
    }

    #[tokio::test]
    async fn test_bridge_forwards_hooks() {
        let adapter = Arc::new(RecordingAdapter::default());
        let bridge = GameAdapterBridge::new(adapter.clone());

        let players = vec![PlayerEntry {
            id: "h".to_string(),
            record: PlayerRecord::new("Hana".to_string(), true, 0),
        }];
        bridge
            .handle_room_event("ROOM", RoomEvent::PlayersUpdated { players })
            .await
            .unwrap();
        bridge
            .handle_room_event("ROOM", RoomEvent::GameStateUpdated { state: json!({"phase": 2}) })
            .await
            .unwrap();
        bridge
            .handle_room_event("ROOM", RoomEvent::RoomRemoved)
            .await
            .unwrap();

        assert_eq!(adapter.calls(), vec!["players:1", "state"]);
    }

    #[test]
    fn test_waiting_indicator_hides_on_drop() {
        let adapter = Arc::new(RecordingAdapter::default());
        {
            let _indicator = WaitingIndicator::show(adapter.clone());
        }
        assert_eq!(adapter.calls(), vec!["waiting:true", "waiting:false"]);
    }
}
