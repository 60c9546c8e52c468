use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::content::PreparedContent;
use crate::room::models::{ContentPayload, PlayerEntry};
use crate::shared::AppError;

/// Lifecycle facts a game engine reports while it runs
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started,
    ScoreChanged {
        score: i64,
    },
    AnswerSubmitted {
        correct: bool,
    },
    Finished {
        score: i64,
        time_ms: Option<u64>,
        details: Map<String, Value>,
    },
}

/// Handle a running engine uses to report back to the session
#[derive(Debug, Clone)]
pub struct EngineReporter {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Returns `false` once nobody is listening any more
    pub fn report(&self, event: EngineEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// The uniform shim between a room session and one mini-game engine
///
/// The session never reaches into the engine; it only calls these methods
/// and listens to what the engine reports through its [`EngineReporter`].
#[async_trait]
pub trait GameAdapter: Send + Sync {
    /// Route key of the game, e.g. `math`
    fn game_type(&self) -> &str;

    /// Configuration used when the room did not specify one
    fn get_game_config(&self) -> Value;

    /// Host only. Generates the shared content for `config`.
    ///
    /// Any randomness must be seeded and the seed recorded in the returned
    /// config, so the payload is never regenerated per player.
    async fn prepare_multiplayer_game(&self, config: &Value) -> Result<PreparedContent, AppError>;

    /// Hands control to the engine with the payload every player shares
    fn start_multiplayer_game(
        &self,
        payload: &ContentPayload,
        reporter: EngineReporter,
    ) -> Result<(), AppError>;

    fn get_current_score(&self) -> i64;

    fn on_players_update(&self, _players: &[PlayerEntry]) {}

    fn on_room_left(&self) {}

    fn on_game_data_received(&self, _payload: &ContentPayload) {}

    fn on_game_state_update(&self, _state: &Value) {}

    /// Shows or hides the "waiting for host" indicator
    fn on_waiting_for_content(&self, _waiting: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reporter_delivers_in_order() {
        let (reporter, mut events) = EngineReporter::channel();
        assert!(reporter.report(EngineEvent::Started));
        assert!(reporter.report(EngineEvent::ScoreChanged { score: 10 }));

        assert_eq!(events.recv().await, Some(EngineEvent::Started));
        assert_eq!(events.recv().await, Some(EngineEvent::ScoreChanged { score: 10 }));
    }

    #[tokio::test]
    async fn test_reporter_notices_closed_receiver() {
        let (reporter, events) = EngineReporter::channel();
        drop(events);
        assert!(!reporter.report(EngineEvent::Started));
    }
}
