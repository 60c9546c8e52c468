#![allow(dead_code)] // Test utilities may not all be used in every test

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use roomsync::{
    content::PreparedContent,
    game::{EngineEvent, EngineReporter, GameAdapter},
    room::models::{ContentPayload, PlayerEntry},
    AppError,
};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Game adapter that records every call the session makes on it
///
/// Each prepared payload carries a per-instance counter, so content that was
/// regenerated instead of shared would not compare equal.
#[derive(Default)]
pub struct MockGameAdapter {
    prepare_calls: AtomicUsize,
    started: Mutex<Vec<ContentPayload>>,
    reporter: Mutex<Option<EngineReporter>>,
    waiting_history: Mutex<Vec<bool>>,
    players_updates: AtomicUsize,
    room_left: AtomicUsize,
    score: AtomicI64,
}

impl MockGameAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn started_payloads(&self) -> Vec<ContentPayload> {
        self.started.lock().unwrap().clone()
    }

    pub fn waiting_history(&self) -> Vec<bool> {
        self.waiting_history.lock().unwrap().clone()
    }

    pub fn players_updates(&self) -> usize {
        self.players_updates.load(Ordering::SeqCst)
    }

    pub fn room_left_count(&self) -> usize {
        self.room_left.load(Ordering::SeqCst)
    }

    /// Reports a live score the way a running engine would
    pub fn report_score(&self, score: i64) {
        self.score.store(score, Ordering::SeqCst);
        self.report(EngineEvent::ScoreChanged { score });
    }

    /// Reports the end of the game the way a running engine would
    pub fn finish(&self, score: i64, time_ms: Option<u64>) {
        self.score.store(score, Ordering::SeqCst);
        let mut details = Map::new();
        details.insert("correct".to_string(), json!(score / 10));
        self.report(EngineEvent::Finished {
            score,
            time_ms,
            details,
        });
    }

    fn report(&self, event: EngineEvent) {
        let reporter = self.reporter.lock().unwrap();
        let reporter = reporter.as_ref().expect("engine was never started");
        assert!(reporter.report(event), "engine pump is gone");
    }
}

#[async_trait]
impl GameAdapter for MockGameAdapter {
    fn game_type(&self) -> &str {
        "math"
    }

    fn get_game_config(&self) -> Value {
        json!({"questionCount": 3, "seed": 7})
    }

    async fn prepare_multiplayer_game(&self, config: &Value) -> Result<PreparedContent, AppError> {
        let call = self.prepare_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PreparedContent {
            data: json!({
                "questions": [[2, "+", 3], [7, "*", 6], [9, "-", 4]],
                "generation": call,
            }),
            config: config.clone(),
        })
    }

    fn start_multiplayer_game(
        &self,
        payload: &ContentPayload,
        reporter: EngineReporter,
    ) -> Result<(), AppError> {
        reporter.report(EngineEvent::Started);
        self.started.lock().unwrap().push(payload.clone());
        *self.reporter.lock().unwrap() = Some(reporter);
        Ok(())
    }

    fn get_current_score(&self) -> i64 {
        self.score.load(Ordering::SeqCst)
    }

    fn on_players_update(&self, _players: &[PlayerEntry]) {
        self.players_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn on_room_left(&self) {
        self.room_left.fetch_add(1, Ordering::SeqCst);
    }

    fn on_waiting_for_content(&self, waiting: bool) {
        self.waiting_history.lock().unwrap().push(waiting);
    }
}
