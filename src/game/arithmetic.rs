use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use strum_macros::Display;
use tracing::{debug, info};

use super::adapter::{EngineEvent, EngineReporter, GameAdapter};
use crate::content::PreparedContent;
use crate::room::models::ContentPayload;
use crate::shared::AppError;

pub const POINTS_PER_ANSWER: i64 = 10;
const MAX_QUESTIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Operation {
    #[serde(rename = "+")]
    #[strum(serialize = "+")]
    Add,
    #[serde(rename = "-")]
    #[strum(serialize = "-")]
    Subtract,
    #[serde(rename = "*")]
    #[strum(serialize = "*")]
    Multiply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub left: i64,
    pub right: i64,
    pub op: Operation,
    pub answer: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillConfig {
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default = "default_max_operand")]
    pub max_operand: i64,
    /// Filled in by the host before generation when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_question_count() -> usize {
    10
}

fn default_max_operand() -> i64 {
    12
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            question_count: default_question_count(),
            max_operand: default_max_operand(),
            seed: None,
        }
    }
}

/// Same seed and config, same questions
pub fn generate_questions(question_count: usize, max_operand: i64, seed: u64) -> Vec<Question> {
    let mut rng = StdRng::seed_from_u64(seed);
    let max_operand = max_operand.max(1);

    (0..question_count)
        .map(|_| {
            let op = match rng.random_range(0..3) {
                0 => Operation::Add,
                1 => Operation::Subtract,
                _ => Operation::Multiply,
            };
            let mut left = rng.random_range(1..=max_operand);
            let mut right = rng.random_range(1..=max_operand);
            if op == Operation::Subtract && right > left {
                std::mem::swap(&mut left, &mut right);
            }
            let answer = match op {
                Operation::Add => left + right,
                Operation::Subtract => left - right,
                Operation::Multiply => left * right,
            };
            Question {
                left,
                right,
                op,
                answer,
            }
        })
        .collect()
}

struct DrillRun {
    questions: Vec<Question>,
    current: usize,
    correct: usize,
    score: i64,
    started: Instant,
    reporter: EngineReporter,
}

/// Reference engine: a seeded arithmetic drill shared verbatim by every player
#[derive(Default)]
pub struct ArithmeticDrill {
    config: DrillConfig,
    run: Mutex<Option<DrillRun>>,
    waiting: AtomicBool,
}

impl ArithmeticDrill {
    pub fn new(config: DrillConfig) -> Self {
        Self {
            config,
            run: Mutex::new(None),
            waiting: AtomicBool::new(false),
        }
    }

    /// The question the player is currently on
    pub fn current_question(&self) -> Option<Question> {
        let run = self.run.lock().ok()?;
        let run = run.as_ref()?;
        run.questions.get(run.current).cloned()
    }

    /// Answers the current question, returning whether it was right
    pub fn answer(&self, value: i64) -> Result<bool, AppError> {
        let mut guard = self.run.lock().map_err(|_| AppError::Internal)?;
        let run = guard
            .as_mut()
            .ok_or_else(|| AppError::Validation("Game has not started".to_string()))?;
        let question = run
            .questions
            .get(run.current)
            .ok_or_else(|| AppError::Validation("No questions left".to_string()))?;

        let correct = question.answer == value;
        run.current += 1;
        run.reporter.report(EngineEvent::AnswerSubmitted { correct });
        if correct {
            run.correct += 1;
            run.score += POINTS_PER_ANSWER;
            run.reporter.report(EngineEvent::ScoreChanged { score: run.score });
        }

        if run.current == run.questions.len() {
            let total = run.questions.len();
            let mut details = Map::new();
            details.insert("correct".to_string(), json!(run.correct));
            details.insert("wrong".to_string(), json!(total - run.correct));
            details.insert(
                "accuracy".to_string(),
                json!((run.correct * 100).checked_div(total).unwrap_or(0)),
            );
            info!(score = run.score, correct = run.correct, total, "Drill finished");
            run.reporter.report(EngineEvent::Finished {
                score: run.score,
                time_ms: Some(run.started.elapsed().as_millis() as u64),
                details,
            });
        }
        Ok(correct)
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameAdapter for ArithmeticDrill {
    fn game_type(&self) -> &str {
        "math"
    }

    fn get_game_config(&self) -> Value {
        json!(self.config)
    }

    async fn prepare_multiplayer_game(&self, config: &Value) -> Result<PreparedContent, AppError> {
        let mut config: DrillConfig = if config.is_null() {
            self.config.clone()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| AppError::Validation(format!("Invalid drill config: {e}")))?
        };
        if config.question_count == 0 || config.question_count > MAX_QUESTIONS {
            return Err(AppError::Validation(format!(
                "Question count must be between 1 and {MAX_QUESTIONS}"
            )));
        }
        let seed = *config.seed.get_or_insert_with(|| rand::rng().random());

        let questions = generate_questions(config.question_count, config.max_operand, seed);
        debug!(seed, questions = questions.len(), "Drill content generated");

        Ok(PreparedContent {
            data: serde_json::to_value(&questions)?,
            config: serde_json::to_value(&config)?,
        })
    }

    fn start_multiplayer_game(
        &self,
        payload: &ContentPayload,
        reporter: EngineReporter,
    ) -> Result<(), AppError> {
        let questions: Vec<Question> = serde_json::from_value(payload.data.clone())?;
        if questions.is_empty() {
            return Err(AppError::Validation("Drill has no questions".to_string()));
        }

        reporter.report(EngineEvent::Started);
        let mut run = self.run.lock().map_err(|_| AppError::Internal)?;
        *run = Some(DrillRun {
            questions,
            current: 0,
            correct: 0,
            score: 0,
            started: Instant::now(),
            reporter,
        });
        Ok(())
    }

    fn get_current_score(&self) -> i64 {
        self.run
            .lock()
            .ok()
            .and_then(|run| run.as_ref().map(|r| r.score))
            .unwrap_or(0)
    }

    fn on_room_left(&self) {
        if let Ok(mut run) = self.run.lock() {
            run.take();
        }
    }

    fn on_waiting_for_content(&self, waiting: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
    }
}
