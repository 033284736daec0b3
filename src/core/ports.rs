// src/core/ports.rs

use async_trait::async_trait;

use super::engine::{AnswerRecord, PlayQuestion};

/// Storage failures as the core sees them. The concrete adapter maps its
/// own errors (sqlx and friends) into these.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type PortResult<T> = Result<T, PortError>;

/// The slice of a game the attempt engine needs at play time.
#[derive(Debug, Clone)]
pub struct GameDescriptor {
    pub id: i64,
    pub time_limit: u32,
    pub reveal_answers: bool,
}

/// A finalized attempt, handed to storage exactly once per session.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub game_id: i64,
    pub student_id: i64,
    pub score: usize,
    pub total_questions: usize,
    pub time_taken: u64,
    pub answers: Vec<AnswerRecord>,
}

/// Persistence port for play sessions. Injected into the session manager
/// at construction; the core never builds a storage handle of its own.
#[async_trait]
pub trait PlayStore: Send + Sync {
    /// Loads the descriptor of a published game.
    async fn load_game(&self, game_id: i64) -> PortResult<GameDescriptor>;

    /// Loads the game's questions in position order, already validated at
    /// authoring time.
    async fn load_questions(&self, game_id: i64) -> PortResult<Vec<PlayQuestion>>;

    /// Creates the attempt record. Returns the new attempt id.
    async fn create_attempt(&self, attempt: NewAttempt) -> PortResult<i64>;
}
