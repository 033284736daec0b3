// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::core::engine::AnswerRecord;

/// Represents the 'game_attempts' table in the database. Write-once: only
/// `can_retry` is ever updated after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub game_id: i64,
    pub student_id: i64,
    pub score: i32,
    pub total_questions: i32,
    pub time_taken: i32,
    pub can_retry: bool,
    pub answers: Json<Vec<AnswerRecord>>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Attempt row joined with the game title, for a student's history.
#[derive(Debug, Serialize, FromRow)]
pub struct AttemptSummary {
    pub id: i64,
    pub game_id: i64,
    pub game_title: String,
    pub score: i32,
    pub total_questions: i32,
    pub can_retry: bool,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Attempt row joined with the student, for a game's results table.
#[derive(Debug, Serialize, FromRow)]
pub struct GameResultEntry {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub score: i32,
    pub total_questions: i32,
    pub time_taken: i32,
    pub can_retry: bool,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// One answer on an attempt detail view. The key snapshot is withheld
/// unless the game reveals answers or the viewer is the teacher.
#[derive(Debug, Serialize)]
pub struct AttemptAnswer {
    pub question_id: i64,
    pub user_answers: Vec<String>,
    pub is_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answers: Option<Vec<String>>,
}

/// Full attempt detail response.
#[derive(Debug, Serialize)]
pub struct AttemptDetail {
    pub id: i64,
    pub game_id: i64,
    pub game_title: String,
    pub score: i32,
    pub total_questions: i32,
    pub percentage: u32,
    pub time_taken: i32,
    pub can_retry: bool,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub answers: Vec<AttemptAnswer>,
}

/// DTO for the teacher-only retry flip.
#[derive(Debug, Deserialize)]
pub struct SetRetryRequest {
    pub can_retry: bool,
}
