// src/models/game.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::core::template::QuestionInput;

/// Represents the 'games' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub teacher_id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Seconds allotted per question, not per game.
    pub time_limit: i32,

    /// Restricts visibility to one class; NULL means every student.
    pub class_id: Option<i64>,

    pub is_published: bool,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Whether students may see the answer key after submitting.
    pub reveal_answers: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Game row plus counts, for the teacher's dashboard list.
#[derive(Debug, Serialize, FromRow)]
pub struct GameSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub time_limit: i32,
    pub class_id: Option<i64>,
    pub is_published: bool,
    pub reveal_answers: bool,
    pub question_count: i64,
    pub attempt_count: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// One question as typed in the authoring form. Validated by the core
/// template compiler before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub text: String,
    pub correct_answers: Vec<String>,
    #[serde(default)]
    pub distractors: Vec<String>,
}

impl From<QuestionPayload> for QuestionInput {
    fn from(payload: QuestionPayload) -> Self {
        QuestionInput {
            text: payload.text,
            correct_answers: payload.correct_answers,
            distractors: payload.distractors,
        }
    }
}

/// DTO for creating a game together with its questions. The same shape is
/// used for edits: an edit rewrites the full question list.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveGameRequest {
    #[validate(length(min = 1, max = 200, message = "Title must not be empty."))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(range(min = 10, max = 600, message = "Time limit must be 10-600 seconds."))]
    pub time_limit: i32,
    pub class_id: Option<i64>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub reveal_answers: bool,
    #[validate(length(min = 1, message = "A game needs at least one question."))]
    pub questions: Vec<QuestionPayload>,
}

/// DTO for flipping the publication flag.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub is_published: bool,
}

/// A published game as listed for a student, with replay eligibility
/// derived from the student's latest attempt.
#[derive(Debug, Serialize)]
pub struct AvailableGame {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub time_limit: i32,
    pub question_count: i64,
    pub last_score: Option<i32>,
    pub last_total: Option<i32>,
    pub can_play: bool,
}
