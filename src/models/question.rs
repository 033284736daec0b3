// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::core::engine::PlayQuestion;
use crate::core::template;

/// Represents the 'game_questions' table in the database.
/// Answer arrays are stored as JSONB.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuestionRow {
    pub id: i64,
    pub game_id: i64,

    /// Free text with blank markers (runs of 3+ underscores).
    pub question_text: String,

    /// One answer per blank, in left-to-right blank order. The order is
    /// load-bearing: blanks are re-derived from the text alone.
    pub correct_answers: Json<Vec<String>>,

    /// Decoy words mixed into this question's word bank.
    pub distractors: Json<Vec<String>>,

    pub position: i32,
}

impl From<QuestionRow> for PlayQuestion {
    fn from(row: QuestionRow) -> Self {
        let blank_count = template::blank_count(&row.question_text);
        PlayQuestion {
            id: row.id,
            text: row.question_text,
            correct_answers: row.correct_answers.0,
            distractors: row.distractors.0,
            blank_count,
        }
    }
}
