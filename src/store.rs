// src/store.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::engine::PlayQuestion;
use crate::core::ports::{GameDescriptor, NewAttempt, PlayStore, PortError, PortResult};
use crate::models::question::QuestionRow;

impl From<sqlx::Error> for PortError {
    fn from(err: sqlx::Error) -> Self {
        PortError::Storage(err.to_string())
    }
}

/// Postgres-backed implementation of the play-time persistence port.
pub struct PgPlayStore {
    pool: PgPool,
}

impl PgPlayStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlayStore for PgPlayStore {
    async fn load_game(&self, game_id: i64) -> PortResult<GameDescriptor> {
        let row: Option<(i64, i32, bool)> = sqlx::query_as(
            "SELECT id, time_limit, reveal_answers FROM games WHERE id = $1 AND is_published = TRUE",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;

        let (id, time_limit, reveal_answers) =
            row.ok_or_else(|| PortError::NotFound("Game not found".to_string()))?;
        Ok(GameDescriptor {
            id,
            time_limit: time_limit.max(0) as u32,
            reveal_answers,
        })
    }

    async fn load_questions(&self, game_id: i64) -> PortResult<Vec<PlayQuestion>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            r#"
            SELECT id, game_id, question_text, correct_answers, distractors, position
            FROM game_questions
            WHERE game_id = $1
            ORDER BY position
            "#,
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PlayQuestion::from).collect())
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> PortResult<i64> {
        let answers = serde_json::to_value(&attempt.answers)
            .map_err(|e| PortError::Storage(e.to_string()))?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO game_attempts
            (game_id, student_id, score, total_questions, time_taken, can_retry, answers)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6)
            RETURNING id
            "#,
        )
        .bind(attempt.game_id)
        .bind(attempt.student_id)
        .bind(attempt.score as i32)
        .bind(attempt.total_questions as i32)
        .bind(attempt.time_taken as i32)
        .bind(answers)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
