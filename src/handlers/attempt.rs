// src/handlers/attempt.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::attempt::{Attempt, AttemptAnswer, AttemptDetail, AttemptSummary, SetRetryRequest},
    utils::jwt::Claims,
};

/// Lists the authenticated student's own attempt history, newest first.
pub async fn my_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let attempts: Vec<AttemptSummary> = sqlx::query_as(
        r#"
        SELECT a.id, a.game_id, g.title AS game_title,
               a.score, a.total_questions, a.can_retry, a.completed_at
        FROM game_attempts a
        JOIN games g ON g.id = a.game_id
        WHERE a.student_id = $1
        ORDER BY a.completed_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list attempts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(attempts))
}

/// Fetches one attempt in full. Visible to the student who made it and to
/// the teacher who owns the game. The answer-key snapshot is included for
/// the teacher always, and for the student only when the game reveals
/// answers.
pub async fn get_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let row: Option<(Attempt, String, i64, bool)> = fetch_attempt(&pool, id).await?;
    let (attempt, game_title, teacher_id, reveal_answers) =
        row.ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    let viewer = claims.user_id();
    let is_teacher = viewer == teacher_id;
    if !is_teacher && viewer != attempt.student_id {
        return Err(AppError::Forbidden("Not your attempt".to_string()));
    }

    let reveal = is_teacher || reveal_answers;
    let answers = attempt
        .answers
        .0
        .iter()
        .map(|a| AttemptAnswer {
            question_id: a.question_id,
            user_answers: a.user_answers.clone(),
            is_correct: a.is_correct,
            correct_answers: reveal.then(|| a.correct_answers.clone()),
        })
        .collect();

    let percentage = if attempt.total_questions > 0 {
        (attempt.score as f64 / attempt.total_questions as f64 * 100.0).round() as u32
    } else {
        0
    };

    Ok(Json(AttemptDetail {
        id: attempt.id,
        game_id: attempt.game_id,
        game_title,
        score: attempt.score,
        total_questions: attempt.total_questions,
        percentage,
        time_taken: attempt.time_taken,
        can_retry: attempt.can_retry,
        completed_at: attempt.completed_at,
        answers,
    }))
}

/// Teacher-only escape hatch: re-opens (or closes again) a finished
/// attempt so the student may replay the game. This is the only mutation
/// an attempt record ever sees.
pub async fn set_retry(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SetRetryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE game_attempts SET can_retry = $1
        WHERE id = $2
          AND game_id IN (SELECT id FROM games WHERE teacher_id = $3)
        "#,
    )
    .bind(payload.can_retry)
    .bind(id)
    .bind(claims.user_id())
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update can_retry: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }

    tracing::info!(attempt_id = id, can_retry = payload.can_retry, "Retry flag updated");
    Ok(StatusCode::OK)
}

async fn fetch_attempt(
    pool: &PgPool,
    id: i64,
) -> Result<Option<(Attempt, String, i64, bool)>, AppError> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        attempt: Attempt,
        game_title: String,
        teacher_id: i64,
        reveal_answers: bool,
    }

    let row: Option<Row> = sqlx::query_as(
        r#"
        SELECT a.id, a.game_id, a.student_id, a.score, a.total_questions,
               a.time_taken, a.can_retry, a.answers, a.completed_at,
               g.title AS game_title, g.teacher_id, g.reveal_answers
        FROM game_attempts a
        JOIN games g ON g.id = a.game_id
        WHERE a.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| (r.attempt, r.game_title, r.teacher_id, r.reveal_answers)))
}
