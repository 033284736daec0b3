// src/handlers/play.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{FromRow, PgPool};

use crate::{
    core::session::{ClientEvent, SessionManager},
    error::AppError,
    models::game::AvailableGame,
    utils::jwt::Claims,
};

/// Helper struct for joining games with the student's latest attempt.
#[derive(FromRow)]
struct AvailableRow {
    id: i64,
    title: String,
    description: Option<String>,
    time_limit: i32,
    question_count: i64,
    last_score: Option<i32>,
    last_total: Option<i32>,
    last_can_retry: Option<bool>,
}

/// Lists published games visible to the student (no class restriction, or
/// the student's own class), with replay eligibility: a game can be played
/// if the student has no attempt yet or the teacher re-opened the latest
/// one via can_retry.
pub async fn list_available_games(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();

    let rows: Vec<AvailableRow> = sqlx::query_as(
        r#"
        SELECT
            g.id, g.title, g.description, g.time_limit,
            (SELECT COUNT(*) FROM game_questions q WHERE q.game_id = g.id) AS question_count,
            la.score AS last_score,
            la.total_questions AS last_total,
            la.can_retry AS last_can_retry
        FROM games g
        LEFT JOIN LATERAL (
            SELECT score, total_questions, can_retry
            FROM game_attempts a
            WHERE a.game_id = g.id AND a.student_id = $1
            ORDER BY a.completed_at DESC
            LIMIT 1
        ) la ON TRUE
        WHERE g.is_published
          AND (g.class_id IS NULL OR g.class_id = (SELECT class_id FROM users WHERE id = $1))
        ORDER BY g.published_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list available games: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let games: Vec<AvailableGame> = rows
        .into_iter()
        .map(|row| AvailableGame {
            id: row.id,
            title: row.title,
            description: row.description,
            time_limit: row.time_limit,
            question_count: row.question_count,
            can_play: row.last_score.is_none() || row.last_can_retry == Some(true),
            last_score: row.last_score,
            last_total: row.last_total,
        })
        .collect();

    Ok(Json(games))
}

/// Starts a fresh play session on a game. Partial progress is never
/// resumed: a reload that starts again begins at question one.
pub async fn start_session(
    State(pool): State<PgPool>,
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(game_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.user_id();
    require_playable(&pool, game_id, student_id).await?;

    let view = sessions.start(game_id, student_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Current state of a live session (used when the play screen refreshes).
pub async fn session_view(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let view = sessions.view(session_id, claims.user_id()).await?;
    Ok(Json(view))
}

/// Feeds one client event (word click, slot click, advance) into the
/// session's state machine and returns the updated view.
pub async fn session_event(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<u64>,
    Json(event): Json<ClientEvent>,
) -> Result<impl IntoResponse, AppError> {
    let view = sessions
        .handle_event(session_id, claims.user_id(), event)
        .await?;
    Ok(Json(view))
}

/// Checks that the game is published, visible to this student, and not
/// already locked by a finished attempt.
async fn require_playable(pool: &PgPool, game_id: i64, student_id: i64) -> Result<(), AppError> {
    let game: Option<(bool, Option<i64>)> =
        sqlx::query_as("SELECT is_published, class_id FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(pool)
            .await?;

    let (is_published, class_id) = game.ok_or(AppError::NotFound("Game not found".to_string()))?;
    if !is_published {
        return Err(AppError::NotFound("Game not found".to_string()));
    }

    if let Some(class_id) = class_id {
        let student_class: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT class_id FROM users WHERE id = $1")
                .bind(student_id)
                .fetch_optional(pool)
                .await?;
        if student_class.and_then(|(c,)| c) != Some(class_id) {
            return Err(AppError::Forbidden(
                "Game is restricted to another class".to_string(),
            ));
        }
    }

    let latest: Option<(bool,)> = sqlx::query_as(
        r#"
        SELECT can_retry FROM game_attempts
        WHERE game_id = $1 AND student_id = $2
        ORDER BY completed_at DESC
        LIMIT 1
        "#,
    )
    .bind(game_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    if let Some((can_retry,)) = latest {
        if !can_retry {
            return Err(AppError::Conflict(
                "Game already completed; ask your teacher to re-open it".to_string(),
            ));
        }
    }

    Ok(())
}
