// src/handlers/game.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, Transaction};
use validator::Validate;

use crate::{
    core::template::{self, CompiledQuestion, QuestionInput},
    error::AppError,
    models::{
        attempt::GameResultEntry,
        game::{Game, GameSummary, PublishRequest, SaveGameRequest},
        question::QuestionRow,
    },
    utils::jwt::Claims,
};

/// Creates a game together with its validated questions.
///
/// Question validation is all-or-nothing and happens before any write:
/// a single malformed question rejects the whole request.
pub async fn create_game(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<SaveGameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let compiled = compile_payload(&payload)?;

    let mut tx = pool.begin().await?;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO games
        (teacher_id, title, description, time_limit, class_id, is_published, published_at, reveal_answers)
        VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $6 THEN NOW() ELSE NULL END, $7)
        RETURNING id
        "#,
    )
    .bind(claims.user_id())
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(payload.time_limit)
    .bind(payload.class_id)
    .bind(payload.is_published)
    .bind(payload.reveal_answers)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create game: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    insert_questions(&mut tx, id, &compiled).await?;
    tx.commit().await?;

    tracing::info!(game_id = id, teacher_id = claims.user_id(), "Game created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Lists the teacher's own games with question and attempt counts.
pub async fn list_games(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let games: Vec<GameSummary> = sqlx::query_as(
        r#"
        SELECT
            g.id, g.title, g.description, g.time_limit, g.class_id,
            g.is_published, g.reveal_answers, g.updated_at,
            (SELECT COUNT(*) FROM game_questions q WHERE q.game_id = g.id) AS question_count,
            (SELECT COUNT(*) FROM game_attempts a WHERE a.game_id = g.id) AS attempt_count
        FROM games g
        WHERE g.teacher_id = $1
        ORDER BY g.updated_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list games: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(games))
}

/// Fetches one of the teacher's games with its full question list,
/// answer keys included (this is the edit view).
pub async fn get_game(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let game = require_own_game(&pool, id, claims.user_id()).await?;

    let questions: Vec<QuestionRow> = sqlx::query_as(
        r#"
        SELECT id, game_id, question_text, correct_answers, distractors, position
        FROM game_questions
        WHERE game_id = $1
        ORDER BY position
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "game": game,
        "questions": questions,
    })))
}

/// Updates a game. An edit rewrites the question list wholesale: old
/// questions are deleted and the submitted ones reinserted, all in one
/// transaction.
pub async fn update_game(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SaveGameRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let compiled = compile_payload(&payload)?;

    require_own_game(&pool, id, claims.user_id()).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE games SET
            title = $1,
            description = $2,
            time_limit = $3,
            class_id = $4,
            is_published = $5,
            published_at = CASE
                WHEN $5 AND published_at IS NULL THEN NOW()
                WHEN NOT $5 THEN NULL
                ELSE published_at
            END,
            reveal_answers = $6,
            updated_at = NOW()
        WHERE id = $7
        "#,
    )
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(payload.time_limit)
    .bind(payload.class_id)
    .bind(payload.is_published)
    .bind(payload.reveal_answers)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM game_questions WHERE game_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    insert_questions(&mut tx, id, &compiled).await?;

    tx.commit().await?;
    Ok(StatusCode::OK)
}

/// Flips the publication flag. Publishing stamps `published_at` the first
/// time; unpublishing clears it.
pub async fn set_published(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_own_game(&pool, id, claims.user_id()).await?;

    sqlx::query(
        r#"
        UPDATE games SET
            is_published = $1,
            published_at = CASE
                WHEN $1 AND published_at IS NULL THEN NOW()
                WHEN NOT $1 THEN NULL
                ELSE published_at
            END,
            updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(payload.is_published)
    .bind(id)
    .execute(&pool)
    .await?;

    Ok(StatusCode::OK)
}

/// Deletes a game. Questions and attempts go with it via the cascades.
pub async fn delete_game(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM games WHERE id = $1 AND teacher_id = $2")
        .bind(id)
        .bind(claims.user_id())
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete game: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Game not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Lists every attempt on one of the teacher's games, newest first, with
/// aggregate stats for the results header.
pub async fn game_results(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_own_game(&pool, id, claims.user_id()).await?;

    let entries: Vec<GameResultEntry> = sqlx::query_as(
        r#"
        SELECT
            a.id, a.student_id, u.display_name AS student_name,
            a.score, a.total_questions, a.time_taken, a.can_retry, a.completed_at
        FROM game_attempts a
        JOIN users u ON u.id = a.student_id
        WHERE a.game_id = $1
        ORDER BY a.completed_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let average: Option<(Option<f64>,)> = sqlx::query_as(
        "SELECT AVG(score::FLOAT8 / NULLIF(total_questions, 0)) FROM game_attempts WHERE game_id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;
    let average_percentage = average
        .and_then(|(avg,)| avg)
        .map(|ratio| (ratio * 100.0).round() as i64);

    Ok(Json(serde_json::json!({
        "attempt_count": entries.len(),
        "average_percentage": average_percentage,
        "attempts": entries,
    })))
}

fn compile_payload(payload: &SaveGameRequest) -> Result<Vec<CompiledQuestion>, AppError> {
    let inputs: Vec<QuestionInput> = payload
        .questions
        .iter()
        .cloned()
        .map(QuestionInput::from)
        .collect();
    Ok(template::compile_questions(&inputs)?)
}

async fn insert_questions(
    tx: &mut Transaction<'_, Postgres>,
    game_id: i64,
    questions: &[CompiledQuestion],
) -> Result<(), AppError> {
    for (position, question) in questions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO game_questions
            (game_id, question_text, correct_answers, distractors, position)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(game_id)
        .bind(&question.text)
        .bind(serde_json::to_value(&question.correct_answers)?)
        .bind(serde_json::to_value(&question.distractors)?)
        .bind(position as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Verifies the game exists and belongs to the teacher.
async fn require_own_game(pool: &PgPool, game_id: i64, teacher_id: i64) -> Result<Game, AppError> {
    let game: Option<Game> = sqlx::query_as(
        r#"
        SELECT id, teacher_id, title, description, time_limit, class_id,
               is_published, published_at, reveal_answers, created_at, updated_at
        FROM games
        WHERE id = $1
        "#,
    )
    .bind(game_id)
    .fetch_optional(pool)
    .await?;

    match game {
        None => Err(AppError::NotFound("Game not found".to_string())),
        Some(game) if game.teacher_id != teacher_id => {
            Err(AppError::Forbidden("Not your game".to_string()))
        }
        Some(game) => Ok(game),
    }
}
