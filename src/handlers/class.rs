// src/handlers/class.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        class::{AddStudentRequest, Class, ClassSummary, CreateClassRequest},
        user::StudentSummary,
    },
    utils::jwt::Claims,
};

/// Lists the teacher's own classes with their roster sizes.
pub async fn list_classes(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let classes: Vec<ClassSummary> = sqlx::query_as(
        r#"
        SELECT
            c.id, c.name, c.description, c.created_at,
            COUNT(u.id) AS student_count
        FROM classes c
        LEFT JOIN users u ON u.class_id = c.id
        WHERE c.teacher_id = $1
        GROUP BY c.id
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(claims.user_id())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list classes: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(classes))
}

/// Creates a new class owned by the teacher.
pub async fn create_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let class: Class = sqlx::query_as(
        r#"
        INSERT INTO classes (teacher_id, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, teacher_id, name, description, created_at
        "#,
    )
    .bind(claims.user_id())
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create class: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(class)))
}

/// Deletes one of the teacher's classes. Students in it fall back to
/// "no class" (the FK sets their class_id to NULL).
pub async fn delete_class(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM classes WHERE id = $1 AND teacher_id = $2")
        .bind(id)
        .bind(claims.user_id())
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete class: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Class not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Lists the students enrolled in one of the teacher's classes.
pub async fn list_students(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_own_class(&pool, id, claims.user_id()).await?;

    let students: Vec<StudentSummary> = sqlx::query_as(
        r#"
        SELECT id, username, display_name
        FROM users
        WHERE class_id = $1 AND role = 'student'
        ORDER BY display_name
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(students))
}

/// Lists students who are not enrolled in any class yet, as candidates
/// for the roster picker.
pub async fn list_unassigned_students(
    State(pool): State<PgPool>,
) -> Result<impl IntoResponse, AppError> {
    let students: Vec<StudentSummary> = sqlx::query_as(
        r#"
        SELECT id, username, display_name
        FROM users
        WHERE class_id IS NULL AND role = 'student'
        ORDER BY display_name
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(students))
}

/// Enrolls a student into one of the teacher's classes. A student belongs
/// to at most one class; enrolling moves them.
pub async fn add_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AddStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_own_class(&pool, id, claims.user_id()).await?;

    let result = sqlx::query("UPDATE users SET class_id = $1 WHERE id = $2 AND role = 'student'")
        .bind(id)
        .bind(payload.student_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Removes a student from one of the teacher's classes.
pub async fn remove_student(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((id, student_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    require_own_class(&pool, id, claims.user_id()).await?;

    let result = sqlx::query("UPDATE users SET class_id = NULL WHERE id = $1 AND class_id = $2")
        .bind(student_id)
        .bind(id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not in this class".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Verifies the class exists and belongs to the teacher.
async fn require_own_class(pool: &PgPool, class_id: i64, teacher_id: i64) -> Result<(), AppError> {
    let owner: Option<(i64,)> = sqlx::query_as("SELECT teacher_id FROM classes WHERE id = $1")
        .bind(class_id)
        .fetch_optional(pool)
        .await?;

    match owner {
        None => Err(AppError::NotFound("Class not found".to_string())),
        Some((owner_id,)) if owner_id != teacher_id => {
            Err(AppError::Forbidden("Not your class".to_string()))
        }
        Some(_) => Ok(()),
    }
}
