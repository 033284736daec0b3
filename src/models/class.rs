// src/models/class.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'classes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Class {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Class row plus roster size, for the teacher's class list.
#[derive(Debug, Serialize, FromRow)]
pub struct ClassSummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub student_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a new class.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// DTO for adding a student to a class roster.
#[derive(Debug, Deserialize)]
pub struct AddStudentRequest {
    pub student_id: i64,
}
