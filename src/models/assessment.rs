// src/models/assessment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::PublicQuestion;

/// Represents the 'assessments' table in the database.
/// Owned by the catalog; read-only for the assessment engine.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,

    /// Minimum percentage (0-100) required to pass.
    pub passing_score: i32,

    /// Time limit in minutes.
    pub time_limit: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Response of `POST /assessments/{id}/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAssessmentResponse {
    pub assessment_id: i64,
    pub title: String,
    /// Minutes.
    pub time_limit: i32,
    pub questions: Vec<PublicQuestion>,
}
