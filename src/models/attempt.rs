// src/models/attempt.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{certificate::CertificateInfo, question::OptionLabel};

/// Represents the 'user_assessments' table in the database.
/// The authoritative record of one submitted attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserAssessment {
    pub id: i64,
    pub user_id: i64,
    pub assessment_id: i64,

    /// Client-generated attempt identity. UNIQUE together with `user_id`,
    /// so a replayed submission resolves to the same row.
    pub attempt_key: Uuid,

    pub score: i32,
    pub is_passed: bool,

    /// Minutes spent, as reported by the client.
    pub time_spent: i32,

    pub completed_at: chrono::DateTime<chrono::Utc>,
}

/// Values needed to persist an attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub assessment_id: i64,
    pub attempt_key: Uuid,
    pub score: i32,
    pub is_passed: bool,
    pub time_spent: i32,
}

/// A single answer as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: i64,
    pub selected_option: OptionLabel,
}

/// Upper bound of `time_spent`, and of an assessment's `time_limit`.
pub const MAX_TIME_SPENT_MINUTES: i32 = 1440;

/// DTO for submitting an attempt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAssessmentRequest {
    #[validate(length(max = 500), custom(function = validate_unique_questions))]
    pub answers: Vec<SubmittedAnswer>,

    /// Minutes spent on the attempt.
    #[validate(range(min = 1, max = 1440))]
    pub time_spent: i32,

    /// Identity of the attempt; replays with the same key return the stored result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_key: Option<Uuid>,
}

fn validate_unique_questions(answers: &[SubmittedAnswer]) -> Result<(), validator::ValidationError> {
    let mut seen = HashSet::with_capacity(answers.len());
    for answer in answers {
        if !seen.insert(answer.question_id) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
    }
    Ok(())
}

/// Result of `POST /assessments/{id}/submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAssessmentResponse {
    pub score: i32,
    pub is_passed: bool,
    pub passing_score: i32,
    pub user_assessment_id: i64,
    pub certificate: Option<CertificateInfo>,
    pub badge_earned: bool,
}

/// One row of a user's attempt history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub user_assessment_id: i64,
    pub score: i32,
    pub is_passed: bool,
    pub time_spent: i32,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub certificate_code: Option<String>,
}
