// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AssessmentStore, Inserted};
use crate::{
    error::AppError,
    models::{
        assessment::Assessment,
        attempt::{AttemptSummary, NewAttempt, UserAssessment},
        certificate::{Certificate, CertificateVerification, NewCertificate},
        question::Question,
    },
};

const ATTEMPT_COLUMNS: &str =
    "id, user_id, assessment_id, attempt_key, score, is_passed, time_spent, completed_at";

const CERTIFICATE_COLUMNS: &str =
    "id, user_assessment_id, user_id, assessment_id, certificate_code, certificate_url, issue_date";

/// Postgres-backed store. Uniqueness of attempts and certificates is enforced
/// by the indexes declared in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn find_assessment(&self, assessment_id: i64) -> Result<Option<Assessment>, AppError> {
        let assessment = sqlx::query_as::<_, Assessment>(
            r#"
            SELECT id, title, description, passing_score, time_limit, created_at
            FROM assessments
            WHERE id = $1
            "#,
        )
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch assessment {}: {:?}", assessment_id, e);
            AppError::from(e)
        })?;

        Ok(assessment)
    }

    async fn list_questions(&self, assessment_id: i64) -> Result<Vec<Question>, AppError> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT
                id,
                assessment_id,
                position,
                question,
                option_a,
                option_b,
                option_c,
                option_d,
                correct_answer
            FROM assessment_questions
            WHERE assessment_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions for assessment {}: {:?}", assessment_id, e);
            AppError::from(e)
        })?;

        Ok(questions)
    }

    async fn find_attempt_by_key(
        &self,
        user_id: i64,
        attempt_key: Uuid,
    ) -> Result<Option<UserAssessment>, AppError> {
        let attempt = sqlx::query_as::<_, UserAssessment>(&format!(
            "SELECT {} FROM user_assessments WHERE user_id = $1 AND attempt_key = $2",
            ATTEMPT_COLUMNS
        ))
        .bind(user_id)
        .bind(attempt_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<(UserAssessment, Inserted), AppError> {
        let created = sqlx::query_as::<_, UserAssessment>(&format!(
            r#"
            INSERT INTO user_assessments (user_id, assessment_id, attempt_key, score, is_passed, time_spent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, attempt_key) DO NOTHING
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(attempt.user_id)
        .bind(attempt.assessment_id)
        .bind(attempt.attempt_key)
        .bind(attempt.score)
        .bind(attempt.is_passed)
        .bind(attempt.time_spent)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert attempt: {:?}", e);
            AppError::from(e)
        })?;

        if let Some(row) = created {
            return Ok((row, Inserted::Created));
        }

        // Lost the race against a concurrent submission with the same key.
        let existing = self
            .find_attempt_by_key(attempt.user_id, attempt.attempt_key)
            .await?
            .ok_or_else(|| AppError::InternalServerError("Attempt vanished after conflict".to_string()))?;

        Ok((existing, Inserted::Existing))
    }

    async fn certificate_for_attempt(&self, user_assessment_id: i64) -> Result<Option<Certificate>, AppError> {
        let certificate = sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {} FROM certificates WHERE user_assessment_id = $1",
            CERTIFICATE_COLUMNS
        ))
        .bind(user_assessment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(certificate)
    }

    async fn issue_certificate(&self, certificate: NewCertificate) -> Result<(Certificate, Inserted), AppError> {
        let created = sqlx::query_as::<_, Certificate>(&format!(
            r#"
            INSERT INTO certificates (user_assessment_id, user_id, assessment_id, certificate_code, certificate_url)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_assessment_id) DO NOTHING
            RETURNING {}
            "#,
            CERTIFICATE_COLUMNS
        ))
        .bind(certificate.user_assessment_id)
        .bind(certificate.user_id)
        .bind(certificate.assessment_id)
        .bind(&certificate.certificate_code)
        .bind(&certificate.certificate_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            // The attempt conflict is absorbed above; what remains is a certificate_code collision.
            if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                AppError::Conflict("Certificate code already in use".to_string())
            } else {
                tracing::error!("Failed to issue certificate: {:?}", e);
                AppError::from(e)
            }
        })?;

        if let Some(row) = created {
            return Ok((row, Inserted::Created));
        }

        let existing = self
            .certificate_for_attempt(certificate.user_assessment_id)
            .await?
            .ok_or_else(|| AppError::InternalServerError("Certificate vanished after conflict".to_string()))?;

        Ok((existing, Inserted::Existing))
    }

    async fn list_attempts(&self, user_id: i64, assessment_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let attempts = sqlx::query_as::<_, AttemptSummary>(
            r#"
            SELECT
                ua.id as user_assessment_id,
                ua.score,
                ua.is_passed,
                ua.time_spent,
                ua.completed_at,
                c.certificate_code
            FROM user_assessments ua
            LEFT JOIN certificates c ON c.user_assessment_id = ua.id
            WHERE ua.user_id = $1 AND ua.assessment_id = $2
            ORDER BY ua.completed_at DESC, ua.id DESC
            "#,
        )
        .bind(user_id)
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn find_certificate_by_code(&self, code: &str) -> Result<Option<CertificateVerification>, AppError> {
        let verification = sqlx::query_as::<_, CertificateVerification>(
            r#"
            SELECT
                c.certificate_code,
                c.certificate_url,
                c.issue_date,
                c.assessment_id,
                a.title as assessment_title,
                c.user_id,
                ua.score
            FROM certificates c
            JOIN user_assessments ua ON ua.id = c.user_assessment_id
            JOIN assessments a ON a.id = c.assessment_id
            WHERE c.certificate_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(verification)
    }
}
