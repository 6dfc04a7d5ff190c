// src/store/mod.rs

//! Persistence seam for the assessment engine.
//!
//! Handlers only talk to [`AssessmentStore`]; `PgStore` backs production and
//! `MemoryStore` backs tests and embedded use.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        assessment::Assessment,
        attempt::{AttemptSummary, NewAttempt, UserAssessment},
        certificate::{Certificate, CertificateVerification, NewCertificate},
        question::Question,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Whether a write created a new row or resolved to one that already existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Created,
    Existing,
}

/// Carried in `AppState` as `Arc<dyn AssessmentStore>`.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn find_assessment(&self, assessment_id: i64) -> Result<Option<Assessment>, AppError>;

    /// Questions of an assessment, in display order, including correct answers.
    async fn list_questions(&self, assessment_id: i64) -> Result<Vec<Question>, AppError>;

    async fn find_attempt_by_key(
        &self,
        user_id: i64,
        attempt_key: Uuid,
    ) -> Result<Option<UserAssessment>, AppError>;

    /// Inserts an attempt unless `(user_id, attempt_key)` already exists,
    /// in which case the stored row is returned untouched.
    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<(UserAssessment, Inserted), AppError>;

    async fn certificate_for_attempt(&self, user_assessment_id: i64) -> Result<Option<Certificate>, AppError>;

    /// Issues a certificate unless the attempt already has one, in which case
    /// the existing certificate is returned. Enforced by a uniqueness constraint
    /// on the attempt, not by the caller.
    async fn issue_certificate(&self, certificate: NewCertificate) -> Result<(Certificate, Inserted), AppError>;

    /// The user's attempts on one assessment, newest first.
    async fn list_attempts(&self, user_id: i64, assessment_id: i64) -> Result<Vec<AttemptSummary>, AppError>;

    async fn find_certificate_by_code(&self, code: &str) -> Result<Option<CertificateVerification>, AppError>;
}
