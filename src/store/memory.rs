// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
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

#[derive(Default)]
struct Tables {
    assessments: HashMap<i64, Assessment>,
    questions: HashMap<i64, Vec<Question>>,
    attempts: Vec<UserAssessment>,
    /// Keyed by attempt id: at most one certificate per attempt.
    certificates: HashMap<i64, Certificate>,
    next_attempt_id: i64,
    next_certificate_id: i64,
}

/// In-process store with the same uniqueness guarantees as the Postgres schema.
/// Every check-then-insert runs under one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an assessment definition together with its questions.
    pub fn insert_assessment(&self, assessment: Assessment, mut questions: Vec<Question>) -> Result<(), AppError> {
        questions.sort_by_key(|q| (q.position, q.id));
        let mut tables = self.lock()?;
        tables.questions.insert(assessment.id, questions);
        tables.assessments.insert(assessment.id, assessment);
        Ok(())
    }

    pub fn attempt_count(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.attempts.len())
    }

    pub fn certificate_count(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.certificates.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn find_assessment(&self, assessment_id: i64) -> Result<Option<Assessment>, AppError> {
        Ok(self.lock()?.assessments.get(&assessment_id).cloned())
    }

    async fn list_questions(&self, assessment_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.lock()?.questions.get(&assessment_id).cloned().unwrap_or_default())
    }

    async fn find_attempt_by_key(
        &self,
        user_id: i64,
        attempt_key: Uuid,
    ) -> Result<Option<UserAssessment>, AppError> {
        Ok(self
            .lock()?
            .attempts
            .iter()
            .find(|a| a.user_id == user_id && a.attempt_key == attempt_key)
            .cloned())
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<(UserAssessment, Inserted), AppError> {
        let mut tables = self.lock()?;

        if let Some(existing) = tables
            .attempts
            .iter()
            .find(|a| a.user_id == attempt.user_id && a.attempt_key == attempt.attempt_key)
        {
            return Ok((existing.clone(), Inserted::Existing));
        }

        tables.next_attempt_id += 1;
        let row = UserAssessment {
            id: tables.next_attempt_id,
            user_id: attempt.user_id,
            assessment_id: attempt.assessment_id,
            attempt_key: attempt.attempt_key,
            score: attempt.score,
            is_passed: attempt.is_passed,
            time_spent: attempt.time_spent,
            completed_at: Utc::now(),
        };
        tables.attempts.push(row.clone());

        Ok((row, Inserted::Created))
    }

    async fn certificate_for_attempt(&self, user_assessment_id: i64) -> Result<Option<Certificate>, AppError> {
        Ok(self.lock()?.certificates.get(&user_assessment_id).cloned())
    }

    async fn issue_certificate(&self, certificate: NewCertificate) -> Result<(Certificate, Inserted), AppError> {
        let mut tables = self.lock()?;

        if let Some(existing) = tables.certificates.get(&certificate.user_assessment_id) {
            return Ok((existing.clone(), Inserted::Existing));
        }

        if tables
            .certificates
            .values()
            .any(|c| c.certificate_code == certificate.certificate_code)
        {
            return Err(AppError::Conflict("Certificate code already in use".to_string()));
        }

        tables.next_certificate_id += 1;
        let row = Certificate {
            id: tables.next_certificate_id,
            user_assessment_id: certificate.user_assessment_id,
            user_id: certificate.user_id,
            assessment_id: certificate.assessment_id,
            certificate_code: certificate.certificate_code,
            certificate_url: certificate.certificate_url,
            issue_date: Utc::now(),
        };
        tables.certificates.insert(row.user_assessment_id, row.clone());

        Ok((row, Inserted::Created))
    }

    async fn list_attempts(&self, user_id: i64, assessment_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let tables = self.lock()?;

        let mut attempts: Vec<AttemptSummary> = tables
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.assessment_id == assessment_id)
            .map(|a| AttemptSummary {
                user_assessment_id: a.id,
                score: a.score,
                is_passed: a.is_passed,
                time_spent: a.time_spent,
                completed_at: a.completed_at,
                certificate_code: tables.certificates.get(&a.id).map(|c| c.certificate_code.clone()),
            })
            .collect();

        attempts.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(b.user_assessment_id.cmp(&a.user_assessment_id))
        });

        Ok(attempts)
    }

    async fn find_certificate_by_code(&self, code: &str) -> Result<Option<CertificateVerification>, AppError> {
        let tables = self.lock()?;

        let Some(certificate) = tables.certificates.values().find(|c| c.certificate_code == code) else {
            return Ok(None);
        };

        let attempt = tables.attempts.iter().find(|a| a.id == certificate.user_assessment_id);
        let assessment = tables.assessments.get(&certificate.assessment_id);

        Ok(match (attempt, assessment) {
            (Some(attempt), Some(assessment)) => Some(CertificateVerification {
                certificate_code: certificate.certificate_code.clone(),
                certificate_url: certificate.certificate_url.clone(),
                issue_date: certificate.issue_date,
                assessment_id: assessment.id,
                assessment_title: assessment.title.clone(),
                user_id: certificate.user_id,
                score: attempt.score,
            }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_attempt(key: Uuid) -> NewAttempt {
        NewAttempt {
            user_id: 1,
            assessment_id: 10,
            attempt_key: key,
            score: 80,
            is_passed: true,
            time_spent: 4,
        }
    }

    #[tokio::test]
    async fn test_insert_attempt_is_unique_per_key() {
        let store = MemoryStore::new();
        let key = Uuid::new_v4();

        let (first, inserted) = store.insert_attempt(new_attempt(key)).await.unwrap();
        assert_eq!(inserted, Inserted::Created);

        let mut replay = new_attempt(key);
        replay.score = 10;
        let (second, inserted) = store.insert_attempt(replay).await.unwrap();
        assert_eq!(inserted, Inserted::Existing);
        assert_eq!(second.id, first.id);
        assert_eq!(second.score, 80);
        assert_eq!(store.attempt_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_issue_certificate_once_per_attempt() {
        let store = MemoryStore::new();
        let (attempt, _) = store.insert_attempt(new_attempt(Uuid::new_v4())).await.unwrap();

        let cert = |code: &str| NewCertificate {
            user_assessment_id: attempt.id,
            user_id: 1,
            assessment_id: 10,
            certificate_code: code.to_string(),
            certificate_url: format!("http://localhost/certificates/{}", code),
        };

        let (first, inserted) = store.issue_certificate(cert("CERT-AAAAAAAAAAAA")).await.unwrap();
        assert_eq!(inserted, Inserted::Created);

        let (second, inserted) = store.issue_certificate(cert("CERT-BBBBBBBBBBBB")).await.unwrap();
        assert_eq!(inserted, Inserted::Existing);
        assert_eq!(second.certificate_code, first.certificate_code);
        assert_eq!(store.certificate_count().unwrap(), 1);
    }
}
