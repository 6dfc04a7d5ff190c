// src/models/certificate.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'certificates' table in the database.
/// `user_assessment_id` carries a UNIQUE constraint: one certificate per attempt.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub user_assessment_id: i64,
    pub user_id: i64,
    pub assessment_id: i64,
    pub certificate_code: String,
    pub certificate_url: String,
    pub issue_date: chrono::DateTime<chrono::Utc>,
}

/// Values needed to issue a certificate.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub user_assessment_id: i64,
    pub user_id: i64,
    pub assessment_id: i64,
    pub certificate_code: String,
    pub certificate_url: String,
}

/// Certificate as embedded in a submission result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    pub id: i64,
    pub certificate_code: String,
    pub certificate_url: String,
    pub issue_date: chrono::DateTime<chrono::Utc>,
}

impl From<Certificate> for CertificateInfo {
    fn from(c: Certificate) -> Self {
        Self {
            id: c.id,
            certificate_code: c.certificate_code,
            certificate_url: c.certificate_url,
            issue_date: c.issue_date,
        }
    }
}

/// Public verification view of a certificate, looked up by its shareable code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CertificateVerification {
    pub certificate_code: String,
    pub certificate_url: String,
    pub issue_date: chrono::DateTime<chrono::Utc>,
    pub assessment_id: i64,
    pub assessment_title: String,
    pub user_id: i64,
    pub score: i32,
}
