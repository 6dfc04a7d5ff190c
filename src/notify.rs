// src/notify.rs

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::{error::AppError, models::certificate::Certificate};

/// Payload handed to the email dispatcher when a certificate is issued.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateNotice {
    pub user_id: i64,
    pub assessment_id: i64,
    pub assessment_title: String,
    pub score: i32,
    pub certificate_code: String,
    pub certificate_url: String,
    pub issue_date: chrono::DateTime<chrono::Utc>,
}

impl CertificateNotice {
    pub fn new(certificate: &Certificate, assessment_title: &str, score: i32) -> Self {
        Self {
            user_id: certificate.user_id,
            assessment_id: certificate.assessment_id,
            assessment_title: assessment_title.to_string(),
            score,
            certificate_code: certificate.certificate_code.clone(),
            certificate_url: certificate.certificate_url.clone(),
            issue_date: certificate.issue_date,
        }
    }
}

/// Delivers certificate notifications. Carried in `AppState` as `Arc<dyn Notifier>`.
///
/// Failures are reported to the caller, which logs them; they never undo the attempt.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn certificate_issued(&self, notice: &CertificateNotice) -> Result<(), AppError>;
}

/// Writes the notice to the log. Used when no dispatcher is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn certificate_issued(&self, notice: &CertificateNotice) -> Result<(), AppError> {
        tracing::info!(
            user_id = notice.user_id,
            assessment_id = notice.assessment_id,
            certificate_code = %notice.certificate_code,
            "Certificate issued"
        );
        Ok(())
    }
}

/// POSTs the notice as JSON to the email dispatcher.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn certificate_issued(&self, notice: &CertificateNotice) -> Result<(), AppError> {
        self.client
            .post(self.endpoint.clone())
            .json(notice)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| AppError::InternalServerError(format!("notification dispatch failed: {}", e)))?;

        tracing::debug!(certificate_code = %notice.certificate_code, "Certificate notification dispatched");
        Ok(())
    }
}
