// src/session/api.rs

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::error::SessionError;
use crate::models::{
    assessment::StartAssessmentResponse,
    attempt::{SubmitAssessmentRequest, SubmitAssessmentResponse},
};

/// The two server calls a session makes.
#[async_trait]
pub trait AssessmentApi: Send + Sync {
    async fn start(&self, assessment_id: i64) -> Result<StartAssessmentResponse, SessionError>;

    async fn submit(
        &self,
        assessment_id: i64,
        request: &SubmitAssessmentRequest,
    ) -> Result<SubmitAssessmentResponse, SessionError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// `reqwest`-based client for `/api/assessments/{id}/{start,submit}`.
pub struct HttpAssessmentApi {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpAssessmentApi {
    /// `token` is the bearer token issued by the identity provider.
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            token: token.into(),
        }
    }

    fn endpoint(&self, assessment_id: i64, action: &str) -> Result<Url, SessionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SessionError::NetworkFailure("Invalid API base URL".to_string()))?
            .pop_if_empty()
            .extend(["api", "assessments", &assessment_id.to_string(), action]);
        Ok(url)
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<T, SessionError> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) if !body.error.is_empty() => body.error,
                _ => fallback.to_string(),
            };
            return Err(SessionError::from_status(status.as_u16(), message));
        }

        response.json::<T>().await.map_err(|e| {
            tracing::warn!("Malformed response body: {}", e);
            SessionError::NetworkFailure(fallback.to_string())
        })
    }
}

#[async_trait]
impl AssessmentApi for HttpAssessmentApi {
    async fn start(&self, assessment_id: i64) -> Result<StartAssessmentResponse, SessionError> {
        const FALLBACK: &str = "Failed to start assessment";

        let response = self
            .client
            .post(self.endpoint(assessment_id, "start")?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Start request failed: {}", e);
                SessionError::NetworkFailure(FALLBACK.to_string())
            })?;

        Self::read(response, FALLBACK).await
    }

    async fn submit(
        &self,
        assessment_id: i64,
        request: &SubmitAssessmentRequest,
    ) -> Result<SubmitAssessmentResponse, SessionError> {
        const FALLBACK: &str = "Failed to submit assessment";

        let response = self
            .client
            .post(self.endpoint(assessment_id, "submit")?)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Submit request failed: {}", e);
                SessionError::NetworkFailure(FALLBACK.to_string())
            })?;

        Self::read(response, FALLBACK).await
    }
}
