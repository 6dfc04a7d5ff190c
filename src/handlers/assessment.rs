// src/handlers/assessment.rs

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        assessment::{Assessment, StartAssessmentResponse},
        attempt::{NewAttempt, SubmitAssessmentRequest, SubmitAssessmentResponse, UserAssessment},
        certificate::{Certificate, CertificateInfo, NewCertificate},
        question::PublicQuestion,
    },
    notify::{CertificateNotice, Notifier},
    scoring::{calculate_score, generate_certificate_code},
    state::AppState,
    store::{AssessmentStore, Inserted},
    utils::jwt::Claims,
};

/// Fresh codes tried before a certificate code collision is reported.
const CERTIFICATE_CODE_ATTEMPTS: usize = 3;

/// Starts (or resumes) an assessment.
///
/// Returns the question set without correct answers and the nominal time limit.
/// Read-only; repeated calls are safe.
pub async fn start_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let assessment = load_assessment(state.store.as_ref(), assessment_id).await?;
    let questions = state.store.list_questions(assessment_id).await?;

    if questions.is_empty() {
        tracing::warn!("Assessment {} has no questions", assessment_id);
        return Err(AppError::NotFound("Assessment has no questions".to_string()));
    }

    tracing::info!(user_id, assessment_id, "Assessment started");

    Ok(Json(StartAssessmentResponse {
        assessment_id: assessment.id,
        title: assessment.title,
        time_limit: assessment.time_limit,
        questions: questions.into_iter().map(PublicQuestion::from).collect(),
    }))
}

/// Submits an attempt and returns its score.
///
/// * Validates the payload (malformed JSON or values -> 400).
/// * Scores against the answer key and persists the attempt.
/// * On pass, issues the attempt's certificate and notifies the user.
pub async fn submit_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
    payload: Result<Json<SubmitAssessmentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    req.validate()?;

    let user_id = claims.user_id()?;

    let result = score_submission(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &state.config.certificate_base_url,
        user_id,
        assessment_id,
        req,
    )
    .await?;

    Ok(Json(result))
}

/// Lists the acting user's attempts on one assessment, newest first.
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    load_assessment(state.store.as_ref(), assessment_id).await?;
    let attempts = state.store.list_attempts(user_id, assessment_id).await?;

    Ok(Json(attempts))
}

/// Scores one submission and persists its outcome.
///
/// A submission whose `attempt_key` is already stored for this user returns the
/// stored result unchanged, including the same certificate.
pub async fn score_submission(
    store: &dyn AssessmentStore,
    notifier: &dyn Notifier,
    certificate_base_url: &Url,
    user_id: i64,
    assessment_id: i64,
    req: SubmitAssessmentRequest,
) -> Result<SubmitAssessmentResponse, AppError> {
    let assessment = load_assessment(store, assessment_id).await?;

    if let Some(key) = req.attempt_key {
        if let Some(stored) = store.find_attempt_by_key(user_id, key).await? {
            tracing::info!(user_id, assessment_id, attempt_id = stored.id, "Replaying stored attempt");
            return finish_attempt(store, notifier, certificate_base_url, &assessment, stored).await;
        }
    }

    let questions = store.list_questions(assessment_id).await?;
    let card = calculate_score(&questions, &req.answers, assessment.passing_score)?;

    let (attempt, inserted) = store
        .insert_attempt(NewAttempt {
            user_id,
            assessment_id,
            attempt_key: req.attempt_key.unwrap_or_else(Uuid::new_v4),
            score: card.score,
            is_passed: card.is_passed,
            time_spent: req.time_spent,
        })
        .await
        .map_err(|e| {
            tracing::error!("Failed to persist attempt for user {}: {}", user_id, e);
            e
        })?;

    if inserted == Inserted::Created {
        tracing::info!(
            user_id,
            assessment_id,
            attempt_id = attempt.id,
            correct = card.correct_count,
            total = card.total_questions,
            score = card.score,
            passed = card.is_passed,
            "Attempt scored"
        );
    }

    finish_attempt(store, notifier, certificate_base_url, &assessment, attempt).await
}

async fn load_assessment(store: &dyn AssessmentStore, assessment_id: i64) -> Result<Assessment, AppError> {
    store
        .find_assessment(assessment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Assessment not found".to_string()))
}

/// Builds the result for a persisted attempt, issuing its certificate if it passed.
async fn finish_attempt(
    store: &dyn AssessmentStore,
    notifier: &dyn Notifier,
    certificate_base_url: &Url,
    assessment: &Assessment,
    attempt: UserAssessment,
) -> Result<SubmitAssessmentResponse, AppError> {
    if attempt.assessment_id != assessment.id {
        return Err(AppError::BadRequest(
            "Attempt key belongs to a different assessment".to_string(),
        ));
    }

    let certificate = if attempt.is_passed {
        let (certificate, inserted) = ensure_certificate(store, certificate_base_url, &attempt).await?;

        if inserted == Inserted::Created {
            let notice = CertificateNotice::new(&certificate, &assessment.title, attempt.score);
            if let Err(e) = notifier.certificate_issued(&notice).await {
                tracing::warn!(
                    certificate_code = %certificate.certificate_code,
                    "Certificate notification failed: {}",
                    e
                );
            }
        }

        Some(CertificateInfo::from(certificate))
    } else {
        None
    };

    Ok(SubmitAssessmentResponse {
        score: attempt.score,
        is_passed: attempt.is_passed,
        passing_score: assessment.passing_score,
        user_assessment_id: attempt.id,
        certificate,
        badge_earned: attempt.is_passed,
    })
}

async fn ensure_certificate(
    store: &dyn AssessmentStore,
    certificate_base_url: &Url,
    attempt: &UserAssessment,
) -> Result<(Certificate, Inserted), AppError> {
    if let Some(existing) = store.certificate_for_attempt(attempt.id).await? {
        return Ok((existing, Inserted::Existing));
    }

    let mut last_err = None;
    for _ in 0..CERTIFICATE_CODE_ATTEMPTS {
        let code = generate_certificate_code();
        let url = certificate_url(certificate_base_url, &code)?;

        match store
            .issue_certificate(NewCertificate {
                user_assessment_id: attempt.id,
                user_id: attempt.user_id,
                assessment_id: attempt.assessment_id,
                certificate_code: code,
                certificate_url: url,
            })
            .await
        {
            Ok(issued) => return Ok(issued),
            Err(AppError::Conflict(msg)) => {
                tracing::warn!("Certificate code collision, retrying: {}", msg);
                last_err = Some(AppError::Conflict(msg));
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::InternalServerError("Certificate was not issued".to_string())))
}

/// `{base}/certificates/{code}`
pub fn certificate_url(base: &Url, code: &str) -> Result<String, AppError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AppError::InternalServerError("CERTIFICATE_BASE_URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["certificates", code]);
    Ok(url.to_string())
}
