// src/handlers/certificate.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, state::AppState};

/// Verifies a shareable certificate code. Public.
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let code = code.trim().to_uppercase();

    let verification = state
        .store
        .find_certificate_by_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound("Certificate not found".to_string()))?;

    Ok(Json(verification))
}
