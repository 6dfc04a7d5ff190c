// src/session/error.rs

use std::fmt;

/// Why an assessment session ended up in the error stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    // No acting user.
    AuthRequired(String),

    // No assessment id.
    MissingInput(String),

    // Assessment or definition absent.
    NotFound(String),

    // Start or submit request failed in transport or with a server error.
    NetworkFailure(String),

    // The server rejected the answer payload.
    ValidationFailure(String),
}

impl SessionError {
    pub fn not_authenticated() -> Self {
        SessionError::AuthRequired("User not authenticated".to_string())
    }

    pub fn missing_assessment_id() -> Self {
        SessionError::MissingInput("Assessment ID is missing".to_string())
    }

    /// Maps a non-success HTTP status and the server's message onto the taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => SessionError::AuthRequired(message),
            404 => SessionError::NotFound(message),
            400 | 422 => SessionError::ValidationFailure(message),
            _ => SessionError::NetworkFailure(message),
        }
    }

    /// Human-readable message suitable for display.
    pub fn message(&self) -> &str {
        match self {
            SessionError::AuthRequired(msg)
            | SessionError::MissingInput(msg)
            | SessionError::NotFound(msg)
            | SessionError::NetworkFailure(msg)
            | SessionError::ValidationFailure(msg) => msg,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for SessionError {}
