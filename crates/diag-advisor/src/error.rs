use thiserror::Error;

/// Advisor failures. None of them affect a diagnostic session.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Advisor unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed advisor payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid advisor response: {0}")]
    InvalidResponse(String),
}
