use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid card selection: {0}")]
    InvalidCardSelection(String),

    #[error("Battle is not joinable: {0}")]
    BattleNotJoinable(String),

    #[error("Battle is not in progress")]
    BattleNotActive,

    #[error("Round {0} already played")]
    RoundAlreadyPlayed(i32),

    #[error("Battle requires exactly {expected} cards, got {actual}")]
    CardCountMismatch { expected: i32, actual: usize },

    #[error("Battle can no longer be cancelled")]
    BattleNotCancellable,

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            AppError::InvalidCardSelection(_) => (StatusCode::BAD_REQUEST, "INVALID_CARD_SELECTION"),
            AppError::BattleNotJoinable(_) => (StatusCode::CONFLICT, "BATTLE_NOT_JOINABLE"),
            AppError::BattleNotActive => (StatusCode::CONFLICT, "BATTLE_NOT_ACTIVE"),
            AppError::RoundAlreadyPlayed(_) => (StatusCode::CONFLICT, "ROUND_ALREADY_PLAYED"),
            AppError::CardCountMismatch { .. } => (StatusCode::BAD_REQUEST, "CARD_COUNT_MISMATCH"),
            AppError::BattleNotCancellable => (StatusCode::CONFLICT, "BATTLE_NOT_CANCELLABLE"),
            AppError::AuthError(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Storage details stay in the logs.
        let message = match &self {
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                "Internal error, please retry later".to_string()
            }
            AppError::RateLimitExceeded => "Too many requests. Please try again later.".to_string(),
            _ => self.to_string(),
        };

        let details = match &self {
            AppError::CardCountMismatch { expected, actual } => Some(serde_json::json!({
                "expected": expected,
                "actual": actual,
            })),
            _ => None,
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battle_errors_map_to_conflict() {
        let cases = [
            AppError::BattleNotJoinable("already joined".to_string()),
            AppError::BattleNotActive,
            AppError::RoundAlreadyPlayed(2),
            AppError::BattleNotCancellable,
        ];
        for err in cases {
            assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
        }
    }

    #[test]
    fn selection_errors_map_to_bad_request() {
        let invalid = AppError::InvalidCardSelection("card 7 is locked".to_string());
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let mismatch = AppError::CardCountMismatch { expected: 3, actual: 2 };
        assert_eq!(mismatch.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn card_count_mismatch_message_names_both_counts() {
        let err = AppError::CardCountMismatch { expected: 5, actual: 4 };
        assert_eq!(err.to_string(), "Battle requires exactly 5 cards, got 4");
    }
}
