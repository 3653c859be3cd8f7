use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Every failure the route layer can surface. Validation and not-found
/// conditions stay distinct; storage and upstream failures collapse into
/// an opaque 500 after being logged.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("barber not found or user is not a barber")]
    InvalidBarber,
    #[error("service not found or inactive")]
    InvalidService,
    #[error("barber already has an appointment at this time")]
    SlotTaken,
    #[error("client not found")]
    ClientNotFound,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("no pending scheduling for this phone")]
    NoPendingScheduling,
    #[error("invalid credentials")]
    Unauthorized,
    #[error("insufficient role")]
    Forbidden,
    #[error("narrative service not configured")]
    NarrativeUnavailable,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Upstream(#[from] reqwest::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn public_message(&self) -> String {
        match self {
            ApiError::Database(_) | ApiError::Upstream(_) | ApiError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidBarber
            | ApiError::InvalidService
            | ApiError::SlotTaken
            | ApiError::ClientNotFound => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::NoPendingScheduling => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NarrativeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Upstream(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {self}");
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}

/// Maps a unique-index violation on the (barber_id, date_time) slot index
/// to the conflict error; everything else passes through.
pub fn slot_conflict(err: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return ApiError::SlotTaken;
        }
    }
    ApiError::Database(err)
}
