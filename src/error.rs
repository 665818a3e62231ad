use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

/// Application-level error type
#[derive(Debug)]
pub enum AppError {
    /// Database error
    Database(sqlx::Error),
    /// Validation error
    Validation(String),
    /// Not found error (unknown mission/agent reference)
    NotFound(String),
    /// Operation not valid for the mission's current status
    InvalidState(String),
    /// Agent is already a participant of the mission
    DuplicateParticipant(String),
    /// Trust-level gate failed
    Trust(String),
    /// Caller lacks the required role for the operation
    Authorization(String),
    /// Internal server error
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
    meta: ErrorMeta,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorMeta {
    request_id: String,
}

impl AppError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::DuplicateParticipant(_) => "DUPLICATE_PARTICIPANT",
            Self::Trust(_) => "TRUST_LEVEL_TOO_LOW",
            Self::Authorization(_) => "NOT_AUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {e}"),
            Self::Validation(msg) => write!(f, "Validation error: {msg}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::DuplicateParticipant(msg) => write!(f, "Duplicate participant: {msg}"),
            Self::Trust(msg) => write!(f, "Trust level too low: {msg}"),
            Self::Authorization(msg) => write!(f, "Not authorized: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details: None,
            },
            meta: ErrorMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        };

        match self {
            Self::Database(_) | Self::Internal(_) => {
                HttpResponse::InternalServerError().json(error_response)
            }
            Self::Validation(_) => HttpResponse::BadRequest().json(error_response),
            Self::NotFound(_) => HttpResponse::NotFound().json(error_response),
            Self::InvalidState(_) | Self::DuplicateParticipant(_) => {
                HttpResponse::Conflict().json(error_response)
            }
            Self::Trust(_) | Self::Authorization(_) => {
                HttpResponse::Forbidden().json(error_response)
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}
