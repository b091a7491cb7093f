//! Mapping from core errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokenline_core::{
    AuditError, IssueError, LedgerError, RegistryError, SequenceError, StationError,
};
use tokenline_core::display::DisplayError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn registry_status(e: &RegistryError) -> StatusCode {
    if e.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    if e.is_retryable() {
        StatusCode::CONFLICT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::new(registry_status(&e), e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::new(ledger_status(&e), e.to_string())
    }
}

impl From<SequenceError> for ApiError {
    fn from(e: SequenceError) -> Self {
        let status = match &e {
            SequenceError::TransientRegistry(inner) => registry_status(inner),
            SequenceError::Ledger(inner) => ledger_status(inner),
            SequenceError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<IssueError> for ApiError {
    fn from(e: IssueError) -> Self {
        let status = match &e {
            IssueError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            IssueError::Sequence(SequenceError::TransientRegistry(inner))
            | IssueError::Registry(inner) => registry_status(inner),
            IssueError::Sequence(SequenceError::Ledger(inner)) => ledger_status(inner),
            IssueError::Sequence(SequenceError::State(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            IssueError::Contention { .. } => StatusCode::CONFLICT,
        };
        Self::new(status, e.to_string())
    }
}

impl From<StationError> for ApiError {
    fn from(e: StationError) -> Self {
        let status = match &e {
            StationError::Closed(_) | StationError::ClaimContention { .. } => StatusCode::CONFLICT,
            StationError::NotFound(_) => StatusCode::NOT_FOUND,
            StationError::Registry(inner) => registry_status(inner),
            StationError::Ledger(inner) => ledger_status(inner),
        };
        Self::new(status, e.to_string())
    }
}

impl From<DisplayError> for ApiError {
    fn from(e: DisplayError) -> Self {
        Self::unavailable(e.to_string())
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        Self::internal(format!("Audit query failed: {}", e))
    }
}
