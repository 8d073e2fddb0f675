use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;

/// Stable error codes for the API
/// Format: ERR_<CATEGORY>_<NNN>; codes are never renamed or reused
pub mod codes {
    pub const DATABASE_001: (&str, u16) = ("ERR_DATABASE_001", 500);
    pub const VALIDATION_001: (&str, u16) = ("ERR_VALIDATION_001", 400);
    pub const BUSINESS_001: (&str, u16) = ("ERR_BUSINESS_001", 400);
    pub const NOT_FOUND_001: (&str, u16) = ("ERR_NOT_FOUND_001", 404);
    pub const CONFLICT_001: (&str, u16) = ("ERR_CONFLICT_001", 409);
    pub const INTERNAL_001: (&str, u16) = ("ERR_INTERNAL_001", 500);
    pub const BAD_REQUEST_001: (&str, u16) = ("ERR_BAD_REQUEST_001", 400);
    pub const UPSTREAM_001: (&str, u16) = ("ERR_UPSTREAM_001", 502);
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Rejected by a business rule (debit not allowed, endpoint rejected,
    /// third-party transfer and friends).
    #[error("{0}")]
    BusinessRule(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The customers service or another collaborator misbehaved.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::BusinessRule(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => codes::DATABASE_001.0,
            AppError::Validation(_) => codes::VALIDATION_001.0,
            AppError::BusinessRule(_) => codes::BUSINESS_001.0,
            AppError::NotFound(_) => codes::NOT_FOUND_001.0,
            AppError::Conflict(_) => codes::CONFLICT_001.0,
            AppError::Internal(_) => codes::INTERNAL_001.0,
            AppError::BadRequest(_) => codes::BAD_REQUEST_001.0,
            AppError::Upstream(_) => codes::UPSTREAM_001.0,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::Conflict(what),
            RepositoryError::Database(what) => AppError::Database(what),
        }
    }
}

impl From<crate::customers::CustomerError> for AppError {
    fn from(err: crate::customers::CustomerError) -> Self {
        use crate::customers::CustomerError::*;
        match err {
            CustomerNotFound(id) => AppError::Validation(format!("unknown customer {id}")),
            AccountNotFound(id) => AppError::Validation(format!("unknown account {id}")),
            RequestError(e) => AppError::Upstream(e.to_string()),
            InvalidResponse(what) => AppError::Upstream(what),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let error = AppError::Validation("amount must be positive".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), "ERR_VALIDATION_001");
    }

    #[test]
    fn not_found_maps_to_404() {
        let error = AppError::NotFound("transfer".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_409() {
        let error = AppError::Conflict("not PENDING".to_string());
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn repository_errors_translate() {
        let error: AppError = RepositoryError::NotFound("x".into()).into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);

        let error: AppError = RepositoryError::Conflict("x".into()).into();
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn response_body_carries_the_message() {
        let error = AppError::BusinessRule("rejecting third-party transfer".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
