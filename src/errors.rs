use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::intake::IntakeError;
use crate::services::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Persistence(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::NotFound(err.to_string()),
            RepositoryError::Conflict(_) => AppError::Conflict(err.to_string()),
            RepositoryError::MissingId => AppError::BadRequest(err.to_string()),
            RepositoryError::Storage(_) | RepositoryError::Serialization(_) => {
                AppError::Persistence(err.to_string())
            }
        }
    }
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::MissingField(_) => AppError::Validation(err.to_string()),
            IntakeError::NoImage
            | IntakeError::AlreadyEstimating
            | IntakeError::AlreadyEstimated => AppError::Conflict(err.to_string()),
            IntakeError::DraftNotFound(_) => AppError::NotFound(err.to_string()),
            IntakeError::Repository(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StorageError;

    #[test]
    fn test_persistence_failure_maps_to_500() {
        let err: AppError =
            RepositoryError::Storage(StorageError::Unavailable("disk full".to_string())).into();
        assert!(err.to_string().contains("changes not saved"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_maps_to_422() {
        let err: AppError = IntakeError::MissingField("phone").into();
        assert_eq!(err.to_string(), "required field is empty: phone");
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_nested_repository_error() {
        let err: AppError =
            IntakeError::Repository(RepositoryError::NotFound("x".to_string())).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
