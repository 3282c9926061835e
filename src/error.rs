use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};

/// Malformed reservation request, detected before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub const CONFLICT_MESSAGE: &str = "Some spots are already reserved";

/// Outcome of a failed reservation. `E` is the error type of the store the
/// reservation ran against; it is carried unmodified in [`ReservationError::Store`].
#[derive(Debug, Error)]
pub enum ReservationError<E> {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Spots {} not found", .0.join(", "))]
    SpotsNotFound(Vec<String>),

    #[error("Some spots are already reserved")]
    Conflict,

    #[error(transparent)]
    Store(E),
}

/// Error returned by HTTP handlers, rendered as `{ "message": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg,
            ApiError::Internal(detail) => {
                error!(detail = %detail, "Request failed");
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl<E: std::fmt::Display> From<ReservationError<E>> for ApiError {
    fn from(err: ReservationError<E>) -> Self {
        match err {
            ReservationError::Store(e) => ApiError::Internal(e.to_string()),
            ReservationError::Conflict => {
                warn!("Reservation rejected: {}", CONFLICT_MESSAGE);
                ApiError::BadRequest(CONFLICT_MESSAGE.to_string())
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // field order is stable so repeated requests get the same message
        let by_field: BTreeMap<_, _> = errors.field_errors().into_iter().collect();
        let message = by_field
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .collect::<Vec<_>>()
            .join("; ");
        ApiError::BadRequest(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn not_found_message_lists_missing_names() {
        let err: ReservationError<std::io::Error> =
            ReservationError::SpotsNotFound(vec!["C".to_string(), "D".to_string()]);
        assert_eq!(err.to_string(), "Spots C, D not found");
    }

    #[tokio::test]
    async fn domain_errors_map_to_bad_request() {
        let cases: Vec<(ReservationError<std::io::Error>, &str)> = vec![
            (ValidationError::new("Spots must be a non-empty array").into(), "Spots must be a non-empty array"),
            (ReservationError::SpotsNotFound(vec!["C".to_string()]), "Spots C not found"),
            (ReservationError::Conflict, "Some spots are already reserved"),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["message"], expected);
        }
    }

    #[tokio::test]
    async fn store_errors_are_hidden_behind_500() {
        let err: ReservationError<std::io::Error> =
            ReservationError::Store(std::io::Error::other("connection reset"));

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Internal server error");
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = ApiError::NotFound("Event not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Event not found");
    }
}
