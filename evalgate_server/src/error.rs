use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use evalgate::access::Forbidden;
use evalgate_axum::AuthFailed;
use evalgate_provider::ProviderError;
use serde_json::{json, Value};
use thiserror::Error;

use crate::evaluations::{InvalidCursor, StoreError, ValidationError};

/// An error raised while handling a request
#[derive(Debug, Error)]
pub enum ApiError {
    /// The caller may not perform this operation
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    /// The requested evaluation does not exist
    #[error("Evaluation not found")]
    NotFound,
    /// The pagination cursor could not be decoded
    #[error("Invalid cursor")]
    InvalidCursor(#[from] InvalidCursor),
    /// The request was well-formed but semantically invalid
    #[error("{0}")]
    Validation(String),
    /// The identity provider rejected or failed the call
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The evaluation store failed
    #[error(transparent)]
    Store(StoreError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

macro_rules! unprocessable_rejection {
    ($($rejection:ty),*) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    Self::Validation(rejection.body_text())
                }
            }
        )*
    };
}

unprocessable_rejection!(JsonRejection, PathRejection, QueryRejection);

fn detail(status: StatusCode, detail: impl Into<Value>) -> Response {
    (status, Json(json!({ "detail": detail.into() }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Forbidden(err) => AuthFailed::from(err).into_response(),
            Self::NotFound => detail(StatusCode::NOT_FOUND, self.to_string()),
            Self::InvalidCursor(_) => detail(StatusCode::BAD_REQUEST, self.to_string()),
            Self::Validation(msg) => detail(StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Provider(ProviderError::Status { status, detail: body }) => {
                tracing::debug!(%status, "relaying identity provider error");
                detail(status, body)
            }
            Self::Provider(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "identity provider unavailable");
                detail(StatusCode::BAD_GATEWAY, "Identity provider unavailable")
            }
            Self::Store(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::error!(error, "evaluation store failed");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}
