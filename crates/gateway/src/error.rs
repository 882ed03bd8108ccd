//! Mapping of domain failures to HTTP responses.
//!
//! Authentication and session failures are 401, unreachable upstreams are
//! 503 and retryable, bad input is 400. The body always carries the stable
//! reason code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mimir_core::error::{AuthError, ChatError, Error, SessionError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub retryable: bool,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
            retryable: self.retryable,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, e.code(), e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        let status = match &e {
            AuthError::NoFaceDetected | AuthError::NoMatch | AuthError::AmbiguousMatch => StatusCode::UNAUTHORIZED,
            AuthError::UnknownRole(_) | AuthError::EmptyIdentity(_) => StatusCode::BAD_REQUEST,
            AuthError::FaceService(mimir_core::error::FaceServiceError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            AuthError::FaceService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Session(_) | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let err = Self::new(status, e.code(), e.to_string());
        if status == StatusCode::SERVICE_UNAVAILABLE { err.retryable() } else { err }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Session(s) => s.into(),
            ChatError::UpstreamUnavailable { .. } => {
                let retryable = e.is_retryable();
                Self {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: e.code(),
                    message: e.to_string(),
                    retryable,
                }
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Auth(a) => a.into(),
            Error::Session(s) => s.into(),
            Error::Chat(c) => c.into(),
            Error::Provider(_) | Error::FaceService(_) | Error::Source(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, e.code(), e.to_string()).retryable()
            }
            Error::Config { .. } | Error::Serialization(_) => Self::new(StatusCode::BAD_REQUEST, e.code(), e.to_string()),
            Error::Store(_) | Error::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string())
            }
        }
    }
}
