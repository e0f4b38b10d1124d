//! Callable error envelope and the mapping from internal errors to it.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::TRACING_TARGET_SERVER;
use crate::auth::AuthError;
use crate::backend::GenerationError;

/// Canonical status names used by the callable protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableStatus {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    ResourceExhausted,
    Unavailable,
    Internal,
}

impl CallableStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure of one `summarizeData` call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    AuthRequired(#[from] AuthError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl Error {
    pub fn status(&self) -> CallableStatus {
        match self {
            Self::AuthRequired(AuthError::EmailNotVerified) => CallableStatus::PermissionDenied,
            Self::AuthRequired(_) => CallableStatus::Unauthenticated,
            Self::InvalidArgument(_) => CallableStatus::InvalidArgument,
            Self::Generation(GenerationError::Api { status: 429, .. }) => {
                CallableStatus::ResourceExhausted
            }
            Self::Generation(GenerationError::Api { status: 503, .. }) => {
                CallableStatus::Unavailable
            }
            Self::Generation(_) => CallableStatus::Internal,
        }
    }

    /// Message shown to the caller. Token details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::AuthRequired(AuthError::EmailNotVerified) => {
                "Email address must be verified to use this function.".to_owned()
            }
            Self::AuthRequired(AuthError::MissingUserId) => {
                "Unauthenticated: no user id in auth context.".to_owned()
            }
            Self::AuthRequired(_) => "Unauthenticated: a valid ID token is required.".to_owned(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == CallableStatus::Internal {
            tracing::error!(target: TRACING_TARGET_SERVER, error = %self, "call failed");
        } else {
            tracing::warn!(
                target: TRACING_TARGET_SERVER,
                status = status.as_str(),
                error = %self,
                "call rejected"
            );
        }

        let envelope = ErrorEnvelope {
            error: ErrorBody {
                status: status.as_str(),
                message: self.public_message(),
            },
        };
        (status.http_status(), Json(envelope)).into_response()
    }
}
