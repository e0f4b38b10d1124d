//! `summarizeData` callable handler.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::{AppState, Error, TRACING_TARGET_SERVER};
use crate::auth::{AuthContext, AuthError, bearer_token};

/// Callable request envelope: the payload travels under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableRequest<T> {
    pub data: T,
}

/// Callable success envelope: the return value travels under `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableResponse<T> {
    pub result: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizeRequest {
    pub prompt: String,
}

impl SummarizeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Generates a reply to `request.prompt` for the caller described by `auth`.
///
/// Callers without a verified email are refused before any generation runs.
pub async fn summarize_data(
    state: &AppState,
    request: SummarizeRequest,
    auth: Option<AuthContext>,
) -> Result<String, Error> {
    let auth = auth.ok_or(AuthError::MissingToken)?;
    if !auth.email_verified {
        return Err(AuthError::EmailNotVerified.into());
    }
    let user_id = auth.user_id().ok_or(AuthError::MissingUserId)?;

    let text = state.orchestrator.generate(&request.prompt, user_id).await?;
    Ok(text)
}

/// Resolves the caller from the `Authorization` header.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AuthError::MissingToken)?;
    state.verifier.verify(token).await
}

/// `POST /summarizeData`
pub async fn summarize_data_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CallableRequest<SummarizeRequest>>, JsonRejection>,
) -> Result<Json<CallableResponse<String>>, Error> {
    let auth = authenticate(&state, &headers).await?;
    if !auth.email_verified {
        return Err(AuthError::EmailNotVerified.into());
    }

    let Json(CallableRequest { data }) =
        body.map_err(|rejection| Error::InvalidArgument(rejection.body_text()))?;

    tracing::debug!(
        target: TRACING_TARGET_SERVER,
        prompt_chars = data.prompt.len(),
        "summarizeData called"
    );

    let result = summarize_data(&state, data, Some(auth)).await?;
    Ok(Json(CallableResponse { result }))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}
