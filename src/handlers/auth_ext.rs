//! Shared header-extraction helper used by every authenticated handler.

use crate::auth::Session;
use crate::error::AppError;
use crate::handlers::state::AppState;
use axum::http::HeaderMap;

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;
    state.sessions.verify(token).await
}
