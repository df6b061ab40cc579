//! `/api/positions` — open position listing and user-initiated close.

use crate::error::{AppError, Result};
use crate::handlers::auth_ext::authenticate;
use crate::handlers::state::AppState;
use crate::types::*;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

pub async fn list_open(
    State(state): State<AppState>,
    Path(contest_id): Path<ContestId>,
    headers: HeaderMap,
) -> Result<Json<Vec<crate::db::models::Position>>> {
    let session = authenticate(&state, &headers).await?;
    let participant = state
        .repo
        .get_participant_by_user(contest_id, session.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("participant".to_string()))?;
    let positions = state.repo.list_open_positions_by_participant(participant.id).await?;
    Ok(Json(positions))
}

pub async fn close_position(
    State(state): State<AppState>,
    Path(position_id): Path<PositionId>,
    headers: HeaderMap,
) -> Result<Json<crate::db::models::Position>> {
    let session = authenticate(&state, &headers).await?;
    let position =
        state.repo.get_position(position_id).await?.ok_or_else(|| AppError::NotFound(format!("position {position_id}")))?;
    let participant = state
        .repo
        .get_participant(position.participant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("participant".to_string()))?;
    if participant.user_id != session.user_id {
        return Err(AppError::Forbidden("position belongs to another user".to_string()));
    }
    let closed = state.positions.close_position(position_id).await?;
    Ok(Json(closed))
}
