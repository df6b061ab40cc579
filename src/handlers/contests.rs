//! `/api/contests` — contest discovery, joining, and leaderboard reads.

use crate::error::{AppError, Result};
use crate::handlers::auth_ext::authenticate;
use crate::handlers::state::AppState;
use crate::types::{ContestId, ContestStatus};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub participant_id: crate::types::ParticipantId,
    pub metric: rust_decimal::Decimal,
    pub is_tied: bool,
    pub disqualified: bool,
}

pub async fn list_active(State(state): State<AppState>) -> Result<Json<Vec<crate::db::models::Contest>>> {
    let contests = state.repo.list_contests_by_status(ContestStatus::Active).await?;
    Ok(Json(contests))
}

pub async fn get_contest(
    State(state): State<AppState>,
    Path(contest_id): Path<ContestId>,
) -> Result<Json<crate::db::models::Contest>> {
    let contest = state
        .repo
        .get_contest(contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contest {contest_id}")))?;
    Ok(Json(contest))
}

pub async fn join(
    State(state): State<AppState>,
    Path(contest_id): Path<ContestId>,
    headers: HeaderMap,
) -> Result<Json<crate::db::models::Participant>> {
    let session = authenticate(&state, &headers).await?;
    let contest = state
        .repo
        .get_contest(contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contest {contest_id}")))?;

    let participant = match contest.kind {
        crate::types::ContestKind::Competition => {
            state.lifecycle.enter_competition(contest_id, session.user_id).await?
        }
        crate::types::ContestKind::Challenge => {
            state.lifecycle.accept_challenge(contest_id, session.user_id).await?
        }
    };
    Ok(Json(participant))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path(contest_id): Path<ContestId>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    let contest = state
        .repo
        .get_contest(contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contest {contest_id}")))?;
    let participants = state.repo.list_participants_by_contest(contest_id).await?;
    let ranked = state.lifecycle.calculate_rankings(participants, &contest, false);
    let entries = ranked
        .into_iter()
        .map(|r| LeaderboardEntry {
            rank: r.rank,
            participant_id: r.participant_id,
            metric: r.metric,
            is_tied: r.is_tied,
            disqualified: r.disqualified,
        })
        .collect();
    Ok(Json(entries))
}
