//! `/api/wallet` — balance and transaction history reads. Mutations to the
//! wallet only ever happen as a side effect of joining, refunding, or
//! finalizing a contest — there is no direct deposit/withdraw endpoint here.

use crate::error::Result;
use crate::handlers::auth_ext::authenticate;
use crate::handlers::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

pub async fn get_wallet(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<crate::db::models::Wallet>> {
    let session = authenticate(&state, &headers).await?;
    let wallet = state.repo.get_or_create_wallet(session.user_id).await?;
    Ok(Json(wallet))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<crate::db::models::WalletTransaction>>> {
    let session = authenticate(&state, &headers).await?;
    let transactions = state.repo.list_wallet_transactions(session.user_id).await?;
    Ok(Json(transactions))
}
