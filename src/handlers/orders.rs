//! `/api/orders` — order placement and cancellation.

use crate::error::{AppError, Result};
use crate::handlers::auth_ext::authenticate;
use crate::handlers::state::AppState;
use crate::order_engine::{LockedQuote, PlaceOrderParams};
use crate::types::*;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LockedQuoteRequest {
    pub bid: Decimal,
    pub ask: Decimal,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub contest_id: ContestId,
    pub symbol: String,
    pub symbol_asset_class: AssetClass,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub leverage: Decimal,
    pub requested_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub locked_quote: Option<LockedQuoteRequest>,
}

pub async fn place_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<Json<crate::db::models::Order>> {
    let session = authenticate(&state, &headers).await?;
    let participant = state
        .repo
        .get_participant_by_user(req.contest_id, session.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("participant".to_string()))?;

    let params = PlaceOrderParams {
        participant_id: participant.id,
        symbol: req.symbol,
        symbol_asset_class: req.symbol_asset_class,
        side: req.side,
        order_type: req.order_type,
        quantity: req.quantity,
        leverage: req.leverage,
        requested_price: req.requested_price,
        stop_loss: req.stop_loss,
        take_profit: req.take_profit,
        locked_quote: req.locked_quote.map(|q| LockedQuote { bid: q.bid, ask: q.ask, timestamp: q.timestamp }),
        source: OrderSource::Web,
    };
    let order = state.orders.place_order(params).await?;
    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
    headers: HeaderMap,
) -> Result<Json<crate::db::models::Order>> {
    let session = authenticate(&state, &headers).await?;
    let order = state.repo.get_order(order_id).await?.ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    let participant = state
        .repo
        .get_participant(order.participant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("participant".to_string()))?;
    if participant.user_id != session.user_id {
        return Err(AppError::Forbidden("order belongs to another user".to_string()));
    }
    let order = state.orders.cancel_order(order_id).await?;
    Ok(Json(order))
}
