//! REST surface: thin handlers that translate HTTP requests into engine
//! calls and engine errors into `AppError` responses. No business logic
//! lives here — every invariant is enforced inside the engines.

pub mod auth_ext;
pub mod contests;
pub mod orders;
pub mod positions;
pub mod state;
pub mod wallet;

pub use state::AppState;

use crate::tracing_logger::CorrelationId;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::time::Instant;
use tower_http::cors::CorsLayer;

async fn log_request<B>(request: Request<B>, next: Next<B>) -> Response {
    let correlation_id = CorrelationId::from_header(
        request.headers().get("x-correlation-id").and_then(|h| h.to_str().ok()),
    );
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %correlation_id,
        %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "request completed"
    );
    response
}

pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/api/contests", get(contests::list_active))
        .route("/api/contests/:contest_id", get(contests::get_contest))
        .route("/api/contests/:contest_id/join", post(contests::join))
        .route("/api/contests/:contest_id/leaderboard", get(contests::leaderboard))
        .route("/api/orders", post(orders::place_order))
        .route("/api/orders/:order_id/cancel", post(orders::cancel_order))
        .route("/api/positions/contest/:contest_id", get(positions::list_open))
        .route("/api/positions/:position_id/close", post(positions::close_position))
        .route("/api/wallet", get(wallet::get_wallet))
        .route("/api/wallet/transactions", get(wallet::list_transactions))
        .layer(middleware::from_fn(log_request))
        .layer(cors)
        .with_state(state)
}
