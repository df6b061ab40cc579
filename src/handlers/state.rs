//! Shared application state handed to every handler via axum's `State`
//! extractor. Holds only the engines and collaborators — no request-scoped
//! data lives here.

use crate::auth::SessionVerifier;
use crate::contest_lifecycle::ContestLifecycle;
use crate::db::Repository;
use crate::order_engine::OrderEngine;
use crate::oracle::PriceOracle;
use crate::position_engine::PositionEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub oracle: Arc<dyn PriceOracle>,
    pub sessions: Arc<dyn SessionVerifier>,
    pub orders: Arc<OrderEngine>,
    pub positions: Arc<PositionEngine>,
    pub lifecycle: Arc<ContestLifecycle>,
}
