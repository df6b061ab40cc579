//! Price oracle adapter: the minimal contract the core consumes from an
//! external forex price feed. Engines depend on `Arc<dyn PriceOracle>`, not
//! a concrete implementation, so tests can swap in `StaticPriceOracle`.

mod rest;
mod static_oracle;

pub use rest::{RestPriceOracle, RestPriceOracleConfig};
pub use static_oracle::StaticPriceOracle;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
    pub spread: Decimal,
    pub timestamp: DateTime<Utc>,
    pub is_fallback: bool,
    pub is_stale: bool,
}

impl Quote {
    /// A quote is safe to act on for automatic, capital-affecting decisions
    /// (SL/TP triggers, liquidation) only when it is neither fallback-sourced
    /// nor stale by the scanner's own freshness window.
    pub fn is_safe_for_auto_action(&self, max_age: chrono::Duration) -> bool {
        !self.is_fallback && !self.is_stale && (Utc::now() - self.timestamp) <= max_age
    }
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    /// Always preferred over N single lookups by callers that need more
    /// than one symbol.
    async fn quote_batch(&self, symbols: &[String]) -> Result<HashMap<String, Quote>>;

    async fn is_market_open(&self) -> bool;

    async fn market_status(&self) -> String;
}

/// Default batch implementation for oracles without a native batch
/// endpoint: fan out sequentially, tolerating individual symbol failures
/// so one bad feed entry does not sink the whole batch.
pub async fn quote_batch_sequential(
    oracle: &dyn PriceOracle,
    symbols: &[String],
) -> HashMap<String, Quote> {
    let mut out = HashMap::with_capacity(symbols.len());
    for symbol in symbols {
        match oracle.quote(symbol).await {
            Ok(q) => {
                out.insert(symbol.clone(), q);
            }
            Err(e) => {
                tracing::warn!(symbol, error = %e, "quote fetch failed during batch");
            }
        }
    }
    out
}

pub fn stale_after(now: DateTime<Utc>, timestamp: DateTime<Utc>, ttl_ms: u64) -> bool {
    (now - timestamp).num_milliseconds() > ttl_ms as i64
}
