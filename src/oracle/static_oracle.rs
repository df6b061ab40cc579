use super::{PriceOracle, Quote};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory oracle stub for tests: holds a fixed table of quotes that the
/// test sets up directly, with no network or cache dependency.
pub struct StaticPriceOracle {
    quotes: RwLock<HashMap<String, Quote>>,
    market_open: RwLock<bool>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self { quotes: RwLock::new(HashMap::new()), market_open: RwLock::new(true) }
    }

    pub async fn set_quote(&self, quote: Quote) {
        self.quotes.write().await.insert(quote.symbol.clone(), quote);
    }

    pub async fn set_market_open(&self, open: bool) {
        *self.market_open.write().await = open;
    }
}

impl Default for StaticPriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.quotes
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| AppError::PriceUnavailable(symbol.to_string()))
    }

    async fn quote_batch(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        let table = self.quotes.read().await;
        Ok(symbols.iter().filter_map(|s| table.get(s).cloned().map(|q| (s.clone(), q))).collect())
    }

    async fn is_market_open(&self) -> bool {
        *self.market_open.read().await
    }

    async fn market_status(&self) -> String {
        if self.is_market_open().await { "open".to_string() } else { "closed".to_string() }
    }
}
