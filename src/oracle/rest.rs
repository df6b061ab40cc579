use super::{quote_batch_sequential, stale_after, PriceOracle, Quote};
use crate::cache::CacheService;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RestPriceOracleConfig {
    pub base_url: String,
    pub cache_ttl_ms: u64,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UpstreamQuote {
    bid: Decimal,
    ask: Decimal,
}

/// REST-backed price oracle: fetches from the upstream feed and caches the
/// result through `CacheService`, keyed by symbol. The cache is a pure
/// optimization — a cache miss simply triggers a fresh upstream fetch.
pub struct RestPriceOracle {
    config: RestPriceOracleConfig,
    http: reqwest::Client,
    cache: Arc<CacheService>,
}

impl RestPriceOracle {
    pub fn new(config: RestPriceOracleConfig, cache: Arc<CacheService>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { config, http, cache }
    }

    fn cache_key(symbol: &str) -> String {
        format!("price_quote:{}", symbol)
    }

    async fn fetch_upstream(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}/quote/{}", self.config.base_url, symbol);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::PriceUnavailable(format!("{symbol}: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::PriceUnavailable(format!(
                "{symbol}: upstream returned {}",
                resp.status()
            )));
        }

        let upstream: UpstreamQuote = resp
            .json()
            .await
            .map_err(|e| AppError::PriceUnavailable(format!("{symbol}: malformed response ({e})")))?;

        let mid = (upstream.bid + upstream.ask) / Decimal::TWO;
        let quote = Quote {
            symbol: symbol.to_string(),
            bid: upstream.bid,
            ask: upstream.ask,
            mid,
            spread: upstream.ask - upstream.bid,
            timestamp: Utc::now(),
            is_fallback: false,
            is_stale: false,
        };

        self.cache.set(&Self::cache_key(symbol), &quote, Some(self.config.cache_ttl_ms / 1000)).await;
        Ok(quote)
    }
}

#[async_trait]
impl PriceOracle for RestPriceOracle {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        if let Some(mut cached) = self.cache.get::<Quote>(&Self::cache_key(symbol)).await {
            cached.is_stale = stale_after(Utc::now(), cached.timestamp, self.config.cache_ttl_ms);
            return Ok(cached);
        }
        self.fetch_upstream(symbol).await
    }

    async fn quote_batch(&self, symbols: &[String]) -> Result<HashMap<String, Quote>> {
        Ok(quote_batch_sequential(self, symbols).await)
    }

    async fn is_market_open(&self) -> bool {
        // Forex trades nearly continuously Sun 22:00 UTC through Fri 22:00 UTC;
        // a full trading-calendar feed is an external collaborator this core
        // does not own, so closed weekends are the only status asserted here.
        let now = Utc::now();
        use chrono::Weekday::{Sat, Sun};
        !matches!(now.weekday(), Sat | Sun)
    }

    async fn market_status(&self) -> String {
        if self.is_market_open().await {
            "open".to_string()
        } else {
            "closed_weekend".to_string()
        }
    }
}
