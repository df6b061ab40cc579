//! Redis-backed cache used by the price oracle adapter and the session
//! verifier. Disabled gracefully (falls through to miss) when Redis is
//! unreachable at startup, so the core keeps running off fresh upstream
//! fetches rather than refusing to boot.

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub default_ttl_secs: u64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            default_ttl_secs: 2,
            enabled: true,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub sets: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    fn calculate_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total > 0 { self.hits as f64 / total as f64 } else { 0.0 };
    }
}

pub struct CacheService {
    client: Option<redis::Client>,
    config: CacheConfig,
    stats: Arc<RwLock<CacheStats>>,
}

impl CacheService {
    pub async fn new(config: CacheConfig) -> Self {
        if !config.enabled {
            info!("price/session cache disabled by configuration");
            return Self { client: None, config, stats: Arc::new(RwLock::new(CacheStats::default())) };
        }

        let client = match redis::Client::open(config.redis_url.clone()) {
            Ok(client) => match client.get_tokio_connection().await {
                Ok(_) => {
                    info!(redis_url = %config.redis_url, "connected to cache backend");
                    Some(client)
                }
                Err(e) => {
                    warn!(error = %e, "cache backend unreachable, running without cache");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "invalid cache url, running without cache");
                None
            }
        };

        Self { client, config, stats: Arc::new(RwLock::new(CacheStats::default())) }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let client = self.client.as_ref()?;
        let mut conn = match client.get_tokio_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "cache connection failed");
                self.bump_errors().await;
                return None;
            }
        };

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.bump_hits().await;
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "failed to deserialize cached value");
                    self.bump_errors().await;
                    None
                }
            },
            Ok(None) => {
                self.bump_misses().await;
                None
            }
            Err(e) => {
                error!(key, error = %e, "cache GET failed");
                self.bump_errors().await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) {
        let Some(client) = self.client.as_ref() else { return };
        let ttl = ttl_secs.unwrap_or(self.config.default_ttl_secs).max(1);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize value for cache SET");
                return;
            }
        };

        match client.get_tokio_connection().await {
            Ok(mut conn) => match conn.set_ex::<_, _, ()>(key, raw, ttl).await {
                Ok(_) => {
                    debug!(key, ttl, "cache SET");
                    self.bump_sets().await;
                }
                Err(e) => {
                    error!(key, error = %e, "cache SET failed");
                    self.bump_errors().await;
                }
            },
            Err(e) => {
                error!(error = %e, "cache connection failed during SET");
                self.bump_errors().await;
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().await.clone();
        stats.calculate_hit_rate();
        stats
    }

    async fn bump_hits(&self) {
        self.stats.write().await.hits += 1;
    }
    async fn bump_misses(&self) {
        self.stats.write().await.misses += 1;
    }
    async fn bump_errors(&self) {
        self.stats.write().await.errors += 1;
    }
    async fn bump_sets(&self) {
        self.stats.write().await.sets += 1;
    }
}
