//! Forex contest trading core — standalone REST API server.

use anyhow::{Context, Result};
use fxcontest_core::auth::JwtSessionVerifier;
use fxcontest_core::cache::{CacheConfig, CacheService};
use fxcontest_core::config::Config;
use fxcontest_core::contest_lifecycle::ContestLifecycle;
use fxcontest_core::db::{Database, PostgresRepository, Repository};
use fxcontest_core::events::RepositoryEventSink;
use fxcontest_core::handlers::AppState;
use fxcontest_core::ledger::WalletLedger;
use fxcontest_core::order_engine::OrderEngine;
use fxcontest_core::oracle::{PriceOracle, RestPriceOracle, RestPriceOracleConfig};
use fxcontest_core::position_engine::PositionEngine;
use fxcontest_core::restrictions::PostgresRestrictionsService;
use fxcontest_core::risk::RiskPolicy;
use fxcontest_core::scheduler::Scheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::info;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.server.log_level))
        .init();

    info!(host = %config.server.host, port = config.server.port, "starting fxcontest-server");

    let database = Database::connect(&config.database).await.context("connecting to database")?;
    database.run_migrations().await.context("running database migrations")?;

    let repo: Arc<dyn Repository> = Arc::new(PostgresRepository::new(database.pool.clone()));

    let cache = Arc::new(
        CacheService::new(CacheConfig {
            redis_url: config.price_feed.redis_url.clone(),
            default_ttl_secs: (config.price_feed.cache_ttl_ms / 1000).max(1),
            enabled: true,
        })
        .await,
    );

    let oracle: Arc<dyn PriceOracle> = Arc::new(RestPriceOracle::new(
        RestPriceOracleConfig {
            base_url: config.price_feed.primary_source.clone(),
            cache_ttl_ms: config.price_feed.cache_ttl_ms,
            request_timeout: Duration::from_millis(config.scheduler.oracle_deadline_ms),
        },
        cache,
    ));

    let risk = Arc::new(RiskPolicy::new(config.risk.clone()));
    let restrictions = Arc::new(PostgresRestrictionsService::new(database.pool.clone()));
    let events = Arc::new(RepositoryEventSink::new(repo.clone()));
    let sessions = Arc::new(JwtSessionVerifier::new(&config.auth.jwt_secret));
    let ledger = Arc::new(WalletLedger::new(repo.clone()));

    let orders = Arc::new(OrderEngine::new(repo.clone(), oracle.clone(), risk.clone(), restrictions.clone(), events.clone()));
    let positions = Arc::new(PositionEngine::new(
        repo.clone(),
        oracle.clone(),
        events.clone(),
        config.risk.margin_thresholds.clone(),
    ));
    let lifecycle = Arc::new(ContestLifecycle::new(
        repo.clone(),
        ledger.clone(),
        positions.clone(),
        oracle.clone(),
        restrictions.clone(),
        events.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        repo.clone(),
        orders.clone(),
        positions.clone(),
        lifecycle.clone(),
        config.scheduler.clone(),
    ));
    let _scan_handles = scheduler.spawn_all();

    let cors = if config.server.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> =
            config.server.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(tower_http::cors::AllowOrigin::list(origins))
    };

    let state = AppState { repo, oracle, sessions, orders, positions, lifecycle };
    let app = fxcontest_core::handlers::router(state, cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(%addr, "listening");
    axum::Server::bind(&addr).serve(app.into_make_service()).await.context("server error")?;

    Ok(())
}
