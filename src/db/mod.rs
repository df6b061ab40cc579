//! Persistence layer: typed repositories over the eleven logical tables,
//! fronted by the `Repository` trait so the engines never depend on whether
//! they're backed by Postgres or the in-memory test double.

pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod repository;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use repository::Repository;

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};

pub struct Database {
    pub pool: deadpool_postgres::Pool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pg_config = config.url.parse::<tokio_postgres::Config>().context("invalid DATABASE_URL")?;

        let manager_config =
            deadpool_postgres::ManagerConfig { recycling_method: deadpool_postgres::RecyclingMethod::Fast };
        let manager = deadpool_postgres::Manager::from_config(pg_config, tokio_postgres::NoTls, manager_config);

        let pool = deadpool_postgres::Pool::builder(manager)
            .max_size(config.max_connections as usize)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .context("failed to build connection pool")?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.get().await.context("failed to acquire connection for migrations")?;
        migrations::run_migrations(&mut conn).await
    }
}
