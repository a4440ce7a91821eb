use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::types::PostgresConfig;

pub mod models;
pub mod store;

pub type PgPool = Pool<Postgres>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("write failed: {0}")]
    Write(String),
}

/// Create a PostgreSQL connection pool using the provided config.
///
/// This uses a small, conservative pool size suitable for a single service
/// instance. Connection establishment is performed eagerly so misconfiguration
/// is surfaced early at startup.
pub async fn create_pg_pool(cfg: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(15))
        .connect(&cfg.url)
        .await?;
    Ok(pool)
}
