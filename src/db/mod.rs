//! PostgreSQL pool, migrations and the health check used by `/health`

use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Database startup failure
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to database")]
    Connect(#[source] sqlx::Error),

    #[error("Failed to run migrations")]
    Migrate(#[from] MigrateError),
}

/// Snapshot of the pool as reported by the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub reachable: bool,
    /// Round trip of `SELECT 1`, absent when the ping failed
    pub latency_ms: Option<u64>,
    /// Open connections, idle ones included
    pub connections: u32,
    pub idle: usize,
}

/// Pool settings derived from configuration
pub fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
}

/// Connect eagerly so a bad DATABASE_URL fails startup
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!("Connecting to database at {}", config.database_url_masked());

    let pool = pool_options(config)
        .connect(&config.database_url)
        .await
        .map_err(DbError::Connect)?;

    tracing::info!(
        max_connections = config.db_max_connections,
        acquire_timeout_secs = config.db_acquire_timeout_seconds,
        "Database pool ready"
    );
    Ok(pool)
}

/// Apply pending migrations from `./migrations`
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    let migrator = sqlx::migrate!("./migrations");
    migrator.run(pool).await?;

    tracing::info!(known = migrator.iter().count(), "Database migrations applied");
    Ok(())
}

/// Ping the database; failures are reported in the snapshot, never returned
pub async fn check_health(pool: &PgPool) -> DatabaseHealth {
    let started = Instant::now();
    let ping = sqlx::query("SELECT 1").execute(pool).await;

    let latency_ms = match ping {
        Ok(_) => Some(elapsed_ms(started)),
        Err(e) => {
            tracing::warn!("Database ping failed: {}", e);
            None
        }
    };

    DatabaseHealth {
        reachable: latency_ms.is_some(),
        latency_ms,
        connections: pool.size(),
        idle: pool.num_idle(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
