//! PostgreSQL database service
//!
//! Owns the process-wide connection pool shared by the ingestion pipeline
//! and the history API:
//! - Optional creation of the target database on first start
//! - Connection pooling with min/max bounds
//! - Idle connection cleanup and connection lifetime cycling
//! - Query timeout protection
//!
//! Fixed tables are managed by migrations here; topic tables are created at
//! runtime by the dynamic repository.

pub mod error;
mod migrations;
pub mod repositories;
mod repository_impl;
pub mod schema;

pub use error::PostgresError;
pub use sqlx::PgPool;

use std::sync::Arc;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::log::LevelFilter;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    POSTGRES_ADMIN_DATABASE, POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS, POSTGRES_DEFAULT_MAX_CONNECTIONS,
    POSTGRES_DEFAULT_MAX_LIFETIME_SECS, POSTGRES_DEFAULT_MIN_CONNECTIONS,
    POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS, POSTGRES_HEALTH_CHECK_INTERVAL_SECS,
};

/// PostgreSQL database service
///
/// Created once at startup and shared by reference with the ingestion task
/// and request handlers.
pub struct PostgresService {
    pool: PgPool,
}

fn or_default<T: PartialOrd + Default>(value: T, default: T) -> T {
    if value > T::default() { value } else { default }
}

impl PostgresService {
    /// Initialize the database service from configuration
    pub async fn init(config: &PostgresConfig) -> Result<Self, PostgresError> {
        let url = config.url.as_str();
        if url.is_empty() {
            return Err(PostgresError::Config("PostgreSQL URL is required".into()));
        }

        let max_connections = or_default(config.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
        let min_connections = or_default(config.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS);
        let acquire_timeout = or_default(
            config.acquire_timeout_secs,
            POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
        );
        let idle_timeout = or_default(config.idle_timeout_secs, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS);
        let max_lifetime = or_default(config.max_lifetime_secs, POSTGRES_DEFAULT_MAX_LIFETIME_SECS);
        let statement_timeout = or_default(
            config.statement_timeout_secs,
            POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
        );

        let mut options: PgConnectOptions = url
            .parse()
            .map_err(|e| PostgresError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;

        if config.create_database {
            let admin = match config.admin_url.as_deref() {
                Some(admin_url) => admin_url.parse().map_err(|e| {
                    PostgresError::Config(format!("Invalid PostgreSQL admin URL: {}", e))
                })?,
                None => options.clone().database(POSTGRES_ADMIN_DATABASE),
            };
            migrations::ensure_database_exists(&options, admin).await?;
        }

        options = options.log_statements(LevelFilter::Trace);

        // Set statement timeout at connection level for query protection
        options = options.options([("statement_timeout", format!("{}s", statement_timeout))]);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .idle_timeout(Duration::from_secs(idle_timeout))
            .max_lifetime(Duration::from_secs(max_lifetime))
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!(
            max_connections,
            min_connections,
            acquire_timeout_secs = acquire_timeout,
            idle_timeout_secs = idle_timeout,
            max_lifetime_secs = max_lifetime,
            statement_timeout_secs = statement_timeout,
            "PostgresService initialized"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }

    /// Start a background health check task
    pub fn start_health_check_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(POSTGRES_HEALTH_CHECK_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("PostgreSQL health check task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = sqlx::query("SELECT 1").execute(&db.pool).await {
                            tracing::warn!("PostgreSQL health check failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Cheap liveness probe used by the health endpoint
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
