//! PostgreSQL migration management
//!
//! Handles database creation, schema initialization and versioned migrations.

use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection, PgPool};

use super::error::PostgresError;
use super::schema::{SCHEMA, SCHEMA_VERSION};
use crate::utils::sql::quote_ident;

/// Create the target database if it does not exist yet
///
/// Connects through `admin` (normally the `postgres` maintenance database)
/// and issues `CREATE DATABASE`. A concurrent creator winning the race is
/// not an error.
pub async fn ensure_database_exists(
    target: &PgConnectOptions,
    admin: PgConnectOptions,
) -> Result<(), PostgresError> {
    let Some(database) = target.get_database() else {
        return Ok(());
    };

    let mut conn = admin.connect().await?;
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(database)
            .fetch_one(&mut conn)
            .await?;

    if !exists {
        let sql = format!("CREATE DATABASE {}", quote_ident(database));
        match sqlx::query(&sql).execute(&mut conn).await {
            Ok(_) => tracing::info!(database, "Created PostgreSQL database"),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("42P04") => {
                tracing::debug!(database, "Database created concurrently");
            }
            Err(e) => {
                let _ = conn.close().await;
                return Err(e.into());
            }
        }
    }

    conn.close().await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), PostgresError> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_name = 'schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        tracing::debug!("Applying initial PostgreSQL schema v{}", SCHEMA_VERSION);
        apply_initial_schema(pool).await?;
        return Ok(());
    }

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    match current_version {
        None => {
            tracing::debug!("Applying initial PostgreSQL schema v{}", SCHEMA_VERSION);
            apply_initial_schema(pool).await?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            tracing::debug!(
                "Migrating PostgreSQL schema from v{} to v{}",
                v,
                SCHEMA_VERSION
            );
            for version in (v + 1)..=SCHEMA_VERSION {
                apply_versioned_migration(pool, version).await?;
            }
        }
        Some(v) if v > SCHEMA_VERSION => {
            tracing::warn!(
                "PostgreSQL schema version {} is newer than application version {}. This may cause issues.",
                v,
                SCHEMA_VERSION
            );
        }
        _ => {
            tracing::debug!("PostgreSQL schema is up to date (v{})", SCHEMA_VERSION);
        }
    }

    Ok(())
}

/// Apply the initial schema
async fn apply_initial_schema(pool: &PgPool) -> Result<(), PostgresError> {
    let now = chrono::Utc::now().timestamp();

    sqlx::raw_sql(SCHEMA).execute(pool).await?;

    sqlx::query(
        "INSERT INTO schema_version (id, version, applied_at, description)
         VALUES (1, $1, $2, 'Initial schema')
         ON CONFLICT (id) DO UPDATE SET version = $1, applied_at = $2",
    )
    .bind(SCHEMA_VERSION)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::debug!("PostgreSQL schema v{} applied successfully", SCHEMA_VERSION);
    Ok(())
}

/// SQL for a versioned migration, `None` when the version is unknown
///
/// Version 1 is the initial schema; later versions are appended here.
fn migration_sql(version: i32) -> Option<(&'static str, &'static str)> {
    match version {
        1 => Some(("initial_schema", SCHEMA)),
        _ => None,
    }
}

/// Apply a specific versioned migration
async fn apply_versioned_migration(pool: &PgPool, version: i32) -> Result<(), PostgresError> {
    let start = std::time::Instant::now();
    let now = chrono::Utc::now().timestamp();

    let (name, sql) = migration_sql(version).ok_or_else(|| PostgresError::MigrationFailed {
        version,
        name: "unknown".to_string(),
        error: format!("No migration defined for version {}", version),
    })?;

    sqlx::raw_sql(sql)
        .execute(pool)
        .await
        .map_err(|e| PostgresError::MigrationFailed {
            version,
            name: name.to_string(),
            error: e.to_string(),
        })?;

    let elapsed = start.elapsed().as_millis() as i32;

    sqlx::query(
        "INSERT INTO schema_migrations (version, name, applied_at, checksum, execution_time_ms, success)
         VALUES ($1, $2, $3, $4, $5, TRUE)
         ON CONFLICT (version) DO NOTHING",
    )
    .bind(version)
    .bind(name)
    .bind(now)
    .bind(compute_checksum(sql))
    .bind(elapsed)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE schema_version SET version = $1, applied_at = $2 WHERE id = 1")
        .bind(version)
        .bind(now)
        .execute(pool)
        .await?;

    tracing::debug!(
        "PostgreSQL migration v{} ({}) applied in {}ms",
        version,
        name,
        elapsed
    );
    Ok(())
}

fn compute_checksum(sql: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    sql.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
