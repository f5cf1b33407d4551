//! Connection pool setup and migrations

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;

use flowdesk_core::{AppError, EngineConfig};

/// Connect a pool sized from the engine configuration.
pub async fn connect_pool(config: &EngineConfig) -> Result<PgPool, AppError> {
    let url = config.database_url()?;
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );
    Ok(pool)
}

/// Apply pending migrations from the workspace `migrations/` directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to load migrations: {}", e)))?;
    migrator
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to run database migrations: {}", e)))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Connect and migrate in one step.
pub async fn setup_database(config: &EngineConfig) -> Result<PgPool, AppError> {
    let pool = connect_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
