//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! orderbox-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `ORDERBOX_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Migrations live in `crates/server/migrations/` and are embedded at build
//! time.

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run all pending migrations against the orderbox database.
///
/// # Errors
///
/// Returns `MigrationError` if the URL is missing, the connection fails, or a
/// migration fails to apply.
pub async fn run() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("ORDERBOX_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("ORDERBOX_DATABASE_URL"))?;

    tracing::info!("Connecting to orderbox database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running orderbox migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Orderbox migrations complete!");
    Ok(())
}
