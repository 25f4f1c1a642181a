use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::error::AppResult;

use super::schema::ensure_schema;

/// Opens the pool and makes sure the inspection tables exist.
pub async fn create_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    ensure_schema(&pool).await?;
    tracing::info!("Database connection established");
    Ok(pool)
}
