use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Applies everything under `migrations/`, including the exclusion constraint
/// and partial unique index the store relies on.
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
