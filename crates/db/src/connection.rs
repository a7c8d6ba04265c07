use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use fieldline_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Builds the pool from the application's database settings. Every
/// connection gets foreign keys, WAL journaling, and the configured busy
/// timeout before it is handed out.
pub async fn connect(settings: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = settings.busy_timeout_ms;
    SqlitePoolOptions::new()
        .max_connections(settings.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(settings.timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&settings.url)
        .await
}
