/// Database layer for Stockroom
///
/// Manages the SQLite connection pool and embedded migrations.
use crate::error::StockroomResult;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> StockroomResult<SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Single-connection in-memory database, migrated and ready to use
///
/// Every pooled connection to `:memory:` would see its own empty database,
/// so the pool is capped at one connection.
pub async fn create_memory_pool() -> StockroomResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .in_memory(true)
                .foreign_keys(true),
        )
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run migrations
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> StockroomResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> StockroomResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_pool_migrates() {
        let dir = tempdir().unwrap();
        let pool = create_pool(&dir.path().join("nested/db.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();

        run_migrations(&pool).await.unwrap();
        test_connection(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_assets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_memory_pool_enforces_state_check() {
        let pool = create_memory_pool().await.unwrap();

        sqlx::query(
            "INSERT INTO businesses (id, workspace_id, name, created_at, updated_at)
             VALUES ('biz_1', 'ws_1', 'Shop', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .unwrap();

        // Neither pending nor ready
        let result = sqlx::query(
            "INSERT INTO uploaded_assets
             (id, workspace_id, business_id, file_name, content_type, size_bytes, category,
              object_key, public_url, cdn_url, created_at)
             VALUES ('ast_1', 'ws_1', 'biz_1', 'a.png', 'image/png', 1, 'image',
                     'k', 'u', 'u', '2026-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
