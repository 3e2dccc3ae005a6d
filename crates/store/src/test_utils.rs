use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::MIGRATOR;

/// Creates an in-memory SQLite database with all migrations applied.
///
/// The pool is capped at one connection because every `:memory:` connection
/// opens its own private database.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    MIGRATOR.run(&pool).await.unwrap();
    pool
}
