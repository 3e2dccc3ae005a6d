use sqlx::SqlitePool;

use crate::StoreError;
use crate::columns::{u64_column, u64_from_column};

/// Persisted position of a named scan cursor: the next block that has not
/// been scanned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCursorRecord;

impl ScanCursorRecord {
    pub async fn load(db: &SqlitePool, name: &str) -> Result<Option<u64>, StoreError> {
        let next_block =
            sqlx::query_scalar::<_, i64>("SELECT next_block FROM scan_cursors WHERE name = ?1")
                .bind(name)
                .fetch_optional(db)
                .await?;

        next_block
            .map(|value| u64_from_column("next_block", value))
            .transpose()
    }

    /// Stores `next_block` for `name`. The stored value never moves
    /// backwards.
    pub async fn save(db: &SqlitePool, name: &str, next_block: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scan_cursors (name, next_block)
            VALUES (?1, ?2)
            ON CONFLICT(name) DO UPDATE SET
                next_block = MAX(scan_cursors.next_block, excluded.next_block),
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(name)
        .bind(u64_column("next_block", next_block)?)
        .execute(db)
        .await?;

        Ok(())
    }
}
