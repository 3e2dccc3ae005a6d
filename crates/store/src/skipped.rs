use alloy::primitives::Address;
use sqlx::SqlitePool;

use crate::StoreError;
use crate::columns::{address_column, parse_address, u64_column, u64_from_column};

/// A `(contract, block range)` whose logs could not be fetched within the
/// retry budget. Kept until a replay of the same range succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChunk {
    pub id: i64,
    pub contract: Address,
    pub from_block: u64,
    pub to_block: u64,
    pub reason: String,
}

#[derive(sqlx::FromRow)]
struct SkippedChunkRow {
    id: i64,
    contract: String,
    from_block: i64,
    to_block: i64,
    reason: String,
}

impl TryFrom<SkippedChunkRow> for SkippedChunk {
    type Error = StoreError;

    fn try_from(row: SkippedChunkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            contract: parse_address(&row.contract)?,
            from_block: u64_from_column("from_block", row.from_block)?,
            to_block: u64_from_column("to_block", row.to_block)?,
            reason: row.reason,
        })
    }
}

impl SkippedChunk {
    pub async fn record(
        db: &SqlitePool,
        contract: Address,
        from_block: u64,
        to_block: u64,
        reason: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO skipped_chunks (contract, from_block, to_block, reason)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(contract, from_block, to_block) DO UPDATE SET reason = excluded.reason
            "#,
        )
        .bind(address_column(contract))
        .bind(u64_column("from_block", from_block)?)
        .bind(u64_column("to_block", to_block)?)
        .bind(reason)
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn all(db: &SqlitePool) -> Result<Vec<Self>, StoreError> {
        sqlx::query_as::<_, SkippedChunkRow>(
            r#"
            SELECT id, contract, from_block, to_block, reason
            FROM skipped_chunks
            ORDER BY from_block ASC, contract ASC
            "#,
        )
        .fetch_all(db)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn resolve(&self, db: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM skipped_chunks WHERE id = ?1")
            .bind(self.id)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;
    use alloy::primitives::address;

    #[tokio::test]
    async fn test_record_list_and_resolve() {
        let db = setup_test_db().await;
        let contract = address!("0x1111111111111111111111111111111111111111");

        SkippedChunk::record(&db, contract, 2_000, 3_999, "timeout")
            .await
            .unwrap();
        SkippedChunk::record(&db, contract, 0, 1_999, "rate limited")
            .await
            .unwrap();
        SkippedChunk::record(&db, contract, 0, 1_999, "rate limited again")
            .await
            .unwrap();

        let skipped = SkippedChunk::all(&db).await.unwrap();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].from_block, 0);
        assert_eq!(skipped[0].reason, "rate limited again");
        assert_eq!(skipped[1].to_block, 3_999);

        skipped[0].resolve(&db).await.unwrap();
        let remaining = SkippedChunk::all(&db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].from_block, 2_000);
    }
}
