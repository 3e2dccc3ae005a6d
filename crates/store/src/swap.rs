use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::columns::{
    address_column, hash_column, parse_address, parse_hash, u64_column, u64_from_column,
};
use crate::{InsertOutcome, StoreError};

/// Swap ready to be written. Amounts are decimal strings because signed
/// 256-bit and 160/128-bit quantities do not fit SQLite integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSwap {
    pub pool_id: i64,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
    pub amount0_raw: String,
    pub amount1_raw: String,
    pub sqrt_price_x96: String,
    pub liquidity: String,
    pub tick: Option<i32>,
    pub ts: Option<DateTime<Utc>>,
}

impl NewSwap {
    /// Writes the swap. A row with the same `(tx_hash, log_index)` is left
    /// untouched and reported as [`InsertOutcome::Duplicate`].
    pub async fn insert(&self, db: &SqlitePool) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO swaps (
                pool_id, block_number, tx_hash, log_index, sender, recipient,
                amount0_raw, amount1_raw, sqrt_price_x96, liquidity, tick, ts
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(tx_hash, log_index) DO NOTHING
            "#,
        )
        .bind(self.pool_id)
        .bind(u64_column("block_number", self.block_number)?)
        .bind(hash_column(self.tx_hash))
        .bind(u64_column("log_index", self.log_index)?)
        .bind(self.sender.map(address_column))
        .bind(self.recipient.map(address_column))
        .bind(&self.amount0_raw)
        .bind(&self.amount1_raw)
        .bind(&self.sqrt_price_x96)
        .bind(&self.liquidity)
        .bind(self.tick)
        .bind(self.ts)
        .execute(db)
        .await?;

        Ok(if result.rows_affected() == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Duplicate
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swap {
    pub id: i64,
    pub pool_id: i64,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
    pub amount0_raw: String,
    pub amount1_raw: String,
    pub sqrt_price_x96: String,
    pub liquidity: String,
    pub tick: Option<i32>,
    pub ts: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct SwapRow {
    id: i64,
    pool_id: i64,
    block_number: i64,
    tx_hash: String,
    log_index: i64,
    sender: Option<String>,
    recipient: Option<String>,
    amount0_raw: String,
    amount1_raw: String,
    sqrt_price_x96: String,
    liquidity: String,
    tick: Option<i32>,
    ts: Option<DateTime<Utc>>,
}

impl TryFrom<SwapRow> for Swap {
    type Error = StoreError;

    fn try_from(row: SwapRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            pool_id: row.pool_id,
            block_number: u64_from_column("block_number", row.block_number)?,
            tx_hash: parse_hash(&row.tx_hash)?,
            log_index: u64_from_column("log_index", row.log_index)?,
            sender: row.sender.as_deref().map(parse_address).transpose()?,
            recipient: row.recipient.as_deref().map(parse_address).transpose()?,
            amount0_raw: row.amount0_raw,
            amount1_raw: row.amount1_raw,
            sqrt_price_x96: row.sqrt_price_x96,
            liquidity: row.liquidity,
            tick: row.tick,
            ts: row.ts,
        })
    }
}

const SWAP_COLUMNS: &str = "id, pool_id, block_number, tx_hash, log_index, sender, recipient, \
     amount0_raw, amount1_raw, sqrt_price_x96, liquidity, tick, ts";

impl Swap {
    pub async fn find_by_natural_key(
        db: &SqlitePool,
        tx_hash: B256,
        log_index: u64,
    ) -> Result<Option<Self>, StoreError> {
        sqlx::query_as::<_, SwapRow>(&format!(
            "SELECT {SWAP_COLUMNS} FROM swaps WHERE tx_hash = ?1 AND log_index = ?2"
        ))
        .bind(hash_column(tx_hash))
        .bind(u64_column("log_index", log_index)?)
        .fetch_optional(db)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    /// Most recent swaps of a pool, newest first.
    pub async fn latest_for_pool(
        db: &SqlitePool,
        pool_id: i64,
        limit: u32,
    ) -> Result<Vec<Self>, StoreError> {
        sqlx::query_as::<_, SwapRow>(&format!(
            "SELECT {SWAP_COLUMNS} FROM swaps WHERE pool_id = ?1 \
             ORDER BY block_number DESC, log_index DESC LIMIT ?2"
        ))
        .bind(pool_id)
        .bind(i64::from(limit))
        .fetch_all(db)
        .await?
        .into_iter()
        .map(Self::try_from)
        .collect()
    }

    pub async fn count(db: &SqlitePool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM swaps")
            .fetch_one(db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;
    use crate::{Pool, Token};
    use alloy::primitives::{address, b256};

    async fn seeded_pool(db: &SqlitePool) -> Pool {
        let (token0, _) = Token::get_or_create(
            db,
            address!("0x1111111111111111111111111111111111111111"),
            None,
            None,
        )
        .await
        .unwrap();
        let (token1, _) = Token::get_or_create(
            db,
            address!("0x2222222222222222222222222222222222222222"),
            None,
            None,
        )
        .await
        .unwrap();
        Pool::get_or_create(
            db,
            address!("0x3333333333333333333333333333333333333333"),
            &token0,
            &token1,
            None,
        )
        .await
        .unwrap()
        .0
    }

    fn new_swap(pool_id: i64, block_number: u64, log_index: u64) -> NewSwap {
        NewSwap {
            pool_id,
            block_number,
            tx_hash: b256!("0xbeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee"),
            log_index,
            sender: Some(address!("0x4444444444444444444444444444444444444444")),
            recipient: None,
            amount0_raw: "-1000000000000000000000".to_string(),
            amount1_raw: "123456789".to_string(),
            sqrt_price_x96: "79228162514264337593543950336".to_string(),
            liquidity: "340282366920938463463374607431768211455".to_string(),
            tick: Some(-887_272),
            ts: DateTime::from_timestamp(1_700_000_000, 0),
        }
    }

    #[tokio::test]
    async fn test_insert_swap_then_duplicate() {
        let db = setup_test_db().await;
        let pool = seeded_pool(&db).await;
        let swap = new_swap(pool.id, 100, 2);

        assert_eq!(swap.insert(&db).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(swap.insert(&db).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(Swap::count(&db).await.unwrap(), 1);

        let stored = Swap::find_by_natural_key(&db, swap.tx_hash, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.amount0_raw, "-1000000000000000000000");
        assert_eq!(stored.liquidity, swap.liquidity);
        assert_eq!(stored.tick, Some(-887_272));
        assert_eq!(stored.ts, swap.ts);
        assert_eq!(stored.sender, swap.sender);
        assert_eq!(stored.recipient, None);
    }

    #[tokio::test]
    async fn test_latest_for_pool_orders_newest_first() {
        let db = setup_test_db().await;
        let pool = seeded_pool(&db).await;

        for (block_number, log_index) in [(100, 1), (101, 0), (100, 3)] {
            new_swap(pool.id, block_number, log_index)
                .insert(&db)
                .await
                .unwrap();
        }

        let swaps = Swap::latest_for_pool(&db, pool.id, 2).await.unwrap();
        let keys: Vec<_> = swaps.iter().map(|s| (s.block_number, s.log_index)).collect();
        assert_eq!(keys, vec![(101, 0), (100, 3)]);
    }
}
