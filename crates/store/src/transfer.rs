use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::columns::{
    address_column, hash_column, parse_address, parse_hash, u64_column, u64_from_column,
};
use crate::{InsertOutcome, StoreError};

/// ERC-20 transfer ready to be written. `value_raw` is the uint256 value as a
/// decimal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub token_id: i64,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub from: Address,
    pub to: Address,
    pub value_raw: String,
    pub ts: Option<DateTime<Utc>>,
}

impl NewTransfer {
    /// Writes the transfer. A row with the same `(tx_hash, log_index)` is
    /// left untouched and reported as [`InsertOutcome::Duplicate`].
    pub async fn insert(&self, db: &SqlitePool) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfers (
                token_id, block_number, tx_hash, log_index, from_addr, to_addr, value_raw, ts
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(tx_hash, log_index) DO NOTHING
            "#,
        )
        .bind(self.token_id)
        .bind(u64_column("block_number", self.block_number)?)
        .bind(hash_column(self.tx_hash))
        .bind(u64_column("log_index", self.log_index)?)
        .bind(address_column(self.from))
        .bind(address_column(self.to))
        .bind(&self.value_raw)
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
pub struct Transfer {
    pub id: i64,
    pub token_id: i64,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub from: Address,
    pub to: Address,
    pub value_raw: String,
    pub ts: Option<DateTime<Utc>>,
}

/// A transfer joined with the metadata of the token it moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferWithToken {
    pub transfer: Transfer,
    pub token_address: Address,
    pub token_symbol: Option<String>,
    pub token_decimals: Option<u8>,
}

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: i64,
    token_id: i64,
    block_number: i64,
    tx_hash: String,
    log_index: i64,
    from_addr: String,
    to_addr: String,
    value_raw: String,
    ts: Option<DateTime<Utc>>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = StoreError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            token_id: row.token_id,
            block_number: u64_from_column("block_number", row.block_number)?,
            tx_hash: parse_hash(&row.tx_hash)?,
            log_index: u64_from_column("log_index", row.log_index)?,
            from: parse_address(&row.from_addr)?,
            to: parse_address(&row.to_addr)?,
            value_raw: row.value_raw,
            ts: row.ts,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransferWithTokenRow {
    #[sqlx(flatten)]
    transfer: TransferRow,
    token_address: String,
    token_symbol: Option<String>,
    token_decimals: Option<i64>,
}

impl TryFrom<TransferWithTokenRow> for TransferWithToken {
    type Error = StoreError;

    fn try_from(row: TransferWithTokenRow) -> Result<Self, Self::Error> {
        let token_decimals = row
            .token_decimals
            .map(|decimals| {
                u8::try_from(decimals).map_err(|_| StoreError::OutOfRange {
                    column: "decimals",
                    value: decimals.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            transfer: Transfer::try_from(row.transfer)?,
            token_address: parse_address(&row.token_address)?,
            token_symbol: row.token_symbol,
            token_decimals,
        })
    }
}

impl Transfer {
    pub async fn find_by_natural_key(
        db: &SqlitePool,
        tx_hash: B256,
        log_index: u64,
    ) -> Result<Option<Self>, StoreError> {
        sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, token_id, block_number, tx_hash, log_index, from_addr, to_addr, value_raw, ts
            FROM transfers
            WHERE tx_hash = ?1 AND log_index = ?2
            "#,
        )
        .bind(hash_column(tx_hash))
        .bind(u64_column("log_index", log_index)?)
        .fetch_optional(db)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    /// Transfers sent by `from`, oldest first, with their token metadata.
    pub async fn sent_by(
        db: &SqlitePool,
        from: Address,
    ) -> Result<Vec<TransferWithToken>, StoreError> {
        sqlx::query_as::<_, TransferWithTokenRow>(
            r#"
            SELECT
                t.id, t.token_id, t.block_number, t.tx_hash, t.log_index,
                t.from_addr, t.to_addr, t.value_raw, t.ts,
                k.address AS token_address,
                k.symbol AS token_symbol,
                k.decimals AS token_decimals
            FROM transfers t
            JOIN tokens k ON k.id = t.token_id
            WHERE t.from_addr = ?1
            ORDER BY t.block_number ASC, t.log_index ASC
            "#,
        )
        .bind(address_column(from))
        .fetch_all(db)
        .await?
        .into_iter()
        .map(TransferWithToken::try_from)
        .collect()
    }

    pub async fn count(db: &SqlitePool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transfers")
            .fetch_one(db)
            .await?;
        Ok(count)
    }
}
