use alloy::primitives::Address;
use sqlx::SqlitePool;
use tracing::debug;

use crate::columns::{address_column, parse_address};
use crate::{StoreError, Token};

/// AMM pool, unique by address. Both tokens must already be stored; the fee
/// tier is optional because not every pool contract exposes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub id: i64,
    pub address: Address,
    pub token0_id: i64,
    pub token1_id: i64,
    pub fee: Option<u32>,
}

#[derive(sqlx::FromRow)]
struct PoolRow {
    id: i64,
    address: String,
    token0_id: i64,
    token1_id: i64,
    fee: Option<i64>,
}

impl TryFrom<PoolRow> for Pool {
    type Error = StoreError;

    fn try_from(row: PoolRow) -> Result<Self, Self::Error> {
        let fee = row
            .fee
            .map(|fee| {
                u32::try_from(fee).map_err(|_| StoreError::OutOfRange {
                    column: "fee",
                    value: fee.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            id: row.id,
            address: parse_address(&row.address)?,
            token0_id: row.token0_id,
            token1_id: row.token1_id,
            fee,
        })
    }
}

impl Pool {
    pub async fn find_by_address(
        db: &SqlitePool,
        address: Address,
    ) -> Result<Option<Self>, StoreError> {
        sqlx::query_as::<_, PoolRow>(
            "SELECT id, address, token0_id, token1_id, fee FROM pools WHERE address = ?1",
        )
        .bind(address_column(address))
        .fetch_optional(db)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    /// Inserts the pool unless one with the same address already exists and
    /// returns the stored row together with whether this call created it.
    pub async fn get_or_create(
        db: &SqlitePool,
        address: Address,
        token0: &Token,
        token1: &Token,
        fee: Option<u32>,
    ) -> Result<(Self, bool), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pools (address, token0_id, token1_id, fee)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(address) DO NOTHING
            "#,
        )
        .bind(address_column(address))
        .bind(token0.id)
        .bind(token1.id)
        .bind(fee.map(i64::from))
        .execute(db)
        .await?;

        let created = result.rows_affected() == 1;
        if !created {
            debug!("Pool {address} already stored");
        }

        let pool = Self::find_by_address(db, address)
            .await?
            .ok_or_else(|| StoreError::MissingRow(format!("pool {address}")))?;

        Ok((pool, created))
    }

    /// Loads both tokens referenced by this pool.
    pub async fn tokens(&self, db: &SqlitePool) -> Result<(Token, Token), StoreError> {
        let token0 = Token::find_by_id(db, self.token0_id)
            .await?
            .ok_or_else(|| StoreError::MissingRow(format!("token0 of pool {}", self.address)))?;
        let token1 = Token::find_by_id(db, self.token1_id)
            .await?
            .ok_or_else(|| StoreError::MissingRow(format!("token1 of pool {}", self.address)))?;
        Ok((token0, token1))
    }

    pub async fn count(db: &SqlitePool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pools")
            .fetch_one(db)
            .await?;
        Ok(count)
    }
}
