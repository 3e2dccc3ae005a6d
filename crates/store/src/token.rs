use alloy::primitives::Address;
use sqlx::SqlitePool;
use tracing::debug;

use crate::StoreError;
use crate::columns::{address_column, parse_address};

/// ERC-20 metadata, unique by address. Symbol and decimals stay `None` until
/// a contract read succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: i64,
    pub address: Address,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    address: String,
    symbol: Option<String>,
    decimals: Option<i64>,
}

impl TryFrom<TokenRow> for Token {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let decimals = row
            .decimals
            .map(|decimals| {
                u8::try_from(decimals).map_err(|_| StoreError::OutOfRange {
                    column: "decimals",
                    value: decimals.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            id: row.id,
            address: parse_address(&row.address)?,
            symbol: row.symbol,
            decimals,
        })
    }
}

impl Token {
    pub fn has_metadata(&self) -> bool {
        self.symbol.is_some() && self.decimals.is_some()
    }

    pub async fn find_by_address(
        db: &SqlitePool,
        address: Address,
    ) -> Result<Option<Self>, StoreError> {
        let address = address_column(address);

        sqlx::query_as::<_, TokenRow>(
            "SELECT id, address, symbol, decimals FROM tokens WHERE address = ?1",
        )
        .bind(address)
        .fetch_optional(db)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<Self>, StoreError> {
        sqlx::query_as::<_, TokenRow>(
            "SELECT id, address, symbol, decimals FROM tokens WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(Self::try_from)
        .transpose()
    }

    /// Inserts the token unless one with the same address already exists and
    /// returns the stored row together with whether this call created it.
    /// Racing callers converge on the single row guarded by the unique
    /// address constraint.
    pub async fn get_or_create(
        db: &SqlitePool,
        address: Address,
        symbol: Option<&str>,
        decimals: Option<u8>,
    ) -> Result<(Self, bool), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO tokens (address, symbol, decimals)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(address) DO NOTHING
            "#,
        )
        .bind(address_column(address))
        .bind(symbol)
        .bind(decimals.map(i64::from))
        .execute(db)
        .await?;

        let created = result.rows_affected() == 1;
        if !created {
            debug!("Token {address} already stored");
        }

        let token = Self::find_by_address(db, address)
            .await?
            .ok_or_else(|| StoreError::MissingRow(format!("token {address}")))?;

        Ok((token, created))
    }

    /// Fills in symbol/decimals that were previously unknown. Values that are
    /// already stored are never overwritten.
    pub async fn backfill_metadata(
        &self,
        db: &SqlitePool,
        symbol: Option<&str>,
        decimals: Option<u8>,
    ) -> Result<Self, StoreError> {
        sqlx::query(
            r#"
            UPDATE tokens
            SET symbol = COALESCE(symbol, ?1), decimals = COALESCE(decimals, ?2)
            WHERE id = ?3
            "#,
        )
        .bind(symbol)
        .bind(decimals.map(i64::from))
        .bind(self.id)
        .execute(db)
        .await?;

        Self::find_by_id(db, self.id)
            .await?
            .ok_or_else(|| StoreError::MissingRow(format!("token {}", self.address)))
    }

    pub async fn count(db: &SqlitePool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tokens")
            .fetch_one(db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;
    use alloy::primitives::address;

    #[tokio::test]
    async fn test_get_or_create_inserts_then_reuses() {
        let db = setup_test_db().await;
        let address = address!("0x1111111111111111111111111111111111111111");

        let (created, was_created) = Token::get_or_create(&db, address, Some("KID"), Some(18))
            .await
            .unwrap();
        assert!(was_created);
        assert_eq!(created.symbol.as_deref(), Some("KID"));
        assert_eq!(created.decimals, Some(18));

        let (existing, was_created) = Token::get_or_create(&db, address, Some("OTHER"), None)
            .await
            .unwrap();
        assert!(!was_created);
        assert_eq!(existing, created);
        assert_eq!(Token::count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_backfill_metadata_only_fills_unknown_fields() {
        let db = setup_test_db().await;
        let address = address!("0x2222222222222222222222222222222222222222");

        let (token, _) = Token::get_or_create(&db, address, None, Some(6))
            .await
            .unwrap();
        assert!(!token.has_metadata());

        let token = token
            .backfill_metadata(&db, Some("USDC"), Some(18))
            .await
            .unwrap();
        assert_eq!(token.symbol.as_deref(), Some("USDC"));
        assert_eq!(token.decimals, Some(6));
        assert!(token.has_metadata());
    }

    #[tokio::test]
    async fn test_find_by_address_missing() {
        let db = setup_test_db().await;
        let found = Token::find_by_address(&db, Address::ZERO).await.unwrap();
        assert!(found.is_none());
    }
}
