//! SQLite persistence for indexed tokens, pools, swaps and transfers.
//!
//! Every writer is idempotent: tokens and pools are unique by address, swaps
//! and transfers by their `(tx_hash, log_index)` natural key. Inserting a row
//! that already exists is reported as [`InsertOutcome::Duplicate`] rather than
//! as an error so re-scans of the same block range are harmless.

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

mod columns;
pub mod cursor;
pub mod error;
pub mod pool;
pub mod skipped;
pub mod swap;
pub mod token;
pub mod transfer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cursor::ScanCursorRecord;
pub use error::StoreError;
pub use pool::Pool;
pub use skipped::SkippedChunk;
pub use swap::{NewSwap, Swap};
pub use token::Token;
pub use transfer::{NewTransfer, Transfer, TransferWithToken};

pub static MIGRATOR: Migrator = sqlx::migrate!();

/// Result of an idempotent insert keyed by a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Opens (creating if needed) the database at `database_url` and applies all
/// pending migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    MIGRATOR.run(&pool).await?;

    Ok(pool)
}
