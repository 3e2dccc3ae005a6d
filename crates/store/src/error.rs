/// Database persistence and data corruption errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Invalid address in database: {0}")]
    InvalidAddress(String),
    #[error("Invalid transaction hash in database: {0}")]
    InvalidTxHash(String),
    #[error("Value {value} out of range for column {column}")]
    OutOfRange { column: &'static str, value: String },
    #[error("Row for {0} missing after insert")]
    MissingRow(String),
}
