use async_trait::async_trait;
use evm_indexer_store::NewTransfer;
use std::sync::Arc;
use tracing::info;

use super::short_address;
use crate::dispatch::{EventHandler, EventRecord, HandlerOutcome};
use crate::error::HandlerError;
use crate::metadata::MetadataResolver;

/// Persists ERC-20 `Transfer` events of the emitting token.
pub struct TransferHandler {
    resolver: Arc<MetadataResolver>,
}

impl TransferHandler {
    pub fn new(resolver: Arc<MetadataResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl EventHandler for TransferHandler {
    async fn handle(&self, record: &EventRecord) -> Result<HandlerOutcome, HandlerError> {
        let from = record.address("from")?;
        let to = record.address("to")?;
        let value = record.uint("value")?;
        let token = self.resolver.resolve_token(record.meta.contract).await?;

        let transfer = NewTransfer {
            token_id: token.id,
            block_number: record.meta.block_number,
            tx_hash: record.meta.tx_hash,
            log_index: record.meta.log_index,
            from,
            to,
            value_raw: value.to_string(),
            ts: record.meta.block_timestamp,
        };

        let outcome: HandlerOutcome = transfer.insert(self.resolver.db()).await?.into();

        if outcome == HandlerOutcome::Persisted {
            info!(
                "Transfer at block {} | {} {}: {} → {} | value={value}",
                record.meta.block_number,
                short_address(record.meta.contract),
                token.symbol.as_deref().unwrap_or("?"),
                short_address(from),
                short_address(to),
            );
        }

        Ok(outcome)
    }
}
