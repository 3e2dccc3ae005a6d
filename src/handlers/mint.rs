use async_trait::async_trait;
use evm_indexer_store::Pool;
use std::sync::Arc;
use tracing::info;

use super::short_address;
use crate::dispatch::{EventHandler, EventRecord, HandlerOutcome};
use crate::error::HandlerError;
use crate::metadata::MetadataResolver;

/// Liquidity mints are not stored; seeing one only makes sure the pool and
/// its tokens are known. A mint from an already stored pool reports
/// [`HandlerOutcome::Duplicate`].
pub struct MintHandler {
    resolver: Arc<MetadataResolver>,
}

impl MintHandler {
    pub fn new(resolver: Arc<MetadataResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl EventHandler for MintHandler {
    async fn handle(&self, record: &EventRecord) -> Result<HandlerOutcome, HandlerError> {
        let known = Pool::find_by_address(self.resolver.db(), record.meta.contract)
            .await?
            .is_some();
        let resolved = self.resolver.resolve_pool(record.meta.contract).await?;

        info!(
            "Mint at block {} | pool {} (id {})",
            record.meta.block_number,
            short_address(record.meta.contract),
            resolved.pool.id
        );

        Ok(if known {
            HandlerOutcome::Duplicate
        } else {
            HandlerOutcome::Persisted
        })
    }
}
