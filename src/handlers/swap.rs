use alloy::dyn_abi::DynSolValue;
use alloy::primitives::I256;
use async_trait::async_trait;
use evm_indexer_store::NewSwap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::short_address;
use crate::dispatch::{EventHandler, EventRecord, HandlerOutcome};
use crate::error::HandlerError;
use crate::metadata::MetadataResolver;

/// Which side of the pool a swap sold into, read from the signs of the two
/// amount deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    ZeroForOne,
    OneForZero,
    Unknown,
}

impl SwapDirection {
    pub fn from_amounts(amount0: I256, amount1: I256) -> Self {
        if amount0.is_positive() && amount1.is_negative() {
            Self::ZeroForOne
        } else if amount1.is_positive() && amount0.is_negative() {
            Self::OneForZero
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroForOne => write!(f, "t0→t1"),
            Self::OneForZero => write!(f, "t1→t0"),
            Self::Unknown => write!(f, "?"),
        }
    }
}

/// Persists Uniswap-V3-style `Swap` events of the emitting pool.
pub struct SwapHandler {
    resolver: Arc<MetadataResolver>,
}

impl SwapHandler {
    pub fn new(resolver: Arc<MetadataResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl EventHandler for SwapHandler {
    async fn handle(&self, record: &EventRecord) -> Result<HandlerOutcome, HandlerError> {
        let amount0 = record.int("amount0")?;
        let amount1 = record.int("amount1")?;
        let resolved = self.resolver.resolve_pool(record.meta.contract).await?;

        let swap = NewSwap {
            pool_id: resolved.pool.id,
            block_number: record.meta.block_number,
            tx_hash: record.meta.tx_hash,
            log_index: record.meta.log_index,
            sender: record.address("sender").ok(),
            recipient: record.address("recipient").ok(),
            amount0_raw: amount0.to_string(),
            amount1_raw: amount1.to_string(),
            sqrt_price_x96: uint_or_zero(record.param("sqrtPriceX96")),
            liquidity: uint_or_zero(record.param("liquidity")),
            tick: record
                .param("tick")
                .and_then(DynSolValue::as_int)
                .and_then(|(tick, _)| i32::try_from(tick).ok()),
            ts: record.meta.block_timestamp,
        };

        let outcome: HandlerOutcome = swap.insert(self.resolver.db()).await?.into();

        if outcome == HandlerOutcome::Persisted {
            info!(
                "Swap at block {} | pool {} | {} | a0={amount0} a1={amount1}",
                record.meta.block_number,
                short_address(record.meta.contract),
                SwapDirection::from_amounts(amount0, amount1),
            );
        }

        Ok(outcome)
    }
}

fn uint_or_zero(value: Option<&DynSolValue>) -> String {
    value
        .and_then(DynSolValue::as_uint)
        .map_or_else(|| "0".to_string(), |(value, _)| value.to_string())
}
