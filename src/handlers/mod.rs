//! Built-in event handlers. Each one makes sure the entities an event refers
//! to exist (through the metadata resolver) before writing its own row.

use alloy::primitives::Address;
use evm_indexer_store::InsertOutcome;
use std::sync::Arc;

use crate::contracts::{HandlerKind, TrackedContract};
use crate::dispatch::{Dispatcher, EventHandler, HandlerOutcome};
use crate::error::ConfigError;
use crate::metadata::MetadataResolver;

mod mint;
mod swap;
mod transfer;

pub use mint::MintHandler;
pub use swap::{SwapDirection, SwapHandler};
pub use transfer::TransferHandler;

/// Registers the configured handler of every tracked event and checks that
/// none is left without one.
pub fn register_handlers(
    dispatcher: &mut Dispatcher,
    contracts: &[TrackedContract],
    resolver: &Arc<MetadataResolver>,
) -> Result<(), ConfigError> {
    let swap: Arc<dyn EventHandler> = Arc::new(SwapHandler::new(resolver.clone()));
    let transfer: Arc<dyn EventHandler> = Arc::new(TransferHandler::new(resolver.clone()));
    let mint: Arc<dyn EventHandler> = Arc::new(MintHandler::new(resolver.clone()));

    for contract in contracts {
        for (event, kind) in &contract.events {
            let handler = match kind {
                HandlerKind::Swap => &swap,
                HandlerKind::Transfer => &transfer,
                HandlerKind::Mint => &mint,
            };
            dispatcher.register(contract.address, event, handler.clone())?;
        }
    }

    dispatcher.ensure_complete()
}

impl From<InsertOutcome> for HandlerOutcome {
    fn from(outcome: InsertOutcome) -> Self {
        match outcome {
            InsertOutcome::Inserted => Self::Persisted,
            InsertOutcome::Duplicate => Self::Duplicate,
        }
    }
}

/// `0x1234ab…cdef01`, for log lines.
pub fn short_address(address: Address) -> String {
    let hex = format!("{address:x}");
    let digits = hex.trim_start_matches("0x");
    format!("0x{}…{}", &digits[..6], &digits[digits.len() - 6..])
}
