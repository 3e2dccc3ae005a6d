//! Domain-specific error types. Configuration errors are the only ones that
//! reach process exit; everything else is contained where it happens and
//! surfaced through logging.

use alloy::primitives::Address;
use alloy::transports::{RpcError, TransportErrorKind};
use evm_indexer_store::StoreError;
use std::path::PathBuf;

pub(crate) type TransportError = RpcError<TransportErrorKind>;

/// Startup errors caused by configuration. Fatal, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Event {event} not found in ABI of contract {contract}")]
    MissingEventDefinition { event: String, contract: Address },
    #[error("No reachable RPC endpoint among {tried} candidate(s)")]
    NoReachableEndpoint { tried: usize },
    #[error("No RPC endpoints configured")]
    NoEndpoints,
    #[error("No handler registered for event {event} of contract {contract}")]
    MissingHandler { event: String, contract: Address },
    #[error("Contract {0} configured more than once")]
    DuplicateContract(Address),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors turning a raw log into an [`crate::dispatch::EventRecord`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("No transaction hash found in log")]
    NoTxHash,
    #[error("No log index found in log")]
    NoLogIndex,
    #[error("No block number found in log")]
    NoBlockNumber,
    #[error("ABI decoding failed: {0}")]
    Abi(#[from] alloy::dyn_abi::Error),
    #[error("Expected {expected} indexed and {body} data values but decoded {got}")]
    Arity {
        expected: usize,
        body: usize,
        got: usize,
    },
    #[error("Event has no parameter named {0}")]
    MissingParam(String),
    #[error("Parameter {name} is not a {expected}")]
    UnexpectedType {
        name: String,
        expected: &'static str,
    },
}

/// Failures while resolving token or pool metadata.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("RPC transport error: {0}")]
    Rpc(#[from] TransportError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised inside event handlers. The dispatcher classifies every one
/// of them as a failed outcome instead of propagating it.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Metadata resolution error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors of the scan loop that are not contained per chunk.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to read chain head: {0}")]
    ChainHead(#[source] TransportError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
