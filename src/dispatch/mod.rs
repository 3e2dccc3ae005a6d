//! Routes decoded logs to the handler registered for `(contract, event)`.
//!
//! Nothing a handler does can escape [`Dispatcher::dispatch`]: errors and
//! panics are both turned into [`HandlerOutcome::Failed`] and logged with the
//! position of the offending log.

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use async_trait::async_trait;
use futures_util::FutureExt;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{ConfigError, HandlerError};
use crate::signature::SignatureIndex;

mod record;

pub use record::{EventParam, EventRecord, LogMeta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Persisted,
    /// The natural key was already stored. Not an error.
    Duplicate,
    Failed(String),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, record: &EventRecord) -> Result<HandlerOutcome, HandlerError>;
}

/// Per-outcome counters for one batch of logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub persisted: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Logs whose topic0 is not tracked for their contract.
    pub skipped: usize,
    pub decode_failures: usize,
}

impl DispatchReport {
    pub fn absorb(&mut self, other: Self) {
        self.persisted += other.persisted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.decode_failures += other.decode_failures;
    }

    pub const fn total(&self) -> usize {
        self.persisted + self.duplicates + self.failed + self.skipped + self.decode_failures
    }
}

pub struct Dispatcher {
    index: Arc<SignatureIndex>,
    handlers: HashMap<(Address, String), Arc<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn new(index: Arc<SignatureIndex>) -> Self {
        Self {
            index,
            handlers: HashMap::new(),
        }
    }

    pub fn signature_index(&self) -> &Arc<SignatureIndex> {
        &self.index
    }

    /// Registers `handler` for an event that the signature index tracks.
    pub fn register(
        &mut self,
        contract: Address,
        event: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), ConfigError> {
        if self.index.topic_for(contract, event).is_none() {
            return Err(ConfigError::MissingEventDefinition {
                event: event.to_string(),
                contract,
            });
        }

        self.handlers.insert((contract, event.to_string()), handler);
        Ok(())
    }

    /// Fails if some tracked event has no handler.
    pub fn ensure_complete(&self) -> Result<(), ConfigError> {
        for contract in self.index.contracts() {
            for topic in self.index.topics_for(contract) {
                let Some(tracked) = self.index.lookup(contract, *topic) else {
                    continue;
                };
                if !self.handlers.contains_key(&(contract, tracked.name.clone())) {
                    return Err(ConfigError::MissingHandler {
                        event: tracked.name.clone(),
                        contract,
                    });
                }
            }
        }
        Ok(())
    }

    /// Decodes and handles `logs` one at a time in `(block_number, log_index)`
    /// order. A natural key seen twice in the batch is handled once.
    pub async fn dispatch(&self, logs: Vec<Log>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut seen: HashSet<(B256, u64)> = HashSet::new();

        let ordered = logs
            .into_iter()
            .sorted_by_key(|log| (log.block_number, log.log_index));

        for log in ordered {
            let contract = log.address();
            let Some(tracked) = log
                .topic0()
                .and_then(|topic0| self.index.lookup(contract, *topic0))
            else {
                debug!(
                    "Ignoring untracked log from {contract} at block {:?}",
                    log.block_number
                );
                report.skipped += 1;
                continue;
            };

            let record = match EventRecord::decode(&log, &tracked.definition) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        "Failed to decode {} log from {contract} (block {:?}, tx {:?}, log index {:?}): {e}",
                        tracked.name, log.block_number, log.transaction_hash, log.log_index
                    );
                    report.decode_failures += 1;
                    continue;
                }
            };

            if !seen.insert(record.natural_key()) {
                report.duplicates += 1;
                continue;
            }

            match self.run_handler(&record).await {
                HandlerOutcome::Persisted => report.persisted += 1,
                HandlerOutcome::Duplicate => {
                    debug!(
                        "{} at tx {} log index {} already stored",
                        record.name, record.meta.tx_hash, record.meta.log_index
                    );
                    report.duplicates += 1;
                }
                HandlerOutcome::Failed(reason) => {
                    error!(
                        "Handler for {} failed at block {}, tx {}, log index {}, contract {}: {reason}",
                        record.name,
                        record.meta.block_number,
                        record.meta.tx_hash,
                        record.meta.log_index,
                        record.meta.contract
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn run_handler(&self, record: &EventRecord) -> HandlerOutcome {
        let Some(handler) = self
            .handlers
            .get(&(record.meta.contract, record.name.clone()))
        else {
            return HandlerOutcome::Failed(format!("no handler registered for {}", record.name));
        };

        match AssertUnwindSafe(handler.handle(record)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => HandlerOutcome::Failed(e.to_string()),
            Err(panic) => {
                HandlerOutcome::Failed(format!("handler panicked: {}", panic_message(&*panic)))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
