//! Chunked `eth_getLogs` scanning over a monotonic cursor. Each chunk is
//! retried with exponential backoff, failing over between endpoints on every
//! failed attempt. A chunk that exhausts its retries is recorded as skipped
//! and the cursor moves past it anyway.

mod cursor;
mod timestamps;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{Filter, Log};
use backon::{ExponentialBuilder, Retryable};
use evm_indexer_store::{ScanCursorRecord, SkippedChunk};
use rand::Rng;
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub use cursor::{ScanCursor, chunk_ranges};
pub use timestamps::BlockTimestamps;

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{ScanError, TransportError};
use crate::rpc::RpcManager;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub chunk_size: u64,
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub poll_interval: Duration,
    pub chunk_jitter: Duration,
    pub cursor_name: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            chunk_jitter: Duration::ZERO,
            cursor_name: "main".to_string(),
        }
    }
}

impl ScanConfig {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_max_times(self.max_retries)
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
    }
}

/// Where scanning begins when the loop starts.
#[derive(Debug, Clone, Copy)]
pub struct StartPolicy {
    pub start_block: Option<u64>,
    pub blocks_back: u64,
    pub resume: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Advancing,
    Exhausted,
}

/// Totals for one `scan_to` invocation.
#[derive(Debug, Default, Clone)]
pub struct PassReport {
    pub chunks: usize,
    pub skipped: usize,
    pub dispatch: DispatchReport,
    pub cancelled: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub still_failing: usize,
}

pub struct LogScanner {
    rpc: Arc<RpcManager>,
    dispatcher: Arc<Dispatcher>,
    db: SqlitePool,
    timestamps: BlockTimestamps,
    cursor: ScanCursor,
    state: ScanState,
    config: ScanConfig,
}

impl LogScanner {
    pub fn new(
        rpc: Arc<RpcManager>,
        dispatcher: Arc<Dispatcher>,
        db: SqlitePool,
        cursor: ScanCursor,
        config: ScanConfig,
    ) -> Self {
        Self {
            rpc,
            dispatcher,
            db,
            timestamps: BlockTimestamps::default(),
            cursor,
            state: ScanState::Idle,
            config,
        }
    }

    /// Builds a scanner whose cursor starts at the persisted position when
    /// resuming, else at the configured start block, else `blocks_back`
    /// blocks below the current head.
    pub async fn start(
        rpc: Arc<RpcManager>,
        dispatcher: Arc<Dispatcher>,
        db: SqlitePool,
        config: ScanConfig,
        policy: StartPolicy,
    ) -> Result<Self, ScanError> {
        let head = chain_head(&rpc, &config).await?;

        let persisted = if policy.resume {
            ScanCursorRecord::load(&db, &config.cursor_name).await?
        } else {
            None
        };

        let from_block = match persisted {
            Some(next_block) => {
                info!(
                    "Resuming cursor '{}' at block {next_block}",
                    config.cursor_name
                );
                next_block
            }
            None => policy
                .start_block
                .unwrap_or_else(|| head.saturating_sub(policy.blocks_back)),
        };

        info!("Scanning from block {from_block} (head {head})");

        Ok(Self::new(
            rpc,
            dispatcher,
            db,
            ScanCursor::new(from_block, head),
            config,
        ))
    }

    pub const fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// Polls the chain head and scans up to it until `shutdown` flips to
    /// true or its sender goes away. Pass failures are logged, not returned.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once(&mut shutdown).await {
                Ok(report) if report.cancelled => break,
                Ok(report) => {
                    if report.chunks > 0 {
                        info!(
                            "Caught up to block {}: {} chunk(s), {} skipped, {} persisted, {} duplicate(s), {} failed",
                            self.cursor.to_block(),
                            report.chunks,
                            report.skipped,
                            report.dispatch.persisted,
                            report.dispatch.duplicates,
                            report.dispatch.failed,
                        );
                    }
                }
                Err(error) => error!("Scan pass failed: {error}"),
            }

            self.state = ScanState::Idle;
            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            "Scanner stopped; next block {}",
            self.cursor.from_block()
        );
    }

    async fn poll_once(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PassReport, ScanError> {
        let head = chain_head(&self.rpc, &self.config).await?;
        self.scan_to(head, self.config.chunk_size, shutdown).await
    }

    /// Scans from the cursor up to `upper` in windows of `chunk_size`
    /// blocks, persisting the cursor after every chunk. Cancellation is
    /// honored between chunks.
    pub async fn scan_to(
        &mut self,
        upper: u64,
        chunk_size: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<PassReport, ScanError> {
        self.cursor.extend_to(upper);
        let mut report = PassReport::default();

        while let Some((start, end)) = self.cursor.next_chunk(chunk_size) {
            if *shutdown.borrow() {
                report.cancelled = true;
                return Ok(report);
            }

            self.state = ScanState::Scanning;
            let (dispatch, skipped) = self.scan_chunk(start, end).await;

            self.state = ScanState::Advancing;
            self.cursor.advance_past(end);
            ScanCursorRecord::save(&self.db, &self.config.cursor_name, self.cursor.from_block())
                .await?;

            report.chunks += 1;
            report.skipped += skipped;
            report.dispatch.absorb(dispatch);

            if end == u64::MAX {
                break;
            }

            if self.pause_between_chunks(shutdown).await {
                report.cancelled = true;
                return Ok(report);
            }
        }

        self.state = ScanState::Exhausted;
        Ok(report)
    }

    /// Re-scans every recorded skipped chunk, clearing the record of each
    /// range that now succeeds. The cursor is not touched.
    pub async fn replay_skipped(&self) -> Result<ReplayReport, ScanError> {
        let mut report = ReplayReport::default();

        for chunk in SkippedChunk::all(&self.db).await? {
            match self
                .scan_contract(chunk.contract, chunk.from_block, chunk.to_block)
                .await
            {
                Ok(dispatch) => {
                    chunk.resolve(&self.db).await?;
                    report.replayed += 1;
                    info!(
                        "Replayed skipped chunk {}-{} of {}: {} persisted, {} duplicate(s)",
                        chunk.from_block,
                        chunk.to_block,
                        chunk.contract,
                        dispatch.persisted,
                        dispatch.duplicates,
                    );
                }
                Err(error) => {
                    warn!(
                        "Skipped chunk {}-{} of {} still failing: {error}",
                        chunk.from_block, chunk.to_block, chunk.contract
                    );
                    SkippedChunk::record(
                        &self.db,
                        chunk.contract,
                        chunk.from_block,
                        chunk.to_block,
                        &error.to_string(),
                    )
                    .await?;
                    report.still_failing += 1;
                }
            }
        }

        Ok(report)
    }

    /// Scans one window for every tracked contract. Returns the combined
    /// dispatch totals and how many contracts had to be skipped.
    async fn scan_chunk(&self, start: u64, end: u64) -> (DispatchReport, usize) {
        let mut dispatch = DispatchReport::default();
        let mut skipped = 0;
        let contracts: Vec<Address> = self.dispatcher.signature_index().contracts().collect();

        for contract in contracts {
            match self.scan_contract(contract, start, end).await {
                Ok(report) => dispatch.absorb(report),
                Err(error) => {
                    error!(
                        "Chunk {start}-{end} of {contract} skipped after {} retries: {error}",
                        self.config.max_retries
                    );
                    if let Err(store_error) =
                        SkippedChunk::record(&self.db, contract, start, end, &error.to_string())
                            .await
                    {
                        error!("Failed to record skipped chunk {start}-{end}: {store_error}");
                    }
                    skipped += 1;
                }
            }
        }

        (dispatch, skipped)
    }

    async fn scan_contract(
        &self,
        contract: Address,
        start: u64,
        end: u64,
    ) -> Result<DispatchReport, TransportError> {
        let topics = self.dispatcher.signature_index().topics_for(contract).to_vec();
        if topics.is_empty() {
            return Ok(DispatchReport::default());
        }

        let filter = Filter::new()
            .address(contract)
            .from_block(start)
            .to_block(end)
            .event_signature(topics);

        let mut logs = with_failover(&self.rpc, &self.config, "eth_getLogs", |provider| {
            let filter = filter.clone();
            async move { provider.get_logs(&filter).await }
        })
        .await?;

        debug!("Found {} log(s) for {contract} in {start}-{end}", logs.len());

        self.fill_timestamps(&mut logs).await?;
        Ok(self.dispatcher.dispatch(logs).await)
    }

    async fn fill_timestamps(&self, logs: &mut [Log]) -> Result<(), TransportError> {
        for log in logs.iter_mut().filter(|log| log.block_timestamp.is_none()) {
            if let Some(block_number) = log.block_number {
                log.block_timestamp = self.block_timestamp(block_number).await?;
            }
        }

        Ok(())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>, TransportError> {
        if let Some(timestamp) = self.timestamps.get(block_number) {
            return Ok(Some(timestamp));
        }

        let block = with_failover(
            &self.rpc,
            &self.config,
            "eth_getBlockByNumber",
            |provider| async move {
                provider
                    .get_block_by_number(BlockNumberOrTag::Number(block_number))
                    .await
            },
        )
        .await?;

        let Some(block) = block else {
            warn!("Block {block_number} not found; leaving its timestamp empty");
            return Ok(None);
        };

        let timestamp = block.header.timestamp;
        self.timestamps.insert(block_number, timestamp);
        Ok(Some(timestamp))
    }

    /// Randomized pause of up to `chunk_jitter`. Returns true when shutdown
    /// was requested meanwhile.
    async fn pause_between_chunks(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let max_ms = u64::try_from(self.config.chunk_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return false;
        }

        let pause = Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms));

        tokio::select! {
            () = tokio::time::sleep(pause) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }
}

pub(crate) async fn chain_head(rpc: &RpcManager, config: &ScanConfig) -> Result<u64, ScanError> {
    with_failover(rpc, config, "eth_blockNumber", |provider| async move {
        provider.get_block_number().await
    })
    .await
    .map_err(ScanError::ChainHead)
}

/// Runs `op` against the active endpoint, failing over after every failed
/// attempt and retrying with exponential backoff.
pub(crate) async fn with_failover<T, F, Fut>(
    rpc: &RpcManager,
    config: &ScanConfig,
    what: &str,
    op: F,
) -> Result<T, TransportError>
where
    F: Fn(DynProvider) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let attempt = || {
        let call = op(rpc.current());
        async move {
            let result = call.await;
            if result.is_err() {
                if let Err(error) = rpc.fail_over().await {
                    warn!("Failover after {what} failure found no endpoint: {error}");
                }
            }
            result
        }
    };

    attempt
        .retry(config.backoff())
        .notify(|error: &TransportError, delay: Duration| {
            warn!("{what} failed: {error}; retrying in {delay:?}");
        })
        .await
}
