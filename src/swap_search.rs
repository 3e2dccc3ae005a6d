//! One-shot search for `Swap` events of a set of pools involving a user,
//! straight from the chain. Nothing is persisted.

use alloy::primitives::aliases::{I24, U160};
use alloy::primitives::{Address, B256, I256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use clap::ValueEnum;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::bindings::IUniswapV3Pool::Swap;
use crate::error::TransportError;
use crate::rpc::RpcManager;
use crate::scanner::{ScanConfig, chunk_ranges, with_failover};

/// Which indexed side of a swap the user must appear on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SwapRole {
    Sender,
    Recipient,
    Any,
}

#[derive(Debug, Clone)]
pub struct SwapQuery {
    pub pools: Vec<Address>,
    pub user: Option<Address>,
    pub role: SwapRole,
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundSwap {
    pub pool: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub sender: Address,
    pub recipient: Address,
    pub amount0: I256,
    pub amount1: I256,
    pub sqrt_price_x96: U160,
    pub liquidity: u128,
    pub tick: I24,
}

impl FoundSwap {
    fn from_log(log: &Log) -> Option<Self> {
        let decoded = match log.log_decode::<Swap>() {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!("Undecodable Swap log from {}: {error}", log.address());
                return None;
            }
        };

        let swap = &decoded.inner.data;
        Some(Self {
            pool: log.address(),
            block_number: log.block_number?,
            tx_hash: log.transaction_hash?,
            log_index: log.log_index?,
            sender: swap.sender,
            recipient: swap.recipient,
            amount0: swap.amount0,
            amount1: swap.amount1,
            sqrt_price_x96: swap.sqrtPriceX96,
            liquidity: swap.liquidity,
            tick: swap.tick,
        })
    }
}

/// Fetches every matching swap in `[from_block, to_block]`, deduplicated by
/// `(tx_hash, log_index)` and ordered by `(block_number, log_index)`. Chunks
/// that keep failing after retries are logged and left out.
pub async fn find_swaps(
    rpc: &RpcManager,
    config: &ScanConfig,
    query: &SwapQuery,
) -> Vec<FoundSwap> {
    let roles = match (query.user, query.role) {
        (Some(_), SwapRole::Any) => vec![SwapRole::Sender, SwapRole::Recipient],
        (_, role) => vec![role],
    };

    let mut raw_logs = Vec::new();
    for &pool in &query.pools {
        for &role in &roles {
            for (start, end) in chunk_ranges(query.from_block, query.to_block, config.chunk_size) {
                let filter = swap_filter(pool, query.user, role, start, end);

                match fetch(rpc, config, &filter).await {
                    Ok(logs) => {
                        debug!("{pool} blocks {start}-{end}: {} Swap log(s)", logs.len());
                        raw_logs.extend(logs);
                    }
                    Err(error) => {
                        warn!("{pool} blocks {start}-{end}: giving up after retries: {error}");
                    }
                }
            }
        }
    }

    let mut seen = HashSet::new();
    let mut swaps: Vec<FoundSwap> = raw_logs
        .iter()
        .filter_map(FoundSwap::from_log)
        .filter(|swap| seen.insert((swap.tx_hash, swap.log_index)))
        .collect();
    swaps.sort_by_key(|swap| (swap.block_number, swap.log_index));

    info!("Found {} swap(s) across {} pool(s)", swaps.len(), query.pools.len());
    swaps
}

async fn fetch(
    rpc: &RpcManager,
    config: &ScanConfig,
    filter: &Filter,
) -> Result<Vec<Log>, TransportError> {
    with_failover(rpc, config, "eth_getLogs", |provider| {
        let filter = filter.clone();
        async move { provider.get_logs(&filter).await }
    })
    .await
}

fn swap_filter(
    pool: Address,
    user: Option<Address>,
    role: SwapRole,
    start: u64,
    end: u64,
) -> Filter {
    let filter = Filter::new()
        .address(pool)
        .from_block(start)
        .to_block(end)
        .event_signature(Swap::SIGNATURE_HASH);

    match (user, role) {
        (Some(user), SwapRole::Sender) => filter.topic1(user.into_word()),
        (Some(user), SwapRole::Recipient) => filter.topic2(user.into_word()),
        _ => filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_log, mocked_rpc};
    use alloy::primitives::address;
    use alloy::providers::mock::Asserter;
    use alloy::rpc::types::Topic;
    use std::time::Duration;

    const POOL: Address = address!("0x76F2562B8826B14e0F0362724eC3887fbc62FB74");
    const USER: Address = address!("0x386f4A00d86e783b9a0f83A7A767f6384b94e529");

    fn config() -> ScanConfig {
        ScanConfig {
            chunk_size: 10_000,
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..ScanConfig::default()
        }
    }

    fn swap_log(sender: Address, recipient: Address, block_number: u64, log_index: u64) -> Log {
        let swap = Swap {
            sender,
            recipient,
            amount0: I256::try_from(10).unwrap(),
            amount1: I256::try_from(-20).unwrap(),
            sqrtPriceX96: U160::from(1_u64 << 40),
            liquidity: 7,
            tick: I24::try_from(3_i32).unwrap(),
        };
        create_log(POOL, swap.encode_log_data(), block_number, log_index)
    }

    #[test]
    fn test_filter_places_user_on_role_topic() {
        let sender = swap_filter(POOL, Some(USER), SwapRole::Sender, 1, 2);
        assert_eq!(sender.topics[0], Topic::from(Swap::SIGNATURE_HASH));
        assert_eq!(sender.topics[1], Topic::from(USER.into_word()));
        assert!(sender.topics[2].is_empty());

        let recipient = swap_filter(POOL, Some(USER), SwapRole::Recipient, 1, 2);
        assert!(recipient.topics[1].is_empty());
        assert_eq!(recipient.topics[2], Topic::from(USER.into_word()));

        let unfiltered = swap_filter(POOL, None, SwapRole::Sender, 1, 2);
        assert!(unfiltered.topics[1].is_empty());
        assert!(unfiltered.topics[2].is_empty());
    }

    #[tokio::test]
    async fn test_any_role_queries_both_sides_and_dedups() {
        let asserter = Asserter::new();
        let rpc = mocked_rpc(&asserter).await;
        let both = swap_log(USER, USER, 120, 4);
        let later = swap_log(Address::ZERO, USER, 150, 0);
        let earlier = swap_log(USER, Address::ZERO, 100, 1);
        asserter.push_success(&vec![both.clone(), earlier]);
        asserter.push_success(&vec![later, both]);

        let swaps = find_swaps(
            &rpc,
            &config(),
            &SwapQuery {
                pools: vec![POOL],
                user: Some(USER),
                role: SwapRole::Any,
                from_block: 0,
                to_block: 9_999,
            },
        )
        .await;

        let positions: Vec<_> = swaps.iter().map(|s| (s.block_number, s.log_index)).collect();
        assert_eq!(positions, vec![(100, 1), (120, 4), (150, 0)]);
        assert_eq!(swaps[0].pool, POOL);
        assert_eq!(swaps[0].amount1, I256::try_from(-20).unwrap());
        assert_eq!(swaps[0].liquidity, 7);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_left_out() {
        let asserter = Asserter::new();
        let rpc = mocked_rpc(&asserter).await;
        // two attempts for the first chunk, each followed by a failover probe
        for _ in 0..2 {
            asserter.push_failure_msg("timeout");
            asserter.push_success(&alloy::primitives::U64::from(100));
        }
        asserter.push_success(&vec![swap_log(USER, USER, 15_000, 0)]);

        let swaps = find_swaps(
            &rpc,
            &config(),
            &SwapQuery {
                pools: vec![POOL],
                user: Some(USER),
                role: SwapRole::Sender,
                from_block: 0,
                to_block: 19_999,
            },
        )
        .await;

        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].block_number, 15_000);
    }
}
