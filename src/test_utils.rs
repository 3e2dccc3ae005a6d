use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, B256, LogData, U64, fixed_bytes};
use alloy::providers::mock::Asserter;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Log;
use alloy::transports::TransportErrorKind;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use url::Url;

use crate::contracts::{HandlerKind, TrackedContract};
use crate::error::TransportError;
use crate::rpc::{Connector, RpcManager};

pub use evm_indexer_store::test_utils::setup_test_db;

pub const ERC20_ABI_JSON: &str = r#"[
    {
        "type": "event",
        "name": "Transfer",
        "anonymous": false,
        "inputs": [
            { "name": "from", "type": "address", "indexed": true },
            { "name": "to", "type": "address", "indexed": true },
            { "name": "value", "type": "uint256", "indexed": false }
        ]
    },
    {
        "type": "function",
        "name": "symbol",
        "stateMutability": "view",
        "inputs": [],
        "outputs": [{ "name": "", "type": "string" }]
    },
    {
        "type": "function",
        "name": "decimals",
        "stateMutability": "view",
        "inputs": [],
        "outputs": [{ "name": "", "type": "uint8" }]
    }
]"#;

pub const UNISWAP_V3_POOL_ABI_JSON: &str = r#"[
    {
        "type": "event",
        "name": "Swap",
        "anonymous": false,
        "inputs": [
            { "name": "sender", "type": "address", "indexed": true },
            { "name": "recipient", "type": "address", "indexed": true },
            { "name": "amount0", "type": "int256", "indexed": false },
            { "name": "amount1", "type": "int256", "indexed": false },
            { "name": "sqrtPriceX96", "type": "uint160", "indexed": false },
            { "name": "liquidity", "type": "uint128", "indexed": false },
            { "name": "tick", "type": "int24", "indexed": false }
        ]
    },
    {
        "type": "event",
        "name": "Mint",
        "anonymous": false,
        "inputs": [
            { "name": "sender", "type": "address", "indexed": false },
            { "name": "owner", "type": "address", "indexed": true },
            { "name": "tickLower", "type": "int24", "indexed": true },
            { "name": "tickUpper", "type": "int24", "indexed": true },
            { "name": "amount", "type": "uint128", "indexed": false },
            { "name": "amount0", "type": "uint256", "indexed": false },
            { "name": "amount1", "type": "uint256", "indexed": false }
        ]
    },
    {
        "type": "function",
        "name": "token0",
        "stateMutability": "view",
        "inputs": [],
        "outputs": [{ "name": "", "type": "address" }]
    },
    {
        "type": "function",
        "name": "token1",
        "stateMutability": "view",
        "inputs": [],
        "outputs": [{ "name": "", "type": "address" }]
    },
    {
        "type": "function",
        "name": "fee",
        "stateMutability": "view",
        "inputs": [],
        "outputs": [{ "name": "", "type": "uint24" }]
    }
]"#;

pub fn erc20_contract(address: Address) -> TrackedContract {
    TrackedContract {
        address,
        abi: serde_json::from_str::<JsonAbi>(ERC20_ABI_JSON).unwrap(),
        events: BTreeMap::from([("Transfer".to_string(), HandlerKind::Transfer)]),
    }
}

pub fn pool_contract(address: Address) -> TrackedContract {
    TrackedContract {
        address,
        abi: serde_json::from_str::<JsonAbi>(UNISWAP_V3_POOL_ABI_JSON).unwrap(),
        events: BTreeMap::from([
            ("Swap".to_string(), HandlerKind::Swap),
            ("Mint".to_string(), HandlerKind::Mint),
        ]),
    }
}

pub const TEST_TX_HASH: B256 =
    fixed_bytes!("0xbeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

/// RPC log emitted by `address` with the given encoded event data, at
/// `block_number` / `log_index` of [`TEST_TX_HASH`].
pub fn create_log(address: Address, data: LogData, block_number: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: None,
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(TEST_TX_HASH),
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// Minimal `eth_getBlockByNumber` response carrying only what the indexer
/// reads from a header.
pub fn block_json(number: u64, timestamp: u64) -> serde_json::Value {
    serde_json::json!({
        "hash": B256::repeat_byte(0x11),
        "parentHash": B256::ZERO,
        "sha3Uncles": B256::ZERO,
        "miner": Address::ZERO,
        "stateRoot": B256::ZERO,
        "transactionsRoot": B256::ZERO,
        "receiptsRoot": B256::ZERO,
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "number": U64::from(number),
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": U64::from(timestamp),
        "extraData": "0x",
        "mixHash": B256::ZERO,
        "nonce": "0x0000000000000000",
        "transactions": [],
        "uncles": []
    })
}

/// Connector that hands out mocked providers keyed by URL. URLs without an
/// asserter behave as unreachable endpoints.
#[derive(Default, Clone)]
pub struct MockConnector {
    asserters: HashMap<Url, Asserter>,
}

impl MockConnector {
    #[must_use]
    pub fn with(mut self, url: &Url, asserter: Asserter) -> Self {
        self.asserters.insert(url.clone(), asserter);
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<DynProvider, TransportError> {
        let asserter = self
            .asserters
            .get(url)
            .ok_or_else(|| TransportErrorKind::custom_str("connection refused"))?;

        Ok(ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased())
    }
}

pub fn test_url(n: u8) -> Url {
    Url::parse(&format!("http://rpc-{n}.test")).unwrap()
}

/// Connects an [`RpcManager`] to a single mocked endpoint. The liveness probe
/// response is queued before connecting.
pub async fn mocked_rpc(asserter: &Asserter) -> Arc<RpcManager> {
    asserter.push_success(&U64::from(100));
    let url = test_url(1);
    let connector = MockConnector::default().with(&url, asserter.clone());

    Arc::new(RpcManager::connect(vec![url], Arc::new(connector)).await.unwrap())
}

