//! Token and pool metadata, resolved through a cache → store → chain cascade.
//!
//! Only this module creates `tokens` and `pools` rows. Resolution of the same
//! address is single-flight within the process; across processes the unique
//! address constraint makes concurrent creation converge on one row.

use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::{SolCall, SolType, sol_data};
use evm_indexer_store::{Pool, Token};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::bindings::IERC20::{self, IERC20Instance};
use crate::bindings::IUniswapV3Pool::IUniswapV3PoolInstance;
use crate::error::ResolveError;
use crate::rpc::RpcManager;

mod cache;

pub use cache::BoundedCache;

const TOKEN_CACHE_CAPACITY: usize = 4096;
const POOL_CACHE_CAPACITY: usize = 1024;

/// A stored pool together with both of its tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPool {
    pub pool: Pool,
    pub token0: Token,
    pub token1: Token,
}

pub struct MetadataResolver {
    rpc: Arc<RpcManager>,
    db: SqlitePool,
    tokens: BoundedCache<Address, Token>,
    pools: BoundedCache<Address, ResolvedPool>,
    in_flight: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl MetadataResolver {
    pub fn new(rpc: Arc<RpcManager>, db: SqlitePool) -> Self {
        Self {
            rpc,
            db,
            tokens: BoundedCache::new("token", TOKEN_CACHE_CAPACITY),
            pools: BoundedCache::new("pool", POOL_CACHE_CAPACITY),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn resolve_token(&self, address: Address) -> Result<Token, ResolveError> {
        if let Some(token) = self.tokens.get(&address) {
            return Ok(token);
        }

        let _guard = self.lock_address(address).await;
        if let Some(token) = self.tokens.get(&address) {
            return Ok(token);
        }

        let result = self.load_token(address).await;
        self.release(address).await;
        let token = result?;

        self.tokens.insert(address, token.clone());
        Ok(token)
    }

    /// Resolves a pool and both of its tokens. `token0`/`token1` reads are
    /// required; the fee tier is best-effort.
    pub async fn resolve_pool(&self, address: Address) -> Result<ResolvedPool, ResolveError> {
        if let Some(resolved) = self.pools.get(&address) {
            return Ok(resolved);
        }

        let _guard = self.lock_address(address).await;
        if let Some(resolved) = self.pools.get(&address) {
            return Ok(resolved);
        }

        let result = self.load_pool(address).await;
        self.release(address).await;
        let resolved = result?;

        self.pools.insert(address, resolved.clone());
        Ok(resolved)
    }

    async fn load_token(&self, address: Address) -> Result<Token, ResolveError> {
        Ok(match Token::find_by_address(&self.db, address).await? {
            Some(stored) if stored.has_metadata() => stored,
            Some(stored) => {
                debug!("Backfilling metadata for token {address}");
                let (symbol, decimals) = self.read_token_metadata(address).await;
                stored
                    .backfill_metadata(&self.db, symbol.as_deref(), decimals)
                    .await?
            }
            None => {
                let (symbol, decimals) = self.read_token_metadata(address).await;
                let (token, created) =
                    Token::get_or_create(&self.db, address, symbol.as_deref(), decimals).await?;
                if created {
                    info!(
                        "New token {address}: symbol={}, decimals={}",
                        token.symbol.as_deref().unwrap_or("?"),
                        token
                            .decimals
                            .map_or_else(|| "?".to_string(), |d| d.to_string())
                    );
                }
                token
            }
        })
    }

    async fn load_pool(&self, address: Address) -> Result<ResolvedPool, ResolveError> {
        Ok(if let Some(pool) = Pool::find_by_address(&self.db, address).await? {
            let (token0, token1) = pool.tokens(&self.db).await?;
            ResolvedPool {
                pool,
                token0,
                token1,
            }
        } else {
            let provider = self.rpc.current();
            let contract = IUniswapV3PoolInstance::new(address, &provider);

            let token0_address = contract.token0().call().await?;
            let token1_address = contract.token1().call().await?;
            let fee = match contract.fee().call().await {
                Ok(fee) => Some(fee.to::<u32>()),
                Err(e) => {
                    debug!("Pool {address} has no readable fee: {e}");
                    None
                }
            };

            let token0 = self.resolve_token(token0_address).await?;
            let token1 = self.resolve_token(token1_address).await?;
            let (pool, created) =
                Pool::get_or_create(&self.db, address, &token0, &token1, fee).await?;
            if created {
                info!(
                    "New pool {address}: {}/{} fee={fee:?}",
                    token0.symbol.as_deref().unwrap_or("?"),
                    token1.symbol.as_deref().unwrap_or("?"),
                );
            }

            ResolvedPool {
                pool,
                token0,
                token1,
            }
        })
    }

    /// Symbol and decimals as read from the token contract. A failed read
    /// yields `None` for that field.
    async fn read_token_metadata(&self, address: Address) -> (Option<String>, Option<u8>) {
        let provider = self.rpc.current();

        let call = TransactionRequest::default()
            .to(address)
            .input(Bytes::from(IERC20::symbolCall {}.abi_encode()).into());
        let symbol = match provider.call(call).await {
            Ok(raw) => decode_symbol(&raw),
            Err(e) => {
                warn!("symbol() failed for token {address}: {e}");
                None
            }
        };

        let decimals = match IERC20Instance::new(address, &provider).decimals().call().await {
            Ok(decimals) => Some(decimals),
            Err(e) => {
                warn!("decimals() failed for token {address}: {e}");
                None
            }
        };

        (symbol, decimals)
    }

    async fn lock_address(&self, address: Address) -> OwnedMutexGuard<()> {
        let lock = self
            .in_flight
            .lock()
            .await
            .entry(address)
            .or_default()
            .clone();

        lock.lock_owned().await
    }

    async fn release(&self, address: Address) {
        self.in_flight.lock().await.remove(&address);
    }
}

/// Decodes a `symbol()` return value. Tokens that predate the ERC-20 string
/// convention return a null-padded `bytes32`; those are read as UTF-8, or
/// rendered as hex when the bytes are not valid text.
pub fn decode_symbol(raw: &[u8]) -> Option<String> {
    if let Ok(symbol) = <sol_data::String as SolType>::abi_decode(raw) {
        return Some(symbol);
    }

    let word = raw.get(..32)?;
    let last = word.iter().rposition(|byte| *byte != 0)?;
    let trimmed = &word[..=last];

    Some(std::str::from_utf8(trimmed).map_or_else(
        |_| alloy::hex::encode(trimmed),
        ToString::to_string,
    ))
}
