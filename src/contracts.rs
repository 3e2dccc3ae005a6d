//! Static description of the contracts to index: address, ABI and the events
//! to listen for, each mapped to the handler that persists it.
//!
//! The configuration file is JSON; ABI paths are resolved relative to it:
//!
//! ```json
//! {
//!   "contracts": [
//!     {
//!       "address": "0xc57e71F33C2Ce6FDcC6535F2d62e045053C10C91",
//!       "abi": "abi/uniswap_v3_pool.json",
//!       "events": { "Swap": "swap", "Mint": "mint" }
//!     }
//!   ]
//! }
//! ```

use alloy::json_abi::JsonAbi;
use alloy::primitives::Address;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;

/// Which built-in handler persists an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Swap,
    Transfer,
    Mint,
}

#[derive(Debug, Clone)]
pub struct TrackedContract {
    pub address: Address,
    pub abi: JsonAbi,
    pub events: BTreeMap<String, HandlerKind>,
}

#[derive(Debug, Deserialize)]
struct ContractsFile {
    contracts: Vec<ContractEntry>,
}

#[derive(Debug, Deserialize)]
struct ContractEntry {
    address: Address,
    abi: PathBuf,
    events: BTreeMap<String, HandlerKind>,
}

pub fn load_contracts(path: &Path) -> Result<Vec<TrackedContract>, ConfigError> {
    let file: ContractsFile = read_json(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut seen = HashSet::new();
    file.contracts
        .into_iter()
        .map(|entry| {
            if !seen.insert(entry.address) {
                return Err(ConfigError::DuplicateContract(entry.address));
            }

            let abi_path = base_dir.join(&entry.abi);
            let abi: JsonAbi = read_json(&abi_path)?;
            debug!(
                "Loaded ABI {} for {} ({} events tracked)",
                abi_path.display(),
                entry.address,
                entry.events.len()
            );

            Ok(TrackedContract {
                address: entry.address,
                abi,
                events: entry.events,
            })
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}
