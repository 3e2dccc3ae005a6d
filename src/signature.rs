use alloy::json_abi::Event;
use alloy::primitives::{Address, B256, keccak256};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::contracts::TrackedContract;
use crate::error::ConfigError;

/// A tracked event together with the ABI definition used to decode it.
#[derive(Debug, Clone)]
pub struct TrackedEvent {
    pub name: String,
    pub signature: String,
    pub topic: B256,
    pub definition: Event,
}

#[derive(Debug, Default)]
struct ContractSignatures {
    by_topic: HashMap<B256, TrackedEvent>,
    topics: Vec<B256>,
}

/// Topic hashes of every tracked `(contract, event)` pair. Built once at
/// startup and immutable afterwards.
#[derive(Debug, Default)]
pub struct SignatureIndex {
    contracts: BTreeMap<Address, ContractSignatures>,
}

impl SignatureIndex {
    pub fn build(tracked: &[TrackedContract]) -> Result<Self, ConfigError> {
        let mut contracts = BTreeMap::new();

        for contract in tracked {
            let mut signatures = ContractSignatures::default();

            for name in contract.events.keys() {
                let definition = contract
                    .abi
                    .events
                    .get(name)
                    .and_then(|overloads| overloads.first())
                    .ok_or_else(|| ConfigError::MissingEventDefinition {
                        event: name.clone(),
                        contract: contract.address,
                    })?;

                let signature = canonical_signature(definition);
                let topic = keccak256(signature.as_bytes());

                info!("Tracking {signature} on {} (topic {topic})", contract.address);

                signatures.topics.push(topic);
                signatures.by_topic.insert(
                    topic,
                    TrackedEvent {
                        name: name.clone(),
                        signature,
                        topic,
                        definition: definition.clone(),
                    },
                );
            }

            contracts.insert(contract.address, signatures);
        }

        Ok(Self { contracts })
    }

    /// The tracked event a log's first topic refers to, if any.
    pub fn lookup(&self, contract: Address, topic0: B256) -> Option<&TrackedEvent> {
        self.contracts.get(&contract)?.by_topic.get(&topic0)
    }

    /// All tracked topic hashes of a contract, in configuration order.
    pub fn topics_for(&self, contract: Address) -> &[B256] {
        self.contracts
            .get(&contract)
            .map_or(&[], |signatures| signatures.topics.as_slice())
    }

    pub fn topic_for(&self, contract: Address, event: &str) -> Option<B256> {
        self.contracts
            .get(&contract)?
            .by_topic
            .values()
            .find(|tracked| tracked.name == event)
            .map(|tracked| tracked.topic)
    }

    /// Tracked contract addresses in ascending order.
    pub fn contracts(&self) -> impl Iterator<Item = Address> + '_ {
        self.contracts.keys().copied()
    }
}

/// `Name(type1,type2,...)` using canonical ABI types.
fn canonical_signature(event: &Event) -> String {
    let types = event
        .inputs
        .iter()
        .map(|input| input.selector_type().into_owned())
        .collect::<Vec<_>>()
        .join(",");

    format!("{}({types})", event.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::HandlerKind;
    use crate::test_utils::{erc20_contract, pool_contract};
    use alloy::primitives::{address, b256};
    use alloy::sol_types::SolEvent;

    use crate::bindings::IERC20::Transfer;
    use crate::bindings::IUniswapV3Pool::{Mint, Swap};

    #[test]
    fn test_transfer_topic_matches_known_hash() {
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let index = SignatureIndex::build(&[erc20_contract(token)]).unwrap();

        let topic = index.topic_for(token, "Transfer").unwrap();

        assert_eq!(
            topic,
            b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
        assert_eq!(topic, Transfer::SIGNATURE_HASH);
        assert_eq!(index.topics_for(token), &[topic]);
    }

    #[test]
    fn test_pool_topics_match_sol_bindings() {
        let pool = address!("0xc57e71F33C2Ce6FDcC6535F2d62e045053C10C91");
        let index = SignatureIndex::build(&[pool_contract(pool)]).unwrap();

        let swap = index.lookup(pool, Swap::SIGNATURE_HASH).unwrap();
        assert_eq!(swap.name, "Swap");
        assert_eq!(
            swap.signature,
            "Swap(address,address,int256,int256,uint160,uint128,int24)"
        );

        let mint = index.lookup(pool, Mint::SIGNATURE_HASH).unwrap();
        assert_eq!(mint.name, "Mint");
        assert_eq!(index.topics_for(pool).len(), 2);
    }

    #[test]
    fn test_missing_event_is_a_config_error() {
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let mut contract = erc20_contract(token);
        contract
            .events
            .insert("Approval".to_string(), HandlerKind::Transfer);

        let error = SignatureIndex::build(&[contract]).unwrap_err();

        match error {
            ConfigError::MissingEventDefinition { event, contract } => {
                assert_eq!(event, "Approval");
                assert_eq!(contract, token);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lookup_is_scoped_per_contract() {
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let pool = address!("0xc57e71F33C2Ce6FDcC6535F2d62e045053C10C91");
        let index =
            SignatureIndex::build(&[erc20_contract(token), pool_contract(pool)]).unwrap();

        assert!(index.lookup(token, Transfer::SIGNATURE_HASH).is_some());
        assert!(index.lookup(pool, Transfer::SIGNATURE_HASH).is_none());
        assert!(index.lookup(Address::ZERO, Transfer::SIGNATURE_HASH).is_none());
        assert!(index.topics_for(Address::ZERO).is_empty());
        assert_eq!(index.contracts().collect::<Vec<_>>(), vec![token, pool]);
    }
}
