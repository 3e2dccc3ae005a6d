use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::Event;
use alloy::primitives::{Address, B256, I256, U256};
use alloy::rpc::types::Log;
use chrono::{DateTime, Utc};

use crate::error::DecodeError;

/// Where a log came from. `block_timestamp` is filled in by the scanner when
/// the node does not include it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub contract: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_timestamp: Option<DateTime<Utc>>,
}

impl LogMeta {
    pub fn from_log(log: &Log) -> Result<Self, DecodeError> {
        Ok(Self {
            contract: log.address(),
            block_number: log.block_number.ok_or(DecodeError::NoBlockNumber)?,
            tx_hash: log.transaction_hash.ok_or(DecodeError::NoTxHash)?,
            log_index: log.log_index.ok_or(DecodeError::NoLogIndex)?,
            block_timestamp: log
                .block_timestamp
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventParam {
    pub name: String,
    pub indexed: bool,
    pub value: DynSolValue,
}

/// A decoded log: its position on chain, the event name and every input in
/// ABI declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub meta: LogMeta,
    pub name: String,
    pub params: Vec<EventParam>,
}

impl EventRecord {
    /// Decodes indexed inputs from the topics and the rest from the data
    /// section, then interleaves them back into declaration order.
    pub fn decode(log: &Log, definition: &Event) -> Result<Self, DecodeError> {
        let meta = LogMeta::from_log(log)?;
        let decoded = definition.decode_log(log.data())?;

        let expected = definition.inputs.iter().filter(|input| input.indexed).count();
        let body = definition.inputs.len() - expected;
        if decoded.indexed.len() != expected || decoded.body.len() != body {
            return Err(DecodeError::Arity {
                expected,
                body,
                got: decoded.indexed.len() + decoded.body.len(),
            });
        }

        let mut indexed = decoded.indexed.into_iter();
        let mut data = decoded.body.into_iter();

        let params = definition
            .inputs
            .iter()
            .map(|input| {
                let value = if input.indexed {
                    indexed.next()
                } else {
                    data.next()
                };

                value
                    .map(|value| EventParam {
                        name: input.name.clone(),
                        indexed: input.indexed,
                        value,
                    })
                    .ok_or_else(|| DecodeError::MissingParam(input.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            meta,
            name: definition.name.clone(),
            params,
        })
    }

    pub fn param(&self, name: &str) -> Option<&DynSolValue> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.value)
    }

    fn required(&self, name: &str) -> Result<&DynSolValue, DecodeError> {
        self.param(name)
            .ok_or_else(|| DecodeError::MissingParam(name.to_string()))
    }

    pub fn address(&self, name: &str) -> Result<Address, DecodeError> {
        self.required(name)?
            .as_address()
            .ok_or_else(|| unexpected(name, "address"))
    }

    pub fn uint(&self, name: &str) -> Result<U256, DecodeError> {
        self.required(name)?
            .as_uint()
            .map(|(value, _)| value)
            .ok_or_else(|| unexpected(name, "uint"))
    }

    pub fn int(&self, name: &str) -> Result<I256, DecodeError> {
        self.required(name)?
            .as_int()
            .map(|(value, _)| value)
            .ok_or_else(|| unexpected(name, "int"))
    }

    /// `(tx_hash, log_index)`, unique per log on a canonical chain.
    pub fn natural_key(&self) -> (B256, u64) {
        (self.meta.tx_hash, self.meta.log_index)
    }
}

fn unexpected(name: &str, expected: &'static str) -> DecodeError {
    DecodeError::UnexpectedType {
        name: name.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::IERC20::Transfer;
    use crate::bindings::IUniswapV3Pool::{Mint, Swap};
    use crate::test_utils::{
        ERC20_ABI_JSON, TEST_TX_HASH, UNISWAP_V3_POOL_ABI_JSON, create_log,
    };
    use alloy::json_abi::JsonAbi;
    use alloy::primitives::aliases::{I24, U160};
    use alloy::primitives::{LogData, address};
    use alloy::sol_types::SolEvent;

    fn event(abi_json: &str, name: &str) -> Event {
        let abi: JsonAbi = serde_json::from_str(abi_json).unwrap();
        abi.events.get(name).unwrap()[0].clone()
    }

    #[test]
    fn test_decode_transfer() {
        let from = address!("0x8FB8a35f99A9e7fF87cd4E0e6fB1A87b72F88954");
        let to = address!("0x000000000000000000000000000000000000dEaD");
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let transfer = Transfer {
            from,
            to,
            value: U256::from(10).pow(U256::from(18)),
        };
        let mut log = create_log(token, transfer.encode_log_data(), 42, 7);
        log.block_timestamp = Some(1_700_000_000);

        let record = EventRecord::decode(&log, &event(ERC20_ABI_JSON, "Transfer")).unwrap();

        assert_eq!(record.name, "Transfer");
        assert_eq!(record.meta.contract, token);
        assert_eq!(record.meta.block_number, 42);
        assert_eq!(record.natural_key(), (TEST_TX_HASH, 7));
        assert_eq!(
            record.meta.block_timestamp,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
        assert_eq!(record.address("from").unwrap(), from);
        assert_eq!(record.address("to").unwrap(), to);
        assert_eq!(
            record.uint("value").unwrap().to_string(),
            "1000000000000000000"
        );
        assert!(record.params[0].indexed);
        assert!(!record.params[2].indexed);
    }

    #[test]
    fn test_decode_swap_keeps_declaration_order_and_signs() {
        let pool = address!("0xc57e71F33C2Ce6FDcC6535F2d62e045053C10C91");
        let swap = Swap {
            sender: address!("0x1111111111111111111111111111111111111111"),
            recipient: address!("0x2222222222222222222222222222222222222222"),
            amount0: I256::try_from(-5_000_i64).unwrap(),
            amount1: I256::try_from(7_000_i64).unwrap(),
            sqrtPriceX96: U160::from(79_228_162_514_264_337_593_543_950_336_u128),
            liquidity: 1_000_000,
            tick: I24::try_from(-200_i32).unwrap(),
        };
        let log = create_log(pool, swap.encode_log_data(), 1, 0);

        let record =
            EventRecord::decode(&log, &event(UNISWAP_V3_POOL_ABI_JSON, "Swap")).unwrap();

        let names: Vec<_> = record.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "sender",
                "recipient",
                "amount0",
                "amount1",
                "sqrtPriceX96",
                "liquidity",
                "tick"
            ]
        );
        assert_eq!(record.int("amount0").unwrap().to_string(), "-5000");
        assert_eq!(record.int("tick").unwrap().to_string(), "-200");
        assert_eq!(
            record.uint("sqrtPriceX96").unwrap().to_string(),
            "79228162514264337593543950336"
        );
    }

    #[test]
    fn test_decode_mint_interleaves_indexed_inputs() {
        let pool = address!("0xc57e71F33C2Ce6FDcC6535F2d62e045053C10C91");
        let owner = address!("0x3333333333333333333333333333333333333333");
        let mint = Mint {
            sender: address!("0x4444444444444444444444444444444444444444"),
            owner,
            tickLower: I24::try_from(-60_i32).unwrap(),
            tickUpper: I24::try_from(60_i32).unwrap(),
            amount: 10,
            amount0: U256::from(1),
            amount1: U256::from(2),
        };
        let log = create_log(pool, mint.encode_log_data(), 1, 0);

        let record =
            EventRecord::decode(&log, &event(UNISWAP_V3_POOL_ABI_JSON, "Mint")).unwrap();

        assert_eq!(record.params[0].name, "sender");
        assert!(!record.params[0].indexed);
        assert_eq!(record.address("owner").unwrap(), owner);
        assert_eq!(record.int("tickLower").unwrap().to_string(), "-60");
        assert_eq!(record.uint("amount1").unwrap(), U256::from(2));
    }

    #[test]
    fn test_decode_truncated_data_fails() {
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let data = LogData::new_unchecked(
            vec![
                Transfer::SIGNATURE_HASH,
                B256::left_padding_from(&[1]),
                B256::left_padding_from(&[2]),
            ],
            vec![0u8; 4].into(),
        );
        let log = create_log(token, data, 1, 0);

        let result = EventRecord::decode(&log, &event(ERC20_ABI_JSON, "Transfer"));

        assert!(matches!(result, Err(DecodeError::Abi(_))));
    }

    #[test]
    fn test_decode_requires_position() {
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let transfer = Transfer {
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
        };
        let mut log = create_log(token, transfer.encode_log_data(), 1, 0);
        log.transaction_hash = None;

        let result = EventRecord::decode(&log, &event(ERC20_ABI_JSON, "Transfer"));

        assert!(matches!(result, Err(DecodeError::NoTxHash)));
    }

    #[test]
    fn test_typed_accessors_reject_wrong_types() {
        let token = address!("0x525d1e8Df8889A2E8d40bE24d8A21d18Ec161f7F");
        let transfer = Transfer {
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::from(1),
        };
        let log = create_log(token, transfer.encode_log_data(), 1, 0);
        let record = EventRecord::decode(&log, &event(ERC20_ABI_JSON, "Transfer")).unwrap();

        assert!(matches!(
            record.address("value"),
            Err(DecodeError::UnexpectedType { .. })
        ));
        assert!(matches!(
            record.uint("amount"),
            Err(DecodeError::MissingParam(_))
        ));
    }
}
