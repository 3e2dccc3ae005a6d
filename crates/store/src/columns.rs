//! Conversions between domain values and their SQLite column representation.
//!
//! Addresses are stored checksummed, hashes as 0x-prefixed lowercase hex and
//! block numbers / log indices as non-negative `INTEGER`s.

use alloy::primitives::{Address, B256};
use std::str::FromStr;

use crate::StoreError;

pub(crate) fn address_column(address: Address) -> String {
    address.to_checksum(None)
}

pub(crate) fn hash_column(hash: B256) -> String {
    format!("{hash:#x}")
}

pub(crate) fn parse_address(value: &str) -> Result<Address, StoreError> {
    Address::from_str(value).map_err(|_| StoreError::InvalidAddress(value.to_string()))
}

pub(crate) fn parse_hash(value: &str) -> Result<B256, StoreError> {
    B256::from_str(value).map_err(|_| StoreError::InvalidTxHash(value.to_string()))
}

pub(crate) fn u64_column(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

pub(crate) fn u64_from_column(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    #[test]
    fn test_address_column_is_checksummed() {
        let address = address!("0xfb889425b72c97c5b4484cf148ae2404ab7a13e7");
        assert_eq!(
            address_column(address),
            "0xfB889425B72c97C5b4484cF148AE2404AB7A13e7"
        );
        assert_eq!(parse_address(&address_column(address)).unwrap(), address);
    }

    #[test]
    fn test_hash_column_is_lowercase_hex() {
        let hash = b256!("0xBEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEEE");
        let column = hash_column(hash);
        assert!(column.starts_with("0x"));
        assert_eq!(column, column.to_lowercase());
        assert_eq!(parse_hash(&column).unwrap(), hash);
    }

    #[test]
    fn test_integer_columns_reject_out_of_range_values() {
        assert!(matches!(
            u64_column("block_number", u64::MAX),
            Err(StoreError::OutOfRange { column: "block_number", .. })
        ));
        assert!(matches!(
            u64_from_column("log_index", -1),
            Err(StoreError::OutOfRange { column: "log_index", .. })
        ));
        assert_eq!(u64_column("block_number", 42).unwrap(), 42);
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!(matches!(
            parse_address("not-an-address"),
            Err(StoreError::InvalidAddress(_))
        ));
    }
}
