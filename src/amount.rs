use alloy::primitives::U256;
use alloy::primitives::ruint::ParseError;

/// Decimals assumed for tokens whose `decimals()` could not be read.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Largest exponent for which `10^decimals * 10` still fits in 256 bits.
const MAX_EXACT_DECIMALS: u8 = 76;

/// Renders a raw token amount scaled by `decimals` with one fractional digit
/// (rounded half up) and comma-grouped thousands, e.g. `"900,000,000.0"`.
pub fn format_amount(raw: U256, decimals: u8) -> String {
    let (raw, decimals) = if decimals > MAX_EXACT_DECIMALS {
        let shifted = U256::from(10)
            .checked_pow(U256::from(decimals - MAX_EXACT_DECIMALS))
            .map_or(U256::ZERO, |excess| raw / excess);
        (shifted, MAX_EXACT_DECIMALS)
    } else {
        (raw, decimals)
    };

    let scale = U256::from(10).pow(U256::from(decimals));
    let mut whole = raw / scale;
    let remainder = raw % scale;

    let mut tenths = (remainder * U256::from(10) + scale / U256::from(2)) / scale;
    if tenths == U256::from(10) {
        whole = whole.saturating_add(U256::from(1));
        tenths = U256::ZERO;
    }

    format!("{}.{tenths}", group_thousands(&whole.to_string()))
}

/// [`format_amount`] for a decimal string as stored in the database.
pub fn format_amount_str(raw: &str, decimals: u8) -> Result<String, ParseError> {
    let raw = U256::from_str_radix(raw, 10)?;
    Ok(format_amount(raw, decimals))
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    grouped
}
