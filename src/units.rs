//! Quantity conversions for JSON-RPC values
//!
//! JSON-RPC encodes integers as `0x` quantities. These helpers decode them and
//! render wei amounts in human units for agent-facing responses.

use crate::error::{Error, Result};

/// Decimals of the native currency on every supported EVM chain.
pub const NATIVE_DECIMALS: u32 = 18;

/// Decode a `0x` quantity into a `u128`.
pub fn parse_quantity(value: &str) -> Result<u128> {
    let body = value
        .strip_prefix("0x")
        .ok_or_else(|| Error::Decode(format!("expected 0x quantity, got '{}'", value)))?;
    if body.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(body, 16)
        .map_err(|e| Error::Decode(format!("invalid quantity '{}': {}", value, e)))
}

/// Decode a `0x` quantity into a `u64` (block numbers, gas, nonces).
pub fn parse_quantity_u64(value: &str) -> Result<u64> {
    let wide = parse_quantity(value)?;
    u64::try_from(wide).map_err(|_| Error::Decode(format!("quantity '{}' exceeds u64", value)))
}

/// Render an integer amount with `decimals` fractional digits, trailing zeros trimmed.
pub fn format_units(amount: u128, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let digits = amount.to_string();
    let decimals = decimals as usize;
    let (whole, fraction) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    };
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Wei to gwei, for gas prices.
pub fn format_gwei(wei: u128) -> String {
    format_units(wei, 9)
}

/// Wei to the native unit (ether on mainnet).
pub fn format_ether(wei: u128) -> String {
    format_units(wei, NATIVE_DECIMALS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x1bc16d674ec80000").unwrap(), 2_000_000_000_000_000_000);
        assert!(parse_quantity("1234").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_quantity_u64_overflow() {
        assert_eq!(parse_quantity_u64("0x12a05f200").unwrap(), 5_000_000_000);
        assert!(parse_quantity_u64("0x1ffffffffffffffff").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(0), "0");
        assert_eq!(format_ether(1_000_000_000_000_000_000), "1");
        assert_eq!(format_ether(1_500_000_000_000_000_000), "1.5");
        assert_eq!(format_ether(1), "0.000000000000000001");
    }

    #[test]
    fn test_format_gwei() {
        assert_eq!(format_gwei(25_000_000_000), "25");
        assert_eq!(format_gwei(1_234_567_890), "1.23456789");
    }

    #[test]
    fn test_format_units_zero_decimals() {
        assert_eq!(format_units(42, 0), "42");
    }
}
