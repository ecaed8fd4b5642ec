//! Exact conversion between ether strings and wei
//!
//! Input is validated here before it reaches alloy's parser: only plain
//! decimal strings are accepted (no signs, no exponents, at most 18 decimal
//! places). A lossy conversion would change the value actually transferred.

use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::U256;

use crate::error::WagerError;

/// Decimal places of ether
pub const ETHER_DECIMALS: usize = 18;

/// Convert a human-readable ether amount into wei
///
/// Fails with `InvalidInput` on anything that is not a positive decimal
/// representable exactly in wei.
pub fn to_base_unit(amount: &str) -> Result<U256, WagerError> {
    let normalized = normalize(amount)?;
    let wei = parse_ether(&normalized)
        .map_err(|e| WagerError::invalid_input(format!("cannot convert '{}': {}", amount.trim(), e)))?;

    if wei.is_zero() {
        return Err(WagerError::invalid_input("amount must be greater than zero"));
    }
    Ok(wei)
}

/// Convert wei into an ether string with all 18 decimal places
pub fn from_base_unit(wei: U256) -> String {
    format_ether(wei)
}

/// Ether string for display: trailing fractional zeros trimmed
pub fn display_amount(wei: U256) -> String {
    let formatted = from_base_unit(wei);
    match formatted.split_once('.') {
        Some((int, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                int.to_string()
            } else {
                format!("{}.{}", int, frac)
            }
        }
        None => formatted,
    }
}

/// Check the shape of a decimal string and canonicalize `.5` / `5.`
fn normalize(amount: &str) -> Result<String, WagerError> {
    let s = amount.trim();
    if s.is_empty() {
        return Err(WagerError::invalid_input("amount is empty"));
    }

    let (int, frac) = match s.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (s, None),
    };

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int) || !frac.map(all_digits).unwrap_or(true) {
        return Err(WagerError::invalid_input(format!("'{}' is not a plain decimal number", s)));
    }

    let frac = frac.unwrap_or("");
    if int.is_empty() && frac.is_empty() {
        return Err(WagerError::invalid_input(format!("'{}' has no digits", s)));
    }
    if frac.len() > ETHER_DECIMALS {
        return Err(WagerError::invalid_input(format!(
            "'{}' has more than {} decimal places",
            s, ETHER_DECIMALS
        )));
    }

    let int = if int.is_empty() { "0" } else { int };
    if frac.is_empty() {
        Ok(int.to_string())
    } else {
        Ok(format!("{}.{}", int, frac))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    #[test]
    fn test_to_base_unit_exact() {
        assert_eq!(to_base_unit("0.5").unwrap(), U256::from(500_000_000_000_000_000u64));
        assert_eq!(to_base_unit("10").unwrap(), ether(10));
        assert_eq!(to_base_unit("0.000000000000000001").unwrap(), U256::from(1u64));
        assert_eq!(to_base_unit(".25").unwrap(), U256::from(250_000_000_000_000_000u64));
        assert_eq!(to_base_unit("3.").unwrap(), ether(3));
        assert_eq!(to_base_unit("  1.1  ").unwrap(), U256::from(1_100_000_000_000_000_000u64));
    }

    #[test]
    fn test_to_base_unit_rejects_malformed() {
        for input in ["", "   ", ".", "abc", "1e18", "-1", "+1", "1.2.3", "1,5", "0x10", "NaN"] {
            let err = to_base_unit(input).unwrap_err();
            assert!(
                matches!(err, WagerError::InvalidInput { .. }),
                "expected InvalidInput for {:?}, got {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_to_base_unit_rejects_zero() {
        assert!(matches!(to_base_unit("0"), Err(WagerError::InvalidInput { .. })));
        assert!(matches!(to_base_unit("0.000"), Err(WagerError::InvalidInput { .. })));
    }

    #[test]
    fn test_to_base_unit_rejects_sub_wei_precision() {
        let err = to_base_unit("0.0000000000000000001").unwrap_err();
        assert!(err.to_string().contains("more than 18 decimal places"));
    }

    #[test]
    fn test_display_amount() {
        assert_eq!(display_amount(ether(10)), "10");
        assert_eq!(display_amount(U256::from(500_000_000_000_000_000u64)), "0.5");
        assert_eq!(display_amount(U256::ZERO), "0");
        assert_eq!(display_amount(U256::from(1u64)), "0.000000000000000001");
    }

    proptest! {
        #[test]
        fn prop_base_unit_round_trip(wei in 1u128..=u128::MAX) {
            let wei = U256::from(wei);
            prop_assert_eq!(to_base_unit(&from_base_unit(wei)).unwrap(), wei);
            prop_assert_eq!(to_base_unit(&display_amount(wei)).unwrap(), wei);
        }
    }
}
