//! Conversion between UI-facing decimal strings and ledger base units.

use equinex_ledger::{Amount, AMOUNT_DECIMALS};

use crate::errors::{MarketError, Result};

const SCALE: Amount = 10u128.pow(AMOUNT_DECIMALS);

/// Parse a decimal string such as `"10"` or `"0.25"` into base units.
pub fn parse_units(raw: &str) -> Result<Amount> {
    let raw = raw.trim();
    let invalid = || MarketError::Amount(format!("{raw:?} is not a decimal amount"));

    let (whole, fraction) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > AMOUNT_DECIMALS as usize {
        return Err(MarketError::Amount(format!(
            "{raw:?} has more than {AMOUNT_DECIMALS} decimal places"
        )));
    }

    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let padded = format!("{fraction:0<width$}", width = AMOUNT_DECIMALS as usize);
    let fraction: Amount = padded.parse().map_err(|_| invalid())?;

    whole
        .checked_mul(SCALE)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| MarketError::Amount(format!("{raw:?} is too large")))
}

/// Render base units as a decimal string without trailing zeros.
pub fn format_units(amount: Amount) -> String {
    let whole = amount / SCALE;
    let fraction = amount % SCALE;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0>width$}", width = AMOUNT_DECIMALS as usize);
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional() {
        assert_eq!(parse_units("10").unwrap(), 10 * SCALE);
        assert_eq!(parse_units("0.01").unwrap(), SCALE / 100);
        assert_eq!(parse_units(".5").unwrap(), SCALE / 2);
        assert_eq!(parse_units("4.").unwrap(), 4 * SCALE);
        assert_eq!(parse_units("0.000000000000000001").unwrap(), 1);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", ".", "-1", "1e18", "1.2.3", "abc", "0.0000000000000000001"] {
            assert!(parse_units(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn formats_without_trailing_zeros() {
        assert_eq!(format_units(10 * SCALE), "10");
        assert_eq!(format_units(SCALE / 100), "0.01");
        assert_eq!(format_units(3 * SCALE + SCALE / 4), "3.25");
        assert_eq!(format_units(0), "0");
    }
}
