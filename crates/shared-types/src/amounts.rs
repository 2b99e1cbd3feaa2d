//! # Amounts
//!
//! XMR amounts are carried as `u64` atomic units (piconero).

use crate::errors::ParseError;

/// Atomic units per XMR.
pub const ATOMIC_UNITS_PER_XMR: u64 = 1_000_000_000_000;

/// Number of decimal places of one XMR.
pub const XMR_DECIMALS: usize = 12;

/// Parse a decimal XMR string ("0.0004", "1", "12.5") into atomic units.
pub fn parse_xmr(text: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidAmount(text.to_string());
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > XMR_DECIMALS || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut frac_units: u64 = 0;
    if !frac.is_empty() {
        let padded = format!("{:0<width$}", frac, width = XMR_DECIMALS);
        frac_units = padded.parse().map_err(|_| invalid())?;
    }
    whole
        .checked_mul(ATOMIC_UNITS_PER_XMR)
        .and_then(|w| w.checked_add(frac_units))
        .ok_or_else(invalid)
}

/// Format atomic units as a decimal XMR string without trailing zeros.
pub fn format_xmr(atomic: u64) -> String {
    let whole = atomic / ATOMIC_UNITS_PER_XMR;
    let frac = atomic % ATOMIC_UNITS_PER_XMR;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac, width = XMR_DECIMALS);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Whether `actual` lies within `tolerance` (a ratio, e.g. 0.01) of `expected`.
pub fn within_tolerance(expected: u64, actual: u64, tolerance: f64) -> bool {
    if expected == 0 {
        return actual == 0;
    }
    let diff = expected.abs_diff(actual) as f64;
    diff / expected as f64 <= tolerance
}
