//! Fixed-precision money: decimal strings in and out, u64 base units
//! (zatoshis) everywhere else. All arithmetic on amounts is checked.

use crate::error::{PlanError, Result};

/// Base units per display coin (8 decimal places).
pub const COIN: u64 = 100_000_000;

/// Parse a plain decimal u64 (zatoshi amounts on the wire).
pub fn parse_u64_decimal(s: &str) -> Result<u64> {
    let t = s.trim();
    if t.is_empty() {
        return Err(PlanError::internal("empty amount"));
    }
    t.parse::<u64>()
        .map_err(|_| PlanError::internal(format!("invalid decimal {t:?}")))
}

/// Parse a display-unit decimal ("0.24985000") into zatoshis.
///
/// Accepts at most one '.', at most 8 fractional digits (padded to 8),
/// rejects negatives, and fails with overflow when the whole part does not
/// fit alongside the scale factor.
pub fn parse_coin_decimal(s: &str) -> Result<u64> {
    let t = s.trim();
    if t.is_empty() {
        return Err(PlanError::internal("empty amount"));
    }
    if t.starts_with('-') {
        return Err(PlanError::internal("negative amount"));
    }

    let (whole, frac) = match t.split_once('.') {
        Some((w, f)) => (w, f),
        None => (t, ""),
    };
    let whole = if whole.is_empty() { "0" } else { whole };
    if frac.len() > 8 {
        return Err(PlanError::internal("too many decimal places"));
    }

    let w = whole
        .parse::<u64>()
        .map_err(|_| PlanError::internal(format!("invalid decimal {t:?}")))?;
    let mut padded = String::with_capacity(8);
    padded.push_str(frac);
    while padded.len() < 8 {
        padded.push('0');
    }
    let f = padded
        .parse::<u64>()
        .map_err(|_| PlanError::internal(format!("invalid decimal {t:?}")))?;

    w.checked_mul(COIN)
        .and_then(|v| v.checked_add(f))
        .ok_or(PlanError::Overflow)
}

pub fn checked_add_zat(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(PlanError::Overflow)
}

pub fn checked_mul_zat(a: u64, b: u64) -> Result<u64> {
    a.checked_mul(b).ok_or(PlanError::Overflow)
}
