//! Conventional-fee schedule and the operator fee policy applied on top.

use crate::amount::{checked_add_zat, checked_mul_zat};
use crate::error::Result;

/// Marginal fee per logical action, in zatoshis.
const MARGINAL_FEE_ZAT: u64 = 5_000;

/// Minimum conventional fee for an orchard send with the given spend and
/// output counts. The bundle is padded to at least 2 actions, so the fee
/// floor reflects what will actually be broadcast.
pub fn required_fee(spend_count: usize, output_count: usize) -> u64 {
    let actions = spend_count.max(output_count).max(2);
    MARGINAL_FEE_ZAT * actions as u64
}

/// Operator adjustment on top of the conventional fee:
/// `fee = base * max(multiplier, 1) + add_zat`, checked.
#[derive(Clone, Copy, Debug, Default)]
pub struct FeePolicy {
    pub multiplier: u64,
    pub add_zat: u64,
}

impl FeePolicy {
    pub fn apply(&self, base: u64) -> Result<u64> {
        let mult = self.multiplier.max(1);
        let v = checked_mul_zat(base, mult)?;
        checked_add_zat(v, self.add_zat)
    }
}
