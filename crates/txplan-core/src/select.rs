// SPDX-License-Identifier: Apache-2.0
//! Note selection under the step-function fee schedule.
//!
//! The fee depends on `max(spends, outputs, 2)`, and adding a change output
//! can bump it a step. Exhaustive subset selection is exponential, so the
//! selector runs a cascade that captures the common shapes exactly and
//! falls back to a deterministic greedy floor:
//!
//! 1. one note matching `amount + fee` exactly (no change output)
//! 2. one note covering `amount + fee` assuming a change output
//! 3. two notes matching exactly (no change), two-pointer scan
//! 4. two notes covering with change, minimum-sum binary search
//! 5. greedy largest-first, checking both the exact no-change total and the
//!    covering with-change total at every step

use crate::amount::checked_add_zat;
use crate::error::{PlanError, Result};
use crate::fees::{required_fee, FeePolicy};
use crate::model::UnspentNote;

/// Drop candidates below `min_note_zat`. A zero threshold keeps everything.
pub fn filter_min_value(notes: Vec<UnspentNote>, min_note_zat: u64) -> Vec<UnspentNote> {
    if min_note_zat == 0 {
        return notes;
    }
    notes
        .into_iter()
        .filter(|n| n.value_zat >= min_note_zat)
        .collect()
}

fn sort_asc(notes: &mut [UnspentNote]) {
    notes.sort_by(|a, b| {
        (a.value_zat, &a.txid, a.action_index).cmp(&(b.value_zat, &b.txid, b.action_index))
    });
}

fn sort_desc(notes: &mut [UnspentNote]) {
    notes.sort_by(|a, b| {
        b.value_zat
            .cmp(&a.value_zat)
            .then_with(|| (&a.txid, a.action_index).cmp(&(&b.txid, b.action_index)))
    });
}

/// Select notes covering `amount_zat` plus the policy fee for the resulting
/// spend/output shape. Returns the selection and the fee it was priced at.
pub fn select_notes(
    notes: &[UnspentNote],
    amount_zat: u64,
    output_count: usize,
    policy: FeePolicy,
) -> Result<(Vec<UnspentNote>, u64)> {
    if notes.is_empty() {
        return Err(PlanError::InsufficientFunds);
    }

    // (needed total, fee) for a given spend count and output count.
    let needed_total = |spend_count: usize, outputs: usize| -> Result<(u64, u64)> {
        let fee = policy.apply(required_fee(spend_count, outputs))?;
        Ok((checked_add_zat(amount_zat, fee)?, fee))
    };

    let mut asc = notes.to_vec();
    sort_asc(&mut asc);

    // 1-note exact match with no change output.
    let (need, fee) = needed_total(1, output_count)?;
    if let Some(n) = asc.iter().find(|n| n.value_zat == need) {
        return Ok((vec![n.clone()], fee));
    }

    // 1-note best fit (assumes a change output; if change ends up zero this
    // overpays one fee step but remains valid).
    let (need, fee) = needed_total(1, output_count + 1)?;
    if let Some(n) = asc.iter().find(|n| n.value_zat >= need) {
        return Ok((vec![n.clone()], fee));
    }

    // 2-note exact match with no change output.
    if asc.len() >= 2 {
        let (need, fee) = needed_total(2, output_count)?;
        let (mut i, mut j) = (0usize, asc.len() - 1);
        while i < j {
            let sum = checked_add_zat(asc[i].value_zat, asc[j].value_zat)?;
            if sum == need {
                return Ok((vec![asc[i].clone(), asc[j].clone()], fee));
            } else if sum < need {
                i += 1;
            } else {
                j -= 1;
            }
        }
    }

    // 2-note best fit: smallest covering sum, ties broken by lower i then j.
    if asc.len() >= 2 {
        let (need, fee) = needed_total(2, output_count + 1)?;
        let mut best: Option<(u64, usize, usize)> = None;
        for i in 0..asc.len() - 1 {
            let a = asc[i].value_zat;
            if a >= need {
                break;
            }
            let b_need = need - a;
            let offset = asc[i + 1..].partition_point(|n| n.value_zat < b_need);
            let j = i + 1 + offset;
            if j >= asc.len() {
                continue;
            }
            let sum = checked_add_zat(a, asc[j].value_zat)?;
            if best.map_or(true, |(best_sum, _, _)| sum < best_sum) {
                best = Some((sum, i, j));
            }
        }
        if let Some((_, i, j)) = best {
            return Ok((vec![asc[i].clone(), asc[j].clone()], fee));
        }
    }

    // Greedy fallback (largest-first), fee recomputed at each step.
    let mut desc = notes.to_vec();
    sort_desc(&mut desc);

    let mut selected = Vec::new();
    let mut total = 0u64;
    for n in desc {
        total = checked_add_zat(total, n.value_zat)?;
        selected.push(n);

        let (need_no_change, fee_no_change) = needed_total(selected.len(), output_count)?;
        if total == need_no_change {
            return Ok((selected, fee_no_change));
        }

        let (need_with_change, fee_with_change) = needed_total(selected.len(), output_count + 1)?;
        if total >= need_with_change {
            return Ok((selected, fee_with_change));
        }
    }
    Err(PlanError::InsufficientFunds)
}

/// Convert sub-threshold change into fee.
///
/// When `min_change_zat > 0` and the residual change lands in
/// `(0, min_change_zat)`, the change is folded into the fee so the change
/// output is omitted entirely. Returns the (possibly raised) fee and whether
/// suppression happened.
pub fn suppress_dust_change(
    total_in: u64,
    total_out: u64,
    fee_zat: u64,
    min_change_zat: u64,
) -> Result<(u64, bool)> {
    if min_change_zat == 0 {
        return Ok((fee_zat, false));
    }
    if total_in < total_out {
        return Err(PlanError::InvalidTotals);
    }
    let rem = total_in - total_out;
    if rem < fee_zat {
        return Err(PlanError::InvalidTotals);
    }
    let change = rem - fee_zat;
    if change == 0 || change >= min_change_zat {
        return Ok((fee_zat, false));
    }
    Ok((checked_add_zat(fee_zat, change)?, true))
}

/// Pick up to `max_spends` notes for consolidation into a single output.
///
/// Larger spend counts are preferred (more consolidation); within a count k
/// the partition taking t smallest and k-t largest notes is scanned from
/// t = k downward, so dust gets swept first. A (k, t) wins as soon as its
/// total strictly exceeds the fee for k spends and one output.
pub fn select_for_consolidation(
    notes: &[UnspentNote],
    max_spends: usize,
    policy: FeePolicy,
) -> Result<(Vec<UnspentNote>, u64)> {
    let mut cap = if max_spends == 0 { 50 } else { max_spends };
    cap = cap.min(notes.len());
    if cap < 2 {
        return Err(PlanError::invalid_request("max_spends must be >= 2"));
    }

    let mut asc = notes.to_vec();
    sort_asc(&mut asc);

    let mut prefix = vec![0u64; asc.len() + 1];
    for i in 0..asc.len() {
        prefix[i + 1] = checked_add_zat(prefix[i], asc[i].value_zat)?;
    }
    let mut suffix = vec![0u64; asc.len() + 1];
    for i in 0..asc.len() {
        suffix[i + 1] = checked_add_zat(suffix[i], asc[asc.len() - 1 - i].value_zat)?;
    }

    for k in (2..=cap).rev() {
        let fee = policy.apply(required_fee(k, 1))?;
        let mut hit = None;
        for t in (0..=k).rev() {
            let total = checked_add_zat(prefix[t], suffix[k - t])?;
            if total > fee {
                hit = Some(t);
                break;
            }
        }
        let Some(t) = hit else { continue };

        let mut selected = Vec::with_capacity(k);
        selected.extend_from_slice(&asc[..t]);
        if k - t > 0 {
            selected.extend_from_slice(&asc[asc.len() - (k - t)..]);
        }
        return Ok((selected, fee));
    }

    Err(PlanError::InsufficientFunds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(txid: &str, idx: u32, value: u64) -> UnspentNote {
        UnspentNote {
            txid: txid.to_string(),
            action_index: idx,
            value_zat: value,
        }
    }

    #[test]
    fn fee_step_from_spend_count_pulls_in_second_note() {
        // One 60k note cannot cover 60k + fee; two spends keep the fee at
        // 10000 (two actions) and both notes are needed.
        let notes = vec![note("b", 0, 60_000), note("a", 0, 60_000)];
        let (selected, fee) = select_notes(&notes, 60_000, 1, FeePolicy::default()).unwrap();
        assert_eq!(fee, 10_000);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn one_note_best_fit_avoids_second_spend() {
        // No exact hit, but 70000 covers the with-change need
        // 50000 + fee(1 spend, 3 outputs) = 65000; one spend suffices.
        let notes = vec![note("a", 0, 70_000), note("b", 0, 1_000)];
        let (selected, fee) = select_notes(&notes, 50_000, 2, FeePolicy::default()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value_zat, 70_000);
        assert_eq!(fee, 15_000); // 1 spend, 3 outputs with change
    }

    #[test]
    fn single_note_exact_no_change() {
        // 70000 == 60000 + fee(1, 2) = 60000 + 10000: exact, no change.
        let notes = vec![note("a", 0, 70_000), note("b", 0, 1_000)];
        let (selected, fee) = select_notes(&notes, 60_000, 2, FeePolicy::default()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].value_zat, 70_000);
        assert_eq!(fee, 10_000);
    }

    #[test]
    fn multi_output_drives_fee() {
        let notes = vec![
            note("a", 0, 25_000),
            note("b", 0, 25_000),
            note("c", 0, 25_000),
        ];
        let (selected, fee) = select_notes(&notes, 60_000, 2, FeePolicy::default()).unwrap();
        assert_eq!(selected.len(), 3);
        assert_eq!(fee, 15_000); // 3 actions
    }

    #[test]
    fn multiplier_scales_fee() {
        let notes = vec![note("a", 0, 75_000), note("b", 0, 10_000)];
        let policy = FeePolicy {
            multiplier: 2,
            add_zat: 0,
        };
        let (selected, fee) = select_notes(&notes, 60_000, 1, policy).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(fee, 20_000);
    }

    #[test]
    fn two_note_exact_prefers_no_change() {
        // 30000 + 40000 == 60000 + fee(2, 1 out) exactly; no 1-note covers.
        let notes = vec![
            note("a", 0, 30_000),
            note("b", 0, 40_000),
            note("c", 0, 45_000),
        ];
        let (selected, fee) = select_notes(&notes, 60_000, 1, FeePolicy::default()).unwrap();
        assert_eq!(fee, 10_000);
        let mut values: Vec<u64> = selected.iter().map(|n| n.value_zat).collect();
        values.sort_unstable();
        assert_eq!(values, vec![30_000, 40_000]);
    }

    #[test]
    fn two_note_best_fit_takes_minimum_covering_sum() {
        let notes = vec![
            note("a", 0, 40_000),
            note("b", 0, 41_000),
            note("c", 0, 90_000),
        ];
        // need(2 spends, 2 outs) = 100000 + 10000; best pair is 40k + 90k?
        // 40k+41k = 81k < 110k; 40k+90k = 130k; 41k+90k = 131k.
        let (selected, fee) = select_notes(&notes, 100_000, 1, FeePolicy::default()).unwrap();
        assert_eq!(fee, 10_000);
        let mut values: Vec<u64> = selected.iter().map(|n| n.value_zat).collect();
        values.sort_unstable();
        assert_eq!(values, vec![40_000, 90_000]);
    }

    #[test]
    fn ties_break_by_txid_then_action_index() {
        let notes = vec![
            note("bb", 1, 70_000),
            note("bb", 0, 70_000),
            note("aa", 3, 70_000),
        ];
        let (selected, _) = select_notes(&notes, 50_000, 1, FeePolicy::default()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].txid, "aa");
        assert_eq!(selected[0].action_index, 3);
    }

    #[test]
    fn insufficient_funds_when_nothing_covers() {
        let notes = vec![note("a", 0, 1_000)];
        let err = select_notes(&notes, 60_000, 1, FeePolicy::default()).unwrap_err();
        assert!(matches!(err, PlanError::InsufficientFunds));
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        let (fee, suppressed) = suppress_dust_change(100_001, 90_000, 10_000, 5_000).unwrap();
        assert!(suppressed);
        assert_eq!(fee, 10_001);
    }

    #[test]
    fn dust_suppression_no_ops() {
        // Disabled.
        assert_eq!(
            suppress_dust_change(100_001, 90_000, 10_000, 0).unwrap(),
            (10_000, false)
        );
        // Change exactly zero.
        assert_eq!(
            suppress_dust_change(100_000, 90_000, 10_000, 5_000).unwrap(),
            (10_000, false)
        );
        // Change at or above the threshold.
        assert_eq!(
            suppress_dust_change(105_000, 90_000, 10_000, 5_000).unwrap(),
            (10_000, false)
        );
    }

    #[test]
    fn dust_suppression_rejects_bad_totals() {
        assert!(matches!(
            suppress_dust_change(80_000, 90_000, 10_000, 5_000),
            Err(PlanError::InvalidTotals)
        ));
        assert!(matches!(
            suppress_dust_change(95_000, 90_000, 10_000, 5_000),
            Err(PlanError::InvalidTotals)
        ));
    }

    #[test]
    fn consolidation_prefers_more_spends_and_sweeps_dust() {
        let notes = vec![
            note("a", 0, 4_000),
            note("b", 0, 5_000),
            note("c", 0, 6_000),
            note("d", 0, 50_000),
        ];
        // k = 4: fee = 20000, total 65000 > fee at t = 4? prefix[4] needs 4
        // smallest = all = 65000 > 20000 -> all four, t = 4.
        let (selected, fee) = select_for_consolidation(&notes, 50, FeePolicy::default()).unwrap();
        assert_eq!(fee, 20_000);
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn consolidation_takes_largest_viable_k() {
        // The small notes alone cannot clear any fee; the 100k note carries
        // the partition, and the largest k still wins.
        let notes = vec![
            note("a", 0, 2_000),
            note("b", 0, 3_000),
            note("c", 0, 4_000),
            note("d", 0, 100_000),
        ];
        let (selected, fee) = select_for_consolidation(&notes, 4, FeePolicy::default()).unwrap();
        assert_eq!(fee, 20_000);
        assert_eq!(selected.len(), 4);
        let total: u64 = selected.iter().map(|n| n.value_zat).sum();
        assert!(total > fee);
    }

    #[test]
    fn consolidation_insufficient_when_fee_dominates() {
        let notes = vec![note("a", 0, 1_000), note("b", 0, 2_000)];
        let err = select_for_consolidation(&notes, 50, FeePolicy::default()).unwrap_err();
        assert!(matches!(err, PlanError::InsufficientFunds));
    }

    #[test]
    fn consolidation_needs_two_notes() {
        let notes = vec![note("a", 0, 1_000_000)];
        let err = select_for_consolidation(&notes, 50, FeePolicy::default()).unwrap_err();
        let (code, _) = err.surface();
        assert_eq!(code, crate::error::ErrorCode::InvalidRequest);
    }

    #[test]
    fn min_value_filter() {
        let notes = vec![note("a", 0, 10), note("b", 0, 20)];
        assert_eq!(filter_min_value(notes.clone(), 0).len(), 2);
        let kept = filter_min_value(notes, 15);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].txid, "b");
    }
}
