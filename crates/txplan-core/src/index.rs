//! Orchard action index: maps every on-chain action up to the anchor height
//! to its leaf position and spend metadata.
//!
//! Leaf positions follow the canonical ordering: block height ascending,
//! transaction order within the block, action order within the transaction.

use std::collections::HashMap;

use log::{debug, info};
use txplan_rpc::{BlockV2, NodeRpc, OrchardActionV2};

use crate::error::{PlanError, Result};
use crate::model::OrchardAction;

/// Hex length of the 52-byte compact ciphertext prefix.
const ENC_CIPHERTEXT_PREFIX_HEX: usize = 104;

#[derive(Clone, Debug)]
pub struct IndexedAction {
    pub action: OrchardAction,
    /// Absolute leaf position of the action's cmx.
    pub position: u32,
}

/// Index over all orchard actions in blocks `0..=anchor_height`.
#[derive(Clone, Debug, Default)]
pub struct OrchardIndex {
    /// cmx leaves in canonical order; feed directly to the witness builder.
    pub cmx_hex: Vec<String>,
    /// "txid:action_index" -> indexed action.
    pub by_outpoint: HashMap<String, IndexedAction>,
}

/// Per-invocation memo of verbose blocks fetched for `action_for`.
pub type BlockCache = HashMap<i64, BlockV2>;

pub fn outpoint_key(txid: &str, action_index: u32) -> String {
    format!("{txid}:{action_index}")
}

/// Scan the chain through `anchor_height` and materialize the action index.
pub fn build_index(rpc: &NodeRpc, anchor_height: u32) -> Result<OrchardIndex> {
    let mut index = OrchardIndex::default();
    let mut position: u64 = 0;

    for height in 0..=i64::from(anchor_height) {
        let hash = rpc.get_block_hash(height)?;
        let block = rpc.get_block_verbose(&hash)?;
        for tx in &block.tx {
            let txid = canonical_hex(&tx.txid);
            for (i, raw) in tx.orchard.actions.iter().enumerate() {
                let action = canonical_action(raw)?;
                if position > u64::from(u32::MAX) {
                    return Err(PlanError::internal("orchard leaf position overflow"));
                }
                index.cmx_hex.push(action.cmx.clone());
                index.by_outpoint.insert(
                    outpoint_key(&txid, i as u32),
                    IndexedAction {
                        action,
                        position: position as u32,
                    },
                );
                position += 1;
            }
        }
        debug!("indexed block {height}: {position} orchard actions so far");
    }

    info!(
        "orchard index built: {} actions through height {anchor_height}",
        index.cmx_hex.len()
    );
    Ok(index)
}

/// Resolve a single action by (height, txid, action_index), memoizing block
/// fetches in `cache` for the lifetime of one plan invocation.
pub fn action_for(
    rpc: &NodeRpc,
    cache: &mut BlockCache,
    height: i64,
    txid: &str,
    action_index: u32,
) -> Result<OrchardAction> {
    if !cache.contains_key(&height) {
        let hash = rpc.get_block_hash(height)?;
        let block = rpc.get_block_verbose(&hash)?;
        cache.insert(height, block);
    }
    let block = &cache[&height];

    let txid = canonical_hex(txid);
    for tx in &block.tx {
        if canonical_hex(&tx.txid) != txid {
            continue;
        }
        let raw = tx
            .orchard
            .actions
            .get(action_index as usize)
            .ok_or_else(|| PlanError::internal("action_index out of range"))?;
        return canonical_action(raw);
    }
    Err(PlanError::not_found(format!(
        "tx {txid} not found in block {height}"
    )))
}

fn canonical_hex(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

fn is_32_byte_hex(s: &str) -> bool {
    s.len() == 64 && hex::decode(s).is_ok()
}

fn canonical_action(raw: &OrchardActionV2) -> Result<OrchardAction> {
    let nullifier = canonical_hex(&raw.nullifier);
    let cmx = canonical_hex(&raw.cmx);
    let ephemeral_key = canonical_hex(&raw.ephemeral_key);
    let mut enc_ciphertext = canonical_hex(&raw.enc_ciphertext);
    if enc_ciphertext.len() >= ENC_CIPHERTEXT_PREFIX_HEX {
        enc_ciphertext.truncate(ENC_CIPHERTEXT_PREFIX_HEX);
    }

    if !is_32_byte_hex(&nullifier) || !is_32_byte_hex(&cmx) || !is_32_byte_hex(&ephemeral_key) {
        return Err(PlanError::internal("invalid orchard action encoding"));
    }
    if enc_ciphertext.len() != ENC_CIPHERTEXT_PREFIX_HEX || hex::decode(&enc_ciphertext).is_err() {
        return Err(PlanError::internal("invalid orchard action encoding"));
    }

    Ok(OrchardAction {
        nullifier,
        cmx,
        ephemeral_key,
        enc_ciphertext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_action(fill: char) -> OrchardActionV2 {
        OrchardActionV2 {
            nullifier: fill.to_string().repeat(64),
            cmx: fill.to_string().repeat(64),
            ephemeral_key: fill.to_string().repeat(64),
            enc_ciphertext: fill.to_string().repeat(1_160),
        }
    }

    #[test]
    fn canonical_action_truncates_ciphertext() {
        let act = canonical_action(&raw_action('a')).unwrap();
        assert_eq!(act.enc_ciphertext.len(), ENC_CIPHERTEXT_PREFIX_HEX);
        assert_eq!(act.cmx.len(), 64);
    }

    #[test]
    fn canonical_action_lowercases() {
        let mut raw = raw_action('b');
        raw.cmx = raw.cmx.to_ascii_uppercase();
        let act = canonical_action(&raw).unwrap();
        assert_eq!(act.cmx, "b".repeat(64));
    }

    #[test]
    fn canonical_action_rejects_bad_encodings() {
        let mut raw = raw_action('c');
        raw.nullifier.truncate(10);
        assert!(canonical_action(&raw).is_err());

        let mut raw = raw_action('c');
        raw.enc_ciphertext.truncate(100);
        assert!(canonical_action(&raw).is_err());

        let mut raw = raw_action('c');
        raw.cmx = "zz".repeat(32);
        assert!(canonical_action(&raw).is_err());
    }
}
