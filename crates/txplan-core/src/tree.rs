//! Orchard note commitment tree: root and authentication paths over the
//! chain's full leaf sequence.
//!
//! The tree is fixed-depth (32), filled left to right; a missing right
//! sibling at level l is the empty-subtree root for that level. Node
//! hashing is the protocol's Merkle-CRH, taken from `MerkleHashOrchard`.
//! All needed internal nodes are materialized in one bottom-up pass, so
//! witnessing P positions over N leaves costs O(N) hashing plus O(P * 32)
//! lookups.

use incrementalmerkletree::{Hashable, Level};
use orchard::tree::MerkleHashOrchard;
use thiserror::Error;

/// Depth of the orchard note commitment tree.
pub const TREE_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("bad leaf at position {0}")]
    BadLeaf(usize),
    #[error("position {0} out of range")]
    PositionOutOfRange(u32),
    #[error("empty tree")]
    EmptyTree,
}

#[derive(Clone, Debug)]
pub struct WitnessPath {
    pub position: u32,
    /// 32 hex-encoded siblings, level 0 first.
    pub auth_path: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Witness {
    /// Hex-encoded tree root (the anchor).
    pub root: String,
    /// Paths in the order the positions were requested.
    pub paths: Vec<WitnessPath>,
}

/// Compute the root and authentication paths for `positions` over the full
/// ordered leaf sequence `leaves_hex` (cmx values in block order).
pub fn witness(leaves_hex: &[String], positions: &[u32]) -> Result<Witness, TreeError> {
    if leaves_hex.is_empty() {
        return Err(TreeError::EmptyTree);
    }

    let mut leaves = Vec::with_capacity(leaves_hex.len());
    for (i, leaf) in leaves_hex.iter().enumerate() {
        leaves.push(parse_node(leaf).ok_or(TreeError::BadLeaf(i))?);
    }
    for &pos in positions {
        if pos as usize >= leaves.len() {
            return Err(TreeError::PositionOutOfRange(pos));
        }
    }

    let levels = build_levels(leaves);
    let root = levels[TREE_DEPTH][0];

    let paths = positions
        .iter()
        .map(|&pos| {
            let mut auth_path = Vec::with_capacity(TREE_DEPTH);
            let mut idx = pos as usize;
            for level in 0..TREE_DEPTH {
                let sibling = levels[level]
                    .get(idx ^ 1)
                    .copied()
                    .unwrap_or_else(|| MerkleHashOrchard::empty_root(Level::from(level as u8)));
                auth_path.push(hex::encode(sibling.to_bytes()));
                idx >>= 1;
            }
            WitnessPath {
                position: pos,
                auth_path,
            }
        })
        .collect();

    Ok(Witness {
        root: hex::encode(root.to_bytes()),
        paths,
    })
}

fn parse_node(hex_str: &str) -> Option<MerkleHashOrchard> {
    let bytes = hex::decode(hex_str.trim()).ok()?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Option::from(MerkleHashOrchard::from_bytes(&arr))
}

/// Materialize every populated node, level by level. `levels[0]` is the leaf
/// row; `levels[32]` holds the single root.
fn build_levels(leaves: Vec<MerkleHashOrchard>) -> Vec<Vec<MerkleHashOrchard>> {
    let mut levels = Vec::with_capacity(TREE_DEPTH + 1);
    levels.push(leaves);

    for level in 0..TREE_DEPTH {
        let current = &levels[level];
        let empty = MerkleHashOrchard::empty_root(Level::from(level as u8));
        let mut next = Vec::with_capacity((current.len() + 1) / 2);
        for pair in current.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { empty };
            next.push(MerkleHashOrchard::combine(
                Level::from(level as u8),
                &left,
                &right,
            ));
        }
        levels.push(next);
    }

    levels
}
