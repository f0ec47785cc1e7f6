//! Wire and in-memory data model for plan construction.

use serde::{Deserialize, Serialize};

/// TxPlan document version emitted by this builder.
pub const PLAN_VERSION: &str = "v0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Withdrawal,
    Sweep,
    Rebalance,
}

/// A spendable orchard note as seen by the selector: just enough identity
/// for a stable total order plus its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentNote {
    pub txid: String,
    pub action_index: u32,
    pub value_zat: u64,
}

/// One on-chain orchard action, canonicalized: lower-case hex, ciphertext
/// truncated to the 52-byte compact prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchardAction {
    pub nullifier: String,
    pub cmx: String,
    pub ephemeral_key: String,
    pub enc_ciphertext: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxOutput {
    pub to_address: String,
    pub amount_zat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo_hex: Option<String>,
}

/// A selected note with everything the offline signer needs to spend it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchardSpendNote {
    /// "txid:action_index"
    pub note_id: String,
    pub action_nullifier: String,
    pub cmx: String,
    pub position: u32,
    /// 32 sibling hashes, level 0 (leaf sibling) first.
    pub path: Vec<String>,
    pub ephemeral_key: String,
    pub enc_ciphertext: String,
}

/// The signed-transaction plan: a deterministic, versioned document an
/// offline signer consumes without contacting a node. Constructed once,
/// never mutated after emission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxPlan {
    pub version: String,
    pub kind: PlanKind,
    pub wallet_id: String,
    pub coin_type: u32,
    pub account: u32,
    pub chain: String,
    pub branch_id: u32,
    pub anchor_height: u32,
    pub anchor: String,
    pub expiry_height: u32,
    pub outputs: Vec<TxOutput>,
    pub change_address: String,
    pub fee_zat: String,
    pub notes: Vec<OrchardSpendNote>,
}
