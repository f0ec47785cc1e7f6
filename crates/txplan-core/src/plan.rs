//! Plan construction: chain preamble, candidate enumeration, selection,
//! witness attachment, TxPlan assembly.
//!
//! The planner is pure apart from its two collaborators: the node RPC and
//! (optionally) the external note indexer. Given identical collaborator
//! responses and the same config, the emitted plan is byte-identical.

use std::collections::HashMap;

use log::{debug, info};
use txplan_rpc::NodeRpc;

use crate::amount::{checked_add_zat, parse_coin_decimal, parse_u64_decimal};
use crate::error::{PlanError, Result};
use crate::fees::{required_fee, FeePolicy};
use crate::index::{self, outpoint_key, BlockCache, OrchardIndex};
use crate::model::{OrchardSpendNote, PlanKind, TxOutput, TxPlan, UnspentNote, PLAN_VERSION};
use crate::scan::{ScanClient, SpendableNote};
use crate::select;
use crate::tree::{self, TREE_DEPTH};

/// Minimum accepted expiry offset: anything closer to the tip risks the
/// transaction expiring before the offline signer can return it.
const MIN_EXPIRY_OFFSET: u32 = 4;

const DEFAULT_EXPIRY_OFFSET: u32 = 40;
const DEFAULT_MAX_SPENDS: usize = 50;

/// Multi-output plan request (withdrawal or rebalance).
#[derive(Clone, Debug)]
pub struct PlanConfig {
    pub wallet_id: String,
    pub coin_type: u32,
    pub account: u32,
    pub kind: PlanKind,
    pub outputs: Vec<TxOutput>,
    pub change_address: String,
    pub min_confirmations: i64,
    pub expiry_offset: u32,
    pub fee_multiplier: u64,
    pub fee_add_zat: u64,
    pub min_change_zat: u64,
    pub min_note_zat: u64,
}

/// Single-output convenience over [`PlanConfig`].
#[derive(Clone, Debug)]
pub struct SendConfig {
    pub wallet_id: String,
    pub coin_type: u32,
    pub account: u32,
    pub to_address: String,
    pub amount_zat: String,
    pub memo_hex: Option<String>,
    pub change_address: String,
    pub min_confirmations: i64,
    pub expiry_offset: u32,
    pub fee_multiplier: u64,
    pub fee_add_zat: u64,
    pub min_change_zat: u64,
    pub min_note_zat: u64,
}

/// Sweep-everything request: one output worth the whole balance minus fee.
#[derive(Clone, Debug)]
pub struct SweepConfig {
    pub wallet_id: String,
    pub coin_type: u32,
    pub account: u32,
    pub to_address: String,
    pub memo_hex: Option<String>,
    /// Defaults to `to_address` when empty.
    pub change_address: String,
    pub min_confirmations: i64,
    pub expiry_offset: u32,
    pub fee_multiplier: u64,
    pub fee_add_zat: u64,
    pub min_note_zat: u64,
}

/// Consolidation request: up to `max_spends` notes into one output.
#[derive(Clone, Debug)]
pub struct ConsolidateConfig {
    pub wallet_id: String,
    pub coin_type: u32,
    pub account: u32,
    pub to_address: String,
    pub memo_hex: Option<String>,
    /// Defaults to `to_address` when empty.
    pub change_address: String,
    pub max_spends: usize,
    pub min_confirmations: i64,
    pub expiry_offset: u32,
    pub fee_multiplier: u64,
    pub fee_add_zat: u64,
    pub min_note_zat: u64,
}

/// Chain facts shared by every plan kind, resolved once per invocation.
struct ChainContext {
    chain: String,
    branch_id: u32,
    tip_height: i64,
    anchor_height: u32,
    coin_type: u32,
    expiry_height: u32,
}

/// Root, anchor height and per-request-position auth paths, from whichever
/// source served the witness.
struct ResolvedWitness {
    root: String,
    anchor_height: u32,
    paths: Vec<Vec<String>>,
}

/// The note/witness capability: either the chain itself (local index plus
/// local tree math) or the external indexer. The plan builder never
/// branches on the source beyond this boundary.
enum NoteSource<'a> {
    Chain {
        index: OrchardIndex,
        notes: Vec<UnspentNote>,
    },
    Scan {
        client: &'a ScanClient,
        notes: Vec<SpendableNote>,
    },
}

pub struct Planner {
    rpc: NodeRpc,
    scan: Option<ScanClient>,
}

impl Planner {
    pub fn new(rpc: NodeRpc) -> Self {
        Self { rpc, scan: None }
    }

    pub fn with_scan(mut self, scan: ScanClient) -> Self {
        self.scan = Some(scan);
        self
    }

    /// Generic multi-output plan.
    pub fn plan(&self, cfg: PlanConfig) -> Result<TxPlan> {
        let mut cfg = cfg;
        cfg.wallet_id = cfg.wallet_id.trim().to_string();
        cfg.change_address = cfg.change_address.trim().to_string();
        if cfg.wallet_id.is_empty() {
            return Err(PlanError::invalid_request("wallet_id required"));
        }
        if cfg.outputs.is_empty() {
            return Err(PlanError::invalid_request("outputs required"));
        }
        if cfg.change_address.is_empty() {
            return Err(PlanError::invalid_request("change_address required"));
        }
        apply_defaults(&mut cfg.min_confirmations, &mut cfg.expiry_offset, &mut cfg.fee_multiplier);

        let total_out = validate_outputs(&mut cfg.outputs)?;

        let ctx = self.chain_context(cfg.coin_type, cfg.expiry_offset)?;
        let source = self.note_source(
            &cfg.wallet_id,
            &ctx,
            cfg.min_confirmations,
            cfg.account,
            cfg.min_note_zat,
        )?;
        let candidates = source.candidates();
        if candidates.is_empty() {
            return Err(PlanError::insufficient_balance("no spendable notes"));
        }

        let policy = FeePolicy {
            multiplier: cfg.fee_multiplier,
            add_zat: cfg.fee_add_zat,
        };
        let (selected, fee_zat) =
            select::select_notes(&candidates, total_out, cfg.outputs.len(), policy)
                .map_err(cascade_failure)?;
        let total_in = sum_values(&selected)?;
        let (fee_zat, suppressed) =
            select::suppress_dust_change(total_in, total_out, fee_zat, cfg.min_change_zat)?;
        if suppressed {
            debug!("dust change folded into fee; fee is now {fee_zat} zat");
        }
        info!(
            "selected {} notes totalling {total_in} zat for {total_out} out + {fee_zat} fee",
            selected.len()
        );

        let (notes, positions) = source.resolve(&self.rpc, &selected)?;
        let wit = source.fetch_witness(&positions, ctx.anchor_height)?;
        let notes = attach_paths(notes, wit.paths);

        Ok(assemble(
            &ctx,
            cfg.kind,
            cfg.wallet_id,
            cfg.account,
            cfg.outputs,
            cfg.change_address,
            fee_zat,
            wit.anchor_height,
            wit.root,
            notes,
        ))
    }

    /// Single-output convenience over [`Planner::plan`].
    pub fn plan_send(&self, cfg: SendConfig) -> Result<TxPlan> {
        self.plan(PlanConfig {
            wallet_id: cfg.wallet_id,
            coin_type: cfg.coin_type,
            account: cfg.account,
            kind: PlanKind::Withdrawal,
            outputs: vec![TxOutput {
                to_address: cfg.to_address,
                amount_zat: cfg.amount_zat,
                memo_hex: cfg.memo_hex,
            }],
            change_address: cfg.change_address,
            min_confirmations: cfg.min_confirmations,
            expiry_offset: cfg.expiry_offset,
            fee_multiplier: cfg.fee_multiplier,
            fee_add_zat: cfg.fee_add_zat,
            min_change_zat: cfg.min_change_zat,
            min_note_zat: cfg.min_note_zat,
        })
    }

    /// Spend every candidate note into a single output.
    pub fn plan_sweep(&self, cfg: SweepConfig) -> Result<TxPlan> {
        let mut cfg = cfg;
        cfg.wallet_id = cfg.wallet_id.trim().to_string();
        cfg.to_address = cfg.to_address.trim().to_string();
        cfg.change_address = cfg.change_address.trim().to_string();
        if cfg.wallet_id.is_empty() {
            return Err(PlanError::invalid_request("wallet_id required"));
        }
        if cfg.to_address.is_empty() {
            return Err(PlanError::invalid_request("to required"));
        }
        if cfg.change_address.is_empty() {
            cfg.change_address = cfg.to_address.clone();
        }
        apply_defaults(&mut cfg.min_confirmations, &mut cfg.expiry_offset, &mut cfg.fee_multiplier);
        let memo_hex = validate_memo(cfg.memo_hex.as_deref(), "memo_hex")?;

        let ctx = self.chain_context(cfg.coin_type, cfg.expiry_offset)?;
        let source = self.note_source(
            &cfg.wallet_id,
            &ctx,
            cfg.min_confirmations,
            cfg.account,
            cfg.min_note_zat,
        )?;
        let candidates = source.candidates();
        if candidates.is_empty() {
            return Err(PlanError::insufficient_balance("no spendable notes"));
        }

        let policy = FeePolicy {
            multiplier: cfg.fee_multiplier,
            add_zat: cfg.fee_add_zat,
        };
        let fee_zat = policy.apply(required_fee(candidates.len(), 1))?;
        let total_in = sum_values(&candidates)?;
        if total_in <= fee_zat {
            return Err(PlanError::insufficient_balance("insufficient funds"));
        }
        let amount = total_in - fee_zat;
        info!(
            "sweeping {} notes totalling {total_in} zat ({fee_zat} fee)",
            candidates.len()
        );

        let (notes, positions) = source.resolve(&self.rpc, &candidates)?;
        let wit = source.fetch_witness(&positions, ctx.anchor_height)?;
        let notes = attach_paths(notes, wit.paths);

        Ok(assemble(
            &ctx,
            PlanKind::Sweep,
            cfg.wallet_id,
            cfg.account,
            vec![TxOutput {
                to_address: cfg.to_address,
                amount_zat: amount.to_string(),
                memo_hex,
            }],
            cfg.change_address,
            fee_zat,
            wit.anchor_height,
            wit.root,
            notes,
        ))
    }

    /// Consolidate many notes into a single output.
    pub fn plan_consolidate(&self, cfg: ConsolidateConfig) -> Result<TxPlan> {
        let mut cfg = cfg;
        cfg.wallet_id = cfg.wallet_id.trim().to_string();
        cfg.to_address = cfg.to_address.trim().to_string();
        cfg.change_address = cfg.change_address.trim().to_string();
        if cfg.wallet_id.is_empty() {
            return Err(PlanError::invalid_request("wallet_id required"));
        }
        if cfg.to_address.is_empty() {
            return Err(PlanError::invalid_request("to required"));
        }
        if cfg.change_address.is_empty() {
            cfg.change_address = cfg.to_address.clone();
        }
        if cfg.max_spends == 0 {
            cfg.max_spends = DEFAULT_MAX_SPENDS;
        }
        apply_defaults(&mut cfg.min_confirmations, &mut cfg.expiry_offset, &mut cfg.fee_multiplier);
        let memo_hex = validate_memo(cfg.memo_hex.as_deref(), "memo_hex")?;

        let ctx = self.chain_context(cfg.coin_type, cfg.expiry_offset)?;
        let source = self.note_source(
            &cfg.wallet_id,
            &ctx,
            cfg.min_confirmations,
            cfg.account,
            cfg.min_note_zat,
        )?;
        let candidates = source.candidates();
        if candidates.len() < 2 {
            return Err(PlanError::invalid_request(
                "not enough spendable notes to consolidate",
            ));
        }

        let policy = FeePolicy {
            multiplier: cfg.fee_multiplier,
            add_zat: cfg.fee_add_zat,
        };
        let (selected, fee_zat) =
            select::select_for_consolidation(&candidates, cfg.max_spends, policy).map_err(|e| {
                match e {
                    PlanError::InsufficientFunds => {
                        PlanError::insufficient_balance("insufficient funds")
                    }
                    other => other,
                }
            })?;
        let total_in = sum_values(&selected)?;
        if total_in <= fee_zat {
            return Err(PlanError::insufficient_balance("insufficient funds"));
        }
        let amount = total_in - fee_zat;
        info!(
            "consolidating {} notes totalling {total_in} zat ({fee_zat} fee)",
            selected.len()
        );

        let (notes, positions) = source.resolve(&self.rpc, &selected)?;
        let wit = source.fetch_witness(&positions, ctx.anchor_height)?;
        let notes = attach_paths(notes, wit.paths);

        Ok(assemble(
            &ctx,
            PlanKind::Rebalance,
            cfg.wallet_id,
            cfg.account,
            vec![TxOutput {
                to_address: cfg.to_address,
                amount_zat: amount.to_string(),
                memo_hex,
            }],
            cfg.change_address,
            fee_zat,
            wit.anchor_height,
            wit.root,
            notes,
        ))
    }

    fn chain_context(&self, coin_type: u32, expiry_offset: u32) -> Result<ChainContext> {
        let info = self.rpc.chain_info()?;
        if info.branch_id == 0 {
            return Err(PlanError::internal("invalid consensus branch id"));
        }

        let coin_type = if coin_type != 0 {
            coin_type
        } else {
            match info.chain.trim().to_ascii_lowercase().as_str() {
                "main" => 8133,
                "test" => 8134,
                "regtest" => 8135,
                _ => return Err(PlanError::invalid_request("unknown chain")),
            }
        };

        if info.height < 0 {
            return Err(PlanError::internal("invalid chain height"));
        }
        if info.height > i64::from(u32::MAX) {
            return Err(PlanError::internal("chain height too large"));
        }
        let anchor_height = info.height as u32;

        if expiry_offset < MIN_EXPIRY_OFFSET {
            return Err(PlanError::invalid_request(format!(
                "expiry_offset must be >= {MIN_EXPIRY_OFFSET}"
            )));
        }
        let expiry_height = anchor_height
            .checked_add(1)
            .and_then(|h| h.checked_add(expiry_offset))
            .ok_or_else(|| PlanError::internal("expiry height overflow"))?;

        Ok(ChainContext {
            chain: info.chain,
            branch_id: info.branch_id,
            tip_height: info.height,
            anchor_height,
            coin_type,
            expiry_height,
        })
    }

    fn note_source(
        &self,
        wallet_id: &str,
        ctx: &ChainContext,
        min_confirmations: i64,
        account: u32,
        min_note_zat: u64,
    ) -> Result<NoteSource<'_>> {
        if let Some(client) = &self.scan {
            let notes =
                client.list_wallet_notes(wallet_id, ctx.tip_height, min_confirmations, min_note_zat)?;
            return Ok(NoteSource::Scan {
                client,
                notes,
            });
        }

        let index = index::build_index(&self.rpc, ctx.anchor_height)?;
        if index.cmx_hex.is_empty() {
            return Err(PlanError::internal("no orchard commitments"));
        }
        let notes = select::filter_min_value(
            self.list_unspent_notes(min_confirmations, account)?,
            min_note_zat,
        );
        Ok(NoteSource::Chain { index, notes })
    }

    fn list_unspent_notes(&self, min_confirmations: i64, account: u32) -> Result<Vec<UnspentNote>> {
        let entries = self.rpc.z_list_unspent(min_confirmations, 9_999_999, true)?;
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            if e.pool.trim().to_ascii_lowercase() != "orchard" {
                continue;
            }
            if !e.spendable {
                continue;
            }
            if e.account.is_some_and(|a| a != account) {
                continue;
            }
            let txid = e.txid.trim().to_ascii_lowercase();
            if txid.is_empty() {
                continue;
            }
            let value_zat = parse_coin_decimal(&e.amount.to_string())?;
            out.push(UnspentNote {
                txid,
                action_index: e.outindex,
                value_zat,
            });
        }
        Ok(out)
    }
}

impl NoteSource<'_> {
    fn candidates(&self) -> Vec<UnspentNote> {
        match self {
            NoteSource::Chain { notes, .. } => notes.clone(),
            NoteSource::Scan { notes, .. } => notes
                .iter()
                .map(|n| UnspentNote {
                    txid: n.txid.clone(),
                    action_index: n.action_index,
                    value_zat: n.value_zat,
                })
                .collect(),
        }
    }

    /// Resolve each selected note to its spend metadata and leaf position,
    /// in selection order. Paths are attached afterwards.
    fn resolve(
        &self,
        rpc: &NodeRpc,
        selected: &[UnspentNote],
    ) -> Result<(Vec<OrchardSpendNote>, Vec<u32>)> {
        let mut notes = Vec::with_capacity(selected.len());
        let mut positions = Vec::with_capacity(selected.len());

        match self {
            NoteSource::Chain { index, .. } => {
                for n in selected {
                    let key = outpoint_key(&n.txid, n.action_index);
                    let entry = index.by_outpoint.get(&key).ok_or_else(|| {
                        PlanError::internal("missing orchard action for selected note")
                    })?;
                    positions.push(entry.position);
                    notes.push(spend_note(key, &entry.action, entry.position));
                }
            }
            NoteSource::Scan { notes: metas, .. } => {
                let by_outpoint: HashMap<String, &SpendableNote> = metas
                    .iter()
                    .map(|m| (outpoint_key(&m.txid, m.action_index), m))
                    .collect();
                let mut cache = BlockCache::new();
                for n in selected {
                    let key = outpoint_key(&n.txid, n.action_index);
                    let meta = by_outpoint.get(&key).ok_or_else(|| {
                        PlanError::internal("missing note metadata from indexer")
                    })?;
                    let action =
                        index::action_for(rpc, &mut cache, meta.height, &n.txid, n.action_index)?;
                    positions.push(meta.position);
                    notes.push(spend_note(key, &action, meta.position));
                }
            }
        }

        Ok((notes, positions))
    }

    /// Fetch the root and an auth path per requested position, in request
    /// order.
    fn fetch_witness(&self, positions: &[u32], anchor_height: u32) -> Result<ResolvedWitness> {
        match self {
            NoteSource::Chain { index, .. } => {
                let wit = tree::witness(&index.cmx_hex, positions)?;
                if wit.paths.len() != positions.len() {
                    return Err(PlanError::internal("witness response mismatch"));
                }
                let mut paths = Vec::with_capacity(positions.len());
                for (path, &requested) in wit.paths.into_iter().zip(positions) {
                    if path.position != requested || path.auth_path.len() != TREE_DEPTH {
                        return Err(PlanError::internal("witness response mismatch"));
                    }
                    paths.push(path.auth_path);
                }
                Ok(ResolvedWitness {
                    root: wit.root,
                    anchor_height,
                    paths,
                })
            }
            NoteSource::Scan { client, .. } => {
                let wit = client.orchard_witness(positions)?;
                if wit.root.trim().is_empty() || wit.paths.len() != positions.len() {
                    return Err(PlanError::internal("invalid witness response"));
                }
                if wit.anchor_height < 0 || wit.anchor_height > i64::from(u32::MAX) {
                    return Err(PlanError::internal("invalid witness anchor_height"));
                }
                // The indexer may reorder paths; re-key by position.
                let by_pos: HashMap<u32, Vec<String>> = wit
                    .paths
                    .into_iter()
                    .map(|p| (p.position, p.auth_path))
                    .collect();
                let mut paths = Vec::with_capacity(positions.len());
                for &pos in positions {
                    let path = by_pos
                        .get(&pos)
                        .filter(|p| p.len() == TREE_DEPTH)
                        .cloned()
                        .ok_or_else(|| PlanError::internal("witness path missing"))?;
                    paths.push(path);
                }
                Ok(ResolvedWitness {
                    root: wit.root,
                    anchor_height: wit.anchor_height as u32,
                    paths,
                })
            }
        }
    }
}

fn spend_note(note_id: String, action: &crate::model::OrchardAction, position: u32) -> OrchardSpendNote {
    OrchardSpendNote {
        note_id,
        action_nullifier: action.nullifier.clone(),
        cmx: action.cmx.clone(),
        position,
        path: Vec::new(),
        ephemeral_key: action.ephemeral_key.clone(),
        enc_ciphertext: action.enc_ciphertext.clone(),
    }
}

fn attach_paths(notes: Vec<OrchardSpendNote>, paths: Vec<Vec<String>>) -> Vec<OrchardSpendNote> {
    notes
        .into_iter()
        .zip(paths)
        .map(|(mut note, path)| {
            note.path = path;
            note
        })
        .collect()
}

fn apply_defaults(min_confirmations: &mut i64, expiry_offset: &mut u32, fee_multiplier: &mut u64) {
    if *min_confirmations <= 0 {
        *min_confirmations = 1;
    }
    if *expiry_offset == 0 {
        *expiry_offset = DEFAULT_EXPIRY_OFFSET;
    }
    if *fee_multiplier == 0 {
        *fee_multiplier = 1;
    }
}

/// Trim and validate every output in place; returns the checked total.
fn validate_outputs(outputs: &mut [TxOutput]) -> Result<u64> {
    let mut total_out = 0u64;
    for (i, out) in outputs.iter_mut().enumerate() {
        out.to_address = out.to_address.trim().to_string();
        out.amount_zat = out.amount_zat.trim().to_string();
        if out.to_address.is_empty() {
            return Err(PlanError::invalid_request(format!(
                "outputs[{i}].to_address required"
            )));
        }
        if out.amount_zat.is_empty() {
            return Err(PlanError::invalid_request(format!(
                "outputs[{i}].amount_zat required"
            )));
        }
        let amount = parse_u64_decimal(&out.amount_zat)
            .ok()
            .filter(|&a| a > 0)
            .ok_or_else(|| {
                PlanError::invalid_request(format!("outputs[{i}].amount_zat invalid"))
            })?;
        out.memo_hex = validate_memo(out.memo_hex.as_deref(), &format!("outputs[{i}].memo_hex"))?;
        total_out = checked_add_zat(total_out, amount)
            .map_err(|_| PlanError::invalid_request("outputs sum overflow"))?;
    }
    Ok(total_out)
}

fn validate_memo(memo_hex: Option<&str>, label: &str) -> Result<Option<String>> {
    let Some(m) = memo_hex.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(None);
    };
    let bytes = hex::decode(m)
        .map_err(|_| PlanError::invalid_request(format!("{label} invalid")))?;
    if bytes.len() > 512 {
        return Err(PlanError::invalid_request(format!("{label} too long")));
    }
    Ok(Some(m.to_string()))
}

fn sum_values(notes: &[UnspentNote]) -> Result<u64> {
    let mut total = 0u64;
    for n in notes {
        total = checked_add_zat(total, n.value_zat)?;
    }
    Ok(total)
}

/// Cascade selection failures surface as a balance problem regardless of the
/// internal cause; only explicitly coded errors pass through untouched.
fn cascade_failure(e: PlanError) -> PlanError {
    match e {
        PlanError::Coded { .. } => e,
        _ => PlanError::insufficient_balance("insufficient funds"),
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    ctx: &ChainContext,
    kind: PlanKind,
    wallet_id: String,
    account: u32,
    outputs: Vec<TxOutput>,
    change_address: String,
    fee_zat: u64,
    anchor_height: u32,
    anchor: String,
    notes: Vec<OrchardSpendNote>,
) -> TxPlan {
    TxPlan {
        version: PLAN_VERSION.to_string(),
        kind,
        wallet_id,
        coin_type: ctx.coin_type,
        account,
        chain: ctx.chain.clone(),
        branch_id: ctx.branch_id,
        anchor_height,
        anchor,
        expiry_height: ctx.expiry_height,
        outputs,
        change_address,
        fee_zat: fee_zat.to_string(),
        notes,
    }
}
