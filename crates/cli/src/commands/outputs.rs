//! Multi-output plans driven by an outputs file (send-many, rebalance).

use std::fs::File;
use std::io::Read;

use clap::Args;
use txplan_core::{ErrorCode, PlanConfig, PlanKind, TxOutput};

use super::common::{build_planner, finish, write_err, ConnArgs, OutputArgs, PolicyArgs, WalletArgs};

#[derive(Args, Debug)]
pub struct OutputsArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    #[command(flatten)]
    pub wallet: WalletArgs,
    /// Path to a JSON array of outputs ('-' for stdin)
    #[arg(long = "outputs-file")]
    pub outputs_file: String,
    /// Change unified address
    #[arg(long = "change-address")]
    pub change_address: String,
    /// If change is in (0, min-change-zat), add it to fee and omit the
    /// change output
    #[arg(long = "min-change-zat", default_value_t = 0)]
    pub min_change_zat: u64,
    #[command(flatten)]
    pub policy: PolicyArgs,
    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn run(args: OutputsArgs, kind: PlanKind) -> i32 {
    let outputs = match load_outputs(args.outputs_file.trim()) {
        Ok(outs) => outs,
        Err(message) => return write_err(args.output.json, ErrorCode::InvalidRequest, &message),
    };

    let planner = match build_planner(&args.conn) {
        Ok(p) => p,
        Err(e) => {
            let (code, message) = e.surface();
            return write_err(args.output.json, code, &message);
        }
    };

    let cfg = PlanConfig {
        wallet_id: args.wallet.wallet_id,
        coin_type: args.wallet.coin_type,
        account: args.wallet.account,
        kind,
        outputs,
        change_address: args.change_address,
        min_confirmations: args.policy.minconf,
        expiry_offset: args.policy.expiry_offset,
        fee_multiplier: args.policy.fee_multiplier,
        fee_add_zat: args.policy.fee_add_zat,
        min_change_zat: args.min_change_zat,
        min_note_zat: args.policy.min_note_zat,
    };

    finish(planner.plan(cfg), &args.output)
}

fn load_outputs(path: &str) -> Result<Vec<TxOutput>, String> {
    if path.is_empty() {
        return Err("outputs-file is required".into());
    }

    let mut raw = String::new();
    if path == "-" {
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| format!("read stdin: {e}"))?;
    } else {
        File::open(path)
            .and_then(|mut f| f.read_to_string(&mut raw))
            .map_err(|e| format!("open outputs file: {e}"))?;
    }

    serde_json::from_str(&raw).map_err(|_| "invalid outputs json".to_string())
}
