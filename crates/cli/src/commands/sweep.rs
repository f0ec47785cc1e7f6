use clap::Args;
use txplan_core::SweepConfig;

use super::common::{build_planner, finish, write_err, ConnArgs, OutputArgs, PolicyArgs, WalletArgs};

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    #[command(flatten)]
    pub wallet: WalletArgs,
    /// Destination unified address
    #[arg(long)]
    pub to: String,
    /// Optional memo bytes (hex, <= 512 bytes)
    #[arg(long = "memo-hex")]
    pub memo_hex: Option<String>,
    /// Change unified address (defaults to --to)
    #[arg(long = "change-address", default_value = "")]
    pub change_address: String,
    #[command(flatten)]
    pub policy: PolicyArgs,
    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn run(args: SweepArgs) -> i32 {
    let planner = match build_planner(&args.conn) {
        Ok(p) => p,
        Err(e) => {
            let (code, message) = e.surface();
            return write_err(args.output.json, code, &message);
        }
    };

    let cfg = SweepConfig {
        wallet_id: args.wallet.wallet_id,
        coin_type: args.wallet.coin_type,
        account: args.wallet.account,
        to_address: args.to,
        memo_hex: args.memo_hex,
        change_address: args.change_address,
        min_confirmations: args.policy.minconf,
        expiry_offset: args.policy.expiry_offset,
        fee_multiplier: args.policy.fee_multiplier,
        fee_add_zat: args.policy.fee_add_zat,
        min_note_zat: args.policy.min_note_zat,
    };

    finish(planner.plan_sweep(cfg), &args.output)
}
