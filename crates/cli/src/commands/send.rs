use clap::Args;
use txplan_core::SendConfig;

use super::common::{build_planner, finish, write_err, ConnArgs, OutputArgs, PolicyArgs, WalletArgs};

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
    #[command(flatten)]
    pub wallet: WalletArgs,
    /// Destination unified address
    #[arg(long)]
    pub to: String,
    /// Amount to send in zatoshis
    #[arg(long = "amount-zat")]
    pub amount_zat: String,
    /// Optional memo bytes (hex, <= 512 bytes)
    #[arg(long = "memo-hex")]
    pub memo_hex: Option<String>,
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

pub fn run(args: SendArgs) -> i32 {
    let planner = match build_planner(&args.conn) {
        Ok(p) => p,
        Err(e) => {
            let (code, message) = e.surface();
            return write_err(args.output.json, code, &message);
        }
    };

    let cfg = SendConfig {
        wallet_id: args.wallet.wallet_id,
        coin_type: args.wallet.coin_type,
        account: args.wallet.account,
        to_address: args.to,
        amount_zat: args.amount_zat,
        memo_hex: args.memo_hex,
        change_address: args.change_address,
        min_confirmations: args.policy.minconf,
        expiry_offset: args.policy.expiry_offset,
        fee_multiplier: args.policy.fee_multiplier,
        fee_add_zat: args.policy.fee_add_zat,
        min_change_zat: args.min_change_zat,
        min_note_zat: args.policy.min_note_zat,
    };

    finish(planner.plan_send(cfg), &args.output)
}
