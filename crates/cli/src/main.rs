mod commands;

use clap::{Parser, Subcommand};
use txplan_core::PlanKind;

#[derive(Parser)]
#[command(name = "txplan", about = "Online TxPlan v0 builder for offline signing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a single-output withdrawal.
    Send(commands::send::SendArgs),
    /// Plan a multi-output withdrawal from an outputs file.
    SendMany(commands::outputs::OutputsArgs),
    /// Sweep every spendable note into one output.
    Sweep(commands::sweep::SweepArgs),
    /// Consolidate small notes into one output.
    Consolidate(commands::consolidate::ConsolidateArgs),
    /// Plan a multi-output rebalance from an outputs file.
    Rebalance(commands::outputs::OutputsArgs),
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Send(args) => commands::send::run(args),
        Commands::SendMany(args) => commands::outputs::run(args, PlanKind::Withdrawal),
        Commands::Sweep(args) => commands::sweep::run(args),
        Commands::Consolidate(args) => commands::consolidate::run(args),
        Commands::Rebalance(args) => commands::outputs::run(args, PlanKind::Rebalance),
    };
    std::process::exit(code);
}
