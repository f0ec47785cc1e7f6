//! Shared flag groups, env fallbacks and plan/error emission.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use txplan_core::error::Result;
use txplan_core::{ErrorCode, PlanError, Planner, ScanClient, TxPlan};
use txplan_rpc::NodeRpc;

const JSON_VERSION: &str = "v1";

#[derive(Args, Debug)]
pub struct ConnArgs {
    /// Node RPC URL (or TXPLAN_RPC_URL)
    #[arg(long = "rpc-url")]
    pub rpc_url: Option<String>,
    /// Node RPC username (or TXPLAN_RPC_USER)
    #[arg(long = "rpc-user")]
    pub rpc_user: Option<String>,
    /// Node RPC password (or TXPLAN_RPC_PASS)
    #[arg(long = "rpc-pass")]
    pub rpc_pass: Option<String>,
    /// Optional note-indexer base URL (or TXPLAN_SCAN_URL)
    #[arg(long = "scan-url")]
    pub scan_url: Option<String>,
    /// Optional bearer token for the indexer (or TXPLAN_SCAN_BEARER_TOKEN)
    #[arg(long = "scan-bearer-token")]
    pub scan_bearer_token: Option<String>,
}

#[derive(Args, Debug)]
pub struct WalletArgs {
    /// Wallet id
    #[arg(long = "wallet-id")]
    pub wallet_id: String,
    /// ZIP-32 coin type (0 = derive from chain)
    #[arg(long = "coin-type", default_value_t = 0)]
    pub coin_type: u32,
    /// Unified account id
    #[arg(long, default_value_t = 0)]
    pub account: u32,
}

#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Multiplies the conventional fee (>= 1)
    #[arg(long = "fee-multiplier", default_value_t = 1)]
    pub fee_multiplier: u64,
    /// Adds zatoshis on top of the conventional fee
    #[arg(long = "fee-add-zat", default_value_t = 0)]
    pub fee_add_zat: u64,
    /// Skip spendable notes with value below this
    #[arg(long = "min-note-zat", default_value_t = 0)]
    pub min_note_zat: u64,
    /// Minimum confirmations for spendable notes
    #[arg(long = "minconf", default_value_t = 1)]
    pub minconf: i64,
    /// Expiry height offset from the next block (min 4)
    #[arg(long = "expiry-offset", default_value_t = 40)]
    pub expiry_offset: u32,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Write the TxPlan JSON to this path (owner read/write only)
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Machine-readable envelope on stdout
    #[arg(long)]
    pub json: bool,
}

fn env_fallback(value: &Option<String>, key: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| std::env::var(key).unwrap_or_default().trim().to_string())
}

pub fn build_planner(conn: &ConnArgs) -> Result<Planner> {
    let rpc_url = env_fallback(&conn.rpc_url, "TXPLAN_RPC_URL");
    if rpc_url.is_empty() {
        return Err(PlanError::invalid_request(
            "rpc-url is required (or set TXPLAN_RPC_URL)",
        ));
    }
    let rpc_user = env_fallback(&conn.rpc_user, "TXPLAN_RPC_USER");
    let rpc_pass = env_fallback(&conn.rpc_pass, "TXPLAN_RPC_PASS");
    let auth = (!rpc_user.is_empty() || !rpc_pass.is_empty()).then(|| (rpc_user, rpc_pass));
    let rpc = NodeRpc::new(&rpc_url, auth)?;

    let mut planner = Planner::new(rpc);
    let scan_url = env_fallback(&conn.scan_url, "TXPLAN_SCAN_URL");
    if !scan_url.is_empty() {
        let token = env_fallback(&conn.scan_bearer_token, "TXPLAN_SCAN_BEARER_TOKEN");
        let bearer = (!token.is_empty()).then_some(token.as_str());
        planner = planner.with_scan(ScanClient::new(&scan_url, bearer)?);
    }
    Ok(planner)
}

/// Emit the plan or the coded error and return the process exit code.
pub fn finish(result: Result<TxPlan>, out: &OutputArgs) -> i32 {
    match result {
        Ok(plan) => write_plan(out, &plan),
        Err(e) => {
            let (code, message) = e.surface();
            write_err(out.json, code, &message)
        }
    }
}

pub fn write_err(json: bool, code: ErrorCode, message: &str) -> i32 {
    if json {
        let envelope = serde_json::json!({
            "version": JSON_VERSION,
            "status": "err",
            "error": { "code": code, "message": message },
        });
        println!("{envelope}");
    } else {
        let msg = if message.is_empty() {
            code.as_str()
        } else {
            message
        };
        eprintln!("{msg}");
    }
    1
}

fn write_plan(out: &OutputArgs, plan: &TxPlan) -> i32 {
    let mut bytes = match serde_json::to_vec_pretty(plan) {
        Ok(b) => b,
        Err(_) => return write_err(out.json, ErrorCode::InvalidRequest, "marshal txplan"),
    };
    bytes.push(b'\n');

    if let Some(path) = &out.out {
        if let Err(e) = write_private(path, &bytes) {
            return write_err(
                out.json,
                ErrorCode::InvalidRequest,
                &format!("write {}: {e}", path.display()),
            );
        }
    }

    if out.json {
        let envelope = serde_json::json!({
            "version": JSON_VERSION,
            "status": "ok",
            "data": plan,
        });
        println!("{envelope}");
    } else {
        let _ = std::io::stdout().write_all(&bytes);
    }
    0
}

/// Plan files hold spend material; restrict them to the owner.
#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    f.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)
}
