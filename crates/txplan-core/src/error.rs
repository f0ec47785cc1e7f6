//! Error taxonomy for plan construction.
//!
//! Machine-readable surface codes live in [`ErrorCode`]; everything else is
//! an internal failure class that the CLI maps to `invalid_request` before
//! surfacing, mirroring how selection failures map to
//! `insufficient_balance`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::scan::ScanError;
use crate::tree::TreeError;

pub type Result<T> = std::result::Result<T, PlanError>;

/// Stable machine-readable error codes carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    InsufficientBalance,
    NotFound,
    /// Reserved for wallet-routing deployments that split hot/cold liquidity.
    NoLiquidityInHot,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InsufficientBalance => "insufficient_balance",
            ErrorCode::NotFound => "not_found",
            ErrorCode::NoLiquidityInHot => "no_liquidity_in_hot",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{code}: {message}")]
    Coded { code: ErrorCode, message: String },
    #[error("overflow")]
    Overflow,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("invalid totals")]
    InvalidTotals,
    #[error(transparent)]
    Rpc(#[from] txplan_rpc::RpcError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("{0}")]
    Internal(String),
}

impl PlanError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        PlanError::Coded {
            code: ErrorCode::InvalidRequest,
            message: message.into(),
        }
    }

    pub fn insufficient_balance(message: impl Into<String>) -> Self {
        PlanError::Coded {
            code: ErrorCode::InsufficientBalance,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        PlanError::Coded {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PlanError::Internal(message.into())
    }

    /// Surface (code, message) pair. Anything without an explicit code is
    /// reported as `invalid_request`, transport errors included.
    pub fn surface(&self) -> (ErrorCode, String) {
        match self {
            PlanError::Coded { code, message } => (*code, message.clone()),
            other => (ErrorCode::InvalidRequest, other.to_string()),
        }
    }
}
