//! txplan-core — plan construction for orchard offline signing.
//!
//! Pieces:
//! - amount: decimal <-> zatoshi parsing, checked arithmetic
//! - fees: conventional fee schedule + operator fee policy
//! - select: note selection cascade, dust suppression, consolidation
//! - tree: depth-32 commitment tree roots and authentication paths
//! - index: chain scan into a (txid, action_index) -> action/position map
//! - scan: external note indexer client (pagination + bearer auth)
//! - plan: Planner orchestrating the above into a versioned TxPlan
//!
//! The core performs no I/O of its own; the node RPC client and the
//! optional indexer client are the only collaborators that touch the
//! network, and a plan is a pure function of their responses.

pub mod amount;
pub mod error;
pub mod fees;
pub mod index;
pub mod model;
pub mod plan;
pub mod scan;
pub mod select;
pub mod tree;

pub use error::{ErrorCode, PlanError};
pub use fees::{required_fee, FeePolicy};
pub use model::{OrchardSpendNote, PlanKind, TxOutput, TxPlan, UnspentNote, PLAN_VERSION};
pub use plan::{ConsolidateConfig, PlanConfig, Planner, SendConfig, SweepConfig};
pub use scan::ScanClient;
