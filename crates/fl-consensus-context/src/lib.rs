//! # Consensus Context
//!
//! The membership and proposal layer the pluggable consensus engine
//! consumes:
//!
//! - `committee` — deterministic pseudo-random committee selection;
//! - `elections` — the elected validator set, read from the elections
//!   system contract with a genesis-federation fallback;
//! - `service` — building new transaction/results blocks from the pool
//!   and the virtual machine, and re-validating blocks proposed by
//!   others.

pub mod committee;
pub mod errors;
pub mod ports;
pub mod service;

pub use committee::choose_committee;
pub use errors::ConsensusContextError;
pub use ports::{
    PortError, ProcessedTransactionSet, StateRootReader, TransactionBatchSource, VmExecutor,
};
pub use service::{ConsensusContextConfig, ConsensusContextService};
