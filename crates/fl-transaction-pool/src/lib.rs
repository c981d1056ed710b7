//! # Transaction Pool
//!
//! Admission, deduplication, and committed-receipt memory:
//!
//! - `domain::pending` — FIFO pool of admitted, not-yet-committed
//!   transactions, bounded by bytes;
//! - `domain::committed` — receipts of recently committed transactions,
//!   retained for a time window so duplicate submissions are caught;
//! - `service` — the admission pipeline, batch ordering for consensus,
//!   the idempotent receipt commit, and forwarding to peers.

pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;

pub use domain::committed::{CommittedEntry, CommittedPool};
pub use domain::pending::PendingPool;
pub use errors::{TransactionPoolError, TransactionStatusReply};
pub use ports::{PortError, PreOrderChecker, TransactionForwarder};
pub use service::{TransactionPoolConfig, TransactionPoolService};
