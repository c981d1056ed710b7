//! # State Storage
//!
//! The deterministic world state derived from committed blocks:
//!
//! - `domain::merkle` — a versioned radix-256 trie ("forest") committing
//!   to the full state at every height, with inclusion/absence proofs.
//! - `domain::revisions` — a rolling ring of the last N per-height
//!   snapshots layered over a persistence adapter.
//! - `service` — the storage API: commit diffs, read keys at a height,
//!   fetch state roots, project roots for proposals.
//!
//! Commits are strictly sequential by height; a stale commit is an
//! idempotent no-op that reports the next desired height.

pub mod domain;
pub mod errors;
pub mod ports;
pub mod service;

pub use domain::merkle::{verify_proof, Forest, MerkleNode, Proof, TrieId};
pub use domain::revisions::RollingRevisions;
pub use errors::{MerkleError, StateStorageError};
pub use ports::{InMemoryStatePersistence, StatePersistence};
pub use service::{CommitStateDiffOutput, StateStorageConfig, StateStorageService};
