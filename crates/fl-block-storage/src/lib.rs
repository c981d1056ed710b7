//! # Block Storage
//!
//! The authoritative append-only block log and the catch-up protocol:
//!
//! - `adapters::memory` — ordered in-memory chain behind a read/write
//!   lock;
//! - `adapters::filesystem` — append-only `blocks` file with CRC-framed
//!   records, an exclusive OS lock, and truncation-based recovery;
//! - `service` — the commit path: persist a block, then fan its results
//!   out to state storage and the transaction pool;
//! - `sync` — the petitioner state machine that catches a lagging node
//!   up, and the source side that serves its requests.
//!
//! Heights are contiguous from 1; a write at the current height is an
//! idempotent no-op and a write beyond `last + 1` is an `OutOfOrder`
//! error carrying the next desired height.

pub mod adapters;
pub mod errors;
pub mod ports;
pub mod service;
pub mod sync;

pub use adapters::filesystem::{BlockFileConfig, FilesystemBlockPersistence};
pub use adapters::memory::InMemoryBlockPersistence;
pub use errors::BlockStorageError;
pub use ports::{
    BlockConsensusHandler, BlockPersistence, BlockSyncGossip, HandleBlockConsensusMode,
    PortError, ReceiptCommitter, StateCommitter, WriteStatus,
};
pub use service::BlockStorageService;
pub use sync::petitioner::{BlockSyncConfig, BlockSyncPetitioner, SyncEvent, SyncEventSender};
pub use sync::source::BlockSyncSource;
