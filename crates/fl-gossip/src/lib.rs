//! # Gossip Transport
//!
//! The abstract message bus between federation nodes, with ordered
//! per-peer delivery:
//!
//! - the `Transport` seam (`send` + `register_listener`) and its
//!   addressing modes (broadcast, list, all-but-list);
//! - `messages` — the application-level gossip codec (one bincode-encoded
//!   `GossipMessage` per transport payload);
//! - `adapters::memory` — in-process hub for multi-node tests and the
//!   development network;
//! - `adapters::tcp` — the production TCP transport: one bounded queue
//!   and sender task per peer, framed messages, keep-alives, reconnect
//!   with backoff;
//! - `testkit` — a tampering decorator for deterministic fault
//!   injection.

pub mod adapters;
pub mod messages;
pub mod testkit;
pub mod transport;

pub use adapters::memory::{InMemoryTransport, InMemoryTransportHub};
pub use adapters::tcp::{DirectTransport, DirectTransportConfig};
pub use messages::{BlockSyncRange, GossipMessage};
pub use testkit::{LatchingTamper, MessagePredicate, OngoingTamper, TamperingTransport};
pub use transport::{GossipError, RecipientMode, Transport, TransportData, TransportListener};
