//! # Node Runtime
//!
//! The composition root of a Fedledger node:
//!
//! - `env` — environment-variable configuration loading;
//! - `startup` — fatal pre-flight checks (key↔address consistency,
//!   interval ordering, non-empty federation);
//! - `supervisor` — restart-on-panic task supervision;
//! - `processor` — the in-process native contract repository behind the
//!   virtual-machine ports;
//! - `consensus` — the benchmark single-leader consensus engine;
//! - `wiring` — adapters bridging the per-edge capability traits;
//! - `node` — leaf-first construction of every subsystem and lifecycle
//!   management.

pub mod consensus;
pub mod env;
pub mod node;
pub mod processor;
pub mod startup;
pub mod supervisor;
pub mod wiring;

pub use consensus::BenchmarkConsensus;
pub use node::Node;
pub use processor::NativeProcessor;
