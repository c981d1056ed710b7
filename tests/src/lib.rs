//! # Fedledger Test Suite
//!
//! Multi-node integration scenarios over an in-process tampering
//! transport, plus property checks of the storage invariants.

pub mod harness;

#[cfg(test)]
mod integration;
