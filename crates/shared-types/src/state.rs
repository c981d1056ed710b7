//! # Contract State
//!
//! State is a mapping `(contract_name, key) → value` where values are
//! opaque byte strings. The empty byte string denotes "absent"; writing
//! it deletes the key as far as readers are concerned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One state write. An empty `value` marks the key absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StateRecord {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// All writes a block's execution produced under one contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractStateDiff {
    pub contract_name: String,
    pub records: Vec<StateRecord>,
}

/// Materialized chain state: contract → key → value.
pub type ChainState = HashMap<String, HashMap<Vec<u8>, Vec<u8>>>;

/// Collapse a diff list into a `ChainState`, later writes winning.
pub fn inflate_chain_state(diffs: &[ContractStateDiff]) -> ChainState {
    let mut result = ChainState::new();
    for diff in diffs {
        let contract = result.entry(diff.contract_name.clone()).or_default();
        for record in &diff.records {
            contract.insert(record.key.clone(), record.value.clone());
        }
    }
    result
}

/// Fold `overlay` into `base` in place, overlay entries winning.
pub fn merge_chain_state(base: &mut ChainState, overlay: &ChainState) {
    for (contract, records) in overlay {
        let target = base.entry(contract.clone()).or_default();
        for (key, value) in records {
            target.insert(key.clone(), value.clone());
        }
    }
}
