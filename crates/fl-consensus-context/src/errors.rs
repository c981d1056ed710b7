//! Consensus context error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusContextError {
    /// A proposed block disagrees with our own computation.
    #[error("block validation failed: {0}")]
    ValidationFailed(String),

    /// The elections system contract returned something unparseable.
    #[error("elections output corrupt: {0}")]
    ElectionsOutputCorrupt(String),

    /// A collaborator (pool, VM, state storage) failed.
    #[error("consensus context dependency failed: {0}")]
    Dependency(String),
}
