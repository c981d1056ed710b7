//! Pure state-storage domain logic: the Merkle forest and the rolling
//! snapshot ring.

pub mod merkle;
pub mod revisions;
