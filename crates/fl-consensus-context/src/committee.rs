//! # Committee Selection
//!
//! A deterministic pseudo-random subset of the elected validator set:
//! every honest node feeding the same seed, validator set, and size
//! bound gets the same committee. The result is returned in canonical
//! (ascending address) order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared_types::NodeAddress;

/// Choose up to `max_size` members from `validators` using `seed`.
pub fn choose_committee(
    validators: &[NodeAddress],
    seed: u64,
    max_size: u32,
) -> Vec<NodeAddress> {
    // Canonicalize the input so every node shuffles the same sequence.
    let mut pool: Vec<NodeAddress> = validators.to_vec();
    pool.sort();
    pool.dedup();

    let mut rng = StdRng::seed_from_u64(seed);
    pool.shuffle(&mut rng);

    let mut committee: Vec<NodeAddress> = pool.into_iter().take(max_size as usize).collect();
    committee.sort();
    committee
}
