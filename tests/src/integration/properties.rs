//! Property checks of the storage invariants, driven with generated
//! inputs against the real components.

use fl_block_storage::{BlockPersistence, InMemoryBlockPersistence, WriteStatus};
use fl_state_storage::{verify_proof, Forest};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::{
    BlockPair, BlockProof, ContractStateDiff, ResultsBlock, ResultsBlockHeader, StateRecord,
    TransactionsBlock, TransactionsBlockHeader,
};

fn block_at(height: u64) -> BlockPair {
    BlockPair {
        transactions_block: TransactionsBlock {
            header: TransactionsBlockHeader {
                protocol_version: 1,
                virtual_chain_id: 42,
                block_height: height,
                prev_block_hash: [0; 32],
                timestamp: height * 100,
                num_signed_transactions: 0,
            },
            metadata: vec![],
            signed_transactions: vec![],
            proof: BlockProof::default(),
        },
        results_block: ResultsBlock {
            header: ResultsBlockHeader {
                protocol_version: 1,
                virtual_chain_id: 42,
                block_height: height,
                prev_block_hash: [0; 32],
                timestamp: height * 100,
                pre_execution_state_root: [0; 32],
                post_execution_state_root: [0; 32],
                num_transaction_receipts: 0,
            },
            transaction_receipts: vec![],
            contract_state_diffs: vec![],
            proof: BlockProof::default(),
        },
    }
}

fn random_diffs(rng: &mut StdRng, count: usize) -> Vec<ContractStateDiff> {
    (0..count)
        .map(|_| {
            let contract = format!("contract_{}", rng.gen_range(0..3u8));
            let records = (0..rng.gen_range(1..5usize))
                .map(|_| {
                    let key = vec![rng.gen_range(b'a'..=b'f'), rng.gen_range(b'a'..=b'f')];
                    let value: Vec<u8> = (0..rng.gen_range(0..6usize)).map(|_| rng.gen()).collect();
                    StateRecord::new(key, value)
                })
                .collect();
            ContractStateDiff { contract_name: contract, records }
        })
        .collect()
}

#[test]
fn test_block_log_matches_write_sequence() {
    // Invariant: after writing heights 1..=N, the last height is N and
    // every height returns the block written there.
    let persistence = InMemoryBlockPersistence::new(5, vec![]);
    for height in 1..=40u64 {
        let status = persistence.write_next_block(&block_at(height)).unwrap();
        assert_eq!(status, WriteStatus::Written);
        assert_eq!(persistence.get_last_block_height().unwrap(), height);
    }
    for height in 1..=40u64 {
        assert_eq!(persistence.get_block_pair(height).unwrap().height(), height);
    }
}

#[test]
fn test_forest_root_independent_of_batching() {
    // Invariant: folding diffs d1..dn into the forest one by one or
    // replaying them into a fresh trie converges on the same root.
    for seed in 0..10u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let diffs = random_diffs(&mut rng, 8);

        let mut incremental = Forest::new();
        for diff in &diffs {
            incremental.update(std::slice::from_ref(diff));
        }

        let mut fresh = Forest::new();
        fresh.update(&diffs);

        assert_eq!(
            incremental.top_root_hash(),
            fresh.top_root_hash(),
            "seed {} diverged",
            seed
        );
    }
}

#[test]
fn test_proofs_decide_membership_exactly() {
    // Invariant: a proof verifies a present key's committed value (and
    // nothing else) and proves absence with the empty value.
    let mut rng = StdRng::seed_from_u64(7);
    let diffs = random_diffs(&mut rng, 6);
    let mut forest = Forest::new();
    let trie_id = forest.update(&diffs);
    let root = forest.root_hash(trie_id).unwrap();

    // Final value per (contract, key) after the whole diff sequence.
    let mut expected = std::collections::HashMap::new();
    for diff in &diffs {
        for record in &diff.records {
            expected.insert((diff.contract_name.clone(), record.key.clone()), record.value.clone());
        }
    }

    for ((contract, key), value) in &expected {
        let proof = forest.get_proof(trie_id, contract, key).unwrap();
        assert!(verify_proof(root, &proof, contract, key, value).unwrap());
        let mut wrong = value.clone();
        wrong.push(0xFF);
        assert!(!verify_proof(root, &proof, contract, key, &wrong).unwrap());
    }

    // Keys never written are provably absent.
    let absent_proof = forest.get_proof(trie_id, "contract_0", b"zz").unwrap();
    assert!(verify_proof(root, &absent_proof, "contract_0", b"zz", b"").unwrap());
}

#[test]
fn test_absent_key_proof_scenario() {
    // Two-key trie: the absent sibling verifies against the empty
    // value and a wrong value for a present key does not verify.
    let mut forest = Forest::new();
    let trie_id = forest.update(&[ContractStateDiff {
        contract_name: "a".into(),
        records: vec![StateRecord::new(*b"x", *b"1"), StateRecord::new(*b"y", *b"2")],
    }]);
    let root = forest.root_hash(trie_id).unwrap();

    let proof_absent = forest.get_proof(trie_id, "a", b"z").unwrap();
    assert!(verify_proof(root, &proof_absent, "a", b"z", b"").unwrap());

    let proof_present = forest.get_proof(trie_id, "a", b"x").unwrap();
    assert!(!verify_proof(root, &proof_present, "a", b"x", b"2").unwrap());
}
