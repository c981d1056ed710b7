//! End-to-end scenarios over in-process federations.

use crate::harness::{balance_key, TestNetwork};
use fl_block_storage::BlockPersistence;
use fl_gossip::MessagePredicate;
use shared_types::{Argument, ExecutionResult};
use std::sync::Arc;
use std::time::Duration;

fn everything() -> MessagePredicate {
    Arc::new(|_| true)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_block_round_trip() {
    let mut network = TestNetwork::new(4);
    network.start_all().await;

    // No transactions at all: empty blocks still advance the chain on
    // every node.
    for index in 0..4 {
        network.await_height(index, 1, Duration::from_secs(3)).await;
    }

    let roots = network.state_roots_at(1).await;
    assert!(roots.windows(2).all(|pair| pair[0] == pair[1]), "state roots diverged");
    network.shutdown_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_transfer() {
    let mut network = TestNetwork::new(4);
    network.start_all().await;

    // Mint, then transfer. Submitted through a follower to exercise
    // forwarding.
    let (_, receipt) = network
        .submit_and_await_receipt(
            1,
            "BenchmarkToken",
            "init",
            vec![Argument::Uint64(1000), Argument::Uint64(5)],
        )
        .await;
    assert_eq!(receipt.execution_result, ExecutionResult::Success);

    let (txhash, receipt) = network
        .submit_and_await_receipt(
            1,
            "BenchmarkToken",
            "transfer",
            vec![Argument::Uint64(17), Argument::Uint64(5), Argument::Uint64(6)],
        )
        .await;
    assert_eq!(receipt.execution_result, ExecutionResult::Success);

    // Every node converges on the same balances.
    let transfer_height = network.node(1).block_storage.get_last_block_height().unwrap();
    for index in 0..4 {
        network.await_height(index, transfer_height, Duration::from_secs(3)).await;
        assert_eq!(
            network.read_state_u64(index, "BenchmarkToken", &balance_key(6)).await,
            17,
            "node {} balance of account 6",
            index
        );
        assert_eq!(
            network.read_state_u64(index, "BenchmarkToken", &balance_key(5)).await,
            983,
            "node {} balance of account 5",
            index
        );
    }

    // Exactly one receipt for the txhash across the whole chain.
    let node = network.node(0);
    let mut occurrences = 0;
    node.block_storage
        .persistence()
        .scan_blocks(1, 10, &mut |_, page| {
            for block in page {
                occurrences += block
                    .results_block
                    .transaction_receipts
                    .iter()
                    .filter(|r| r.txhash == txhash)
                    .count();
            }
            true
        })
        .unwrap();
    assert_eq!(occurrences, 1);
    assert!(node.block_storage.get_block_by_tx(txhash, 0, u64::MAX).unwrap().is_some());
    network.shutdown_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deploy_and_call_counter() {
    let mut network = TestNetwork::new(4);
    network.start_all().await;

    let (_, receipt) = network
        .submit_and_await_receipt(0, "Counter", "init", vec![Argument::Uint64(100)])
        .await;
    assert_eq!(receipt.execution_result, ExecutionResult::Success);

    let (_, receipt) =
        network.submit_and_await_receipt(0, "Counter", "get", vec![]).await;
    assert_eq!(receipt.output, vec![Argument::Uint64(100)]);

    network.submit_and_await_receipt(0, "Counter", "add", vec![Argument::Uint64(17)]).await;
    let (_, receipt) =
        network.submit_and_await_receipt(0, "Counter", "get", vec![]).await;
    assert_eq!(receipt.output, vec![Argument::Uint64(117)]);
    network.shutdown_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_starter_catches_up() {
    let mut network = TestNetwork::new(4);
    for index in 0..3 {
        network.start_node(index).await;
    }

    // Advance the chain before node 3 even exists.
    network.await_height(0, 4, Duration::from_secs(3)).await;

    network.start_node(3).await;
    network.await_height(3, 4, Duration::from_secs(2)).await;

    let reference = network.node(0).state_storage.get_state_hash(4).await.unwrap();
    let caught_up = network.node(3).state_storage.get_state_hash(4).await.unwrap();
    assert_eq!(reference, caught_up, "late starter diverged at height 4");
    network.shutdown_all();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partitioned_leader_followers_recover() {
    let mut network = TestNetwork::new(4);
    network.start_all().await;
    network.await_height(2, 1, Duration::from_secs(3)).await;

    // Partition the leader outbound: followers hear nothing — no block
    // broadcasts and no sync responses — while the leader keeps
    // committing locally.
    let tamper = network.nodes[0].tampering.pause(everything());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let leader_height = network.node(0).block_storage.get_last_block_height().unwrap();
    let follower_height = network.node(2).block_storage.get_last_block_height().unwrap();
    assert!(leader_height > follower_height, "leader should outrun partitioned followers");

    // Heal the partition: the held backlog replays in order and block
    // sync closes whatever remains.
    network.nodes[0].tampering.stop_tampering(&tamper).await;
    network.await_height(2, leader_height, Duration::from_secs(3)).await;
    network.shutdown_all();
}
