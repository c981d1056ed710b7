//! # Block Tracker
//!
//! A monotone block-height counter with broadcast wakeups. Storage
//! services bump it on every commit; readers park on `wait_for_block`
//! until the chain reaches the height they need.
//!
//! A grace distance bounds how far ahead a caller may wait: asking for
//! `current + 1 ..= current + grace` parks the caller, anything beyond
//! fails fast with `OutOfGraceRange`. Cancellation is by dropping the
//! wait future or wrapping it in `tokio::time::timeout`.

use crate::primitives::BlockHeight;
use thiserror::Error;
use tokio::sync::watch;

/// Errors surfaced by [`BlockTracker::wait_for_block`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// Requested height is too far past the current one.
    #[error("height {requested} out of grace range: current {current}, grace {grace}")]
    OutOfGraceRange {
        requested: BlockHeight,
        current: BlockHeight,
        grace: u64,
    },
}

/// Monotone height counter with condition-broadcast semantics.
pub struct BlockTracker {
    height: watch::Sender<BlockHeight>,
    grace_distance: u64,
}

impl BlockTracker {
    /// Create a tracker at `start_height` with the given grace distance.
    pub fn new(start_height: BlockHeight, grace_distance: u64) -> Self {
        let (height, _) = watch::channel(start_height);
        Self { height, grace_distance }
    }

    /// The last height the tracker has seen.
    pub fn current_height(&self) -> BlockHeight {
        *self.height.borrow()
    }

    /// Advance to `new_height` and wake all waiters at or below it.
    ///
    /// Equal heights are a no-op (commits are idempotent); moving
    /// backwards is an invariant violation and panics.
    pub fn increment_to(&self, new_height: BlockHeight) {
        self.height.send_modify(|current| {
            assert!(
                new_height >= *current,
                "block tracker moved backwards: {} -> {}",
                current,
                new_height
            );
            *current = new_height;
        });
    }

    /// Park until the tracker reaches `height`.
    ///
    /// Returns immediately when the height is already reached, and
    /// fails fast when `height` exceeds `current + grace_distance`.
    pub async fn wait_for_block(&self, height: BlockHeight) -> Result<(), TrackerError> {
        let mut rx = self.height.subscribe();

        let current = *rx.borrow_and_update();
        if height <= current {
            return Ok(());
        }
        if height > current + self.grace_distance {
            return Err(TrackerError::OutOfGraceRange {
                requested: height,
                current,
                grace: self.grace_distance,
            });
        }

        loop {
            // The sender lives in self, so changed() cannot fail while
            // we hold &self.
            if rx.changed().await.is_err() {
                unreachable!("block tracker sender dropped while waiting");
            }
            if *rx.borrow_and_update() >= height {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_reached() {
        let tracker = BlockTracker::new(3, 5);
        tracker.wait_for_block(3).await.unwrap();
        tracker.wait_for_block(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_wakes_on_increment() {
        let tracker = Arc::new(BlockTracker::new(0, 5));
        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_block(2).await })
        };
        tokio::task::yield_now().await;
        tracker.increment_to(1);
        tracker.increment_to(2);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_beyond_grace_fails_fast() {
        let tracker = BlockTracker::new(10, 5);
        let err = tracker.wait_for_block(16).await.unwrap_err();
        assert_eq!(
            err,
            TrackerError::OutOfGraceRange { requested: 16, current: 10, grace: 5 }
        );
        // Edge of the grace window still parks rather than failing.
        let fut = tracker.wait_for_block(15);
        tracker.increment_to(15);
        fut.await.unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "moved backwards")]
    async fn test_regression_panics() {
        let tracker = BlockTracker::new(5, 5);
        tracker.increment_to(4);
    }

    #[tokio::test]
    async fn test_increment_to_same_height_is_noop() {
        let tracker = BlockTracker::new(5, 5);
        tracker.increment_to(5);
        assert_eq!(tracker.current_height(), 5);
    }

    #[tokio::test]
    async fn test_wakes_all_waiters() {
        let tracker = Arc::new(BlockTracker::new(0, 10));
        let handles: Vec<_> = (1..=3)
            .map(|h| {
                let tracker = tracker.clone();
                tokio::spawn(async move { tracker.wait_for_block(h).await })
            })
            .collect();
        tokio::task::yield_now().await;
        tracker.increment_to(3);
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }
}
