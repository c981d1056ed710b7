//! # Supervisor
//!
//! Long-running tasks run under supervision: a panic is caught, logged,
//! and the task restarted after a short backoff; a clean exit during
//! shutdown ends supervision. Request-scoped work panicking inside a
//! supervised task therefore never takes the process down.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};

const RESTART_BACKOFF: Duration = Duration::from_millis(100);

/// Spawn `factory`'s future and keep it alive until shutdown.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    mut shutdown: watch::Receiver<bool>,
    factory: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let run = tokio::spawn(factory());
            match run.await {
                Ok(()) => {
                    if *shutdown.borrow() {
                        return;
                    }
                    warn!(task = name, "supervised task exited, restarting");
                }
                Err(e) if e.is_panic() => {
                    error!(task = name, "supervised task panicked, restarting");
                }
                Err(_) => return, // cancelled
            }
            tokio::select! {
                _ = tokio::time::sleep(RESTART_BACKOFF) => {}
                _ = shutdown.changed() => return,
            }
        }
    })
}
