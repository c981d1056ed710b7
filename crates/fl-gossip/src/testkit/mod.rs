//! # Tampering Transport
//!
//! A decorator over any `Transport` that lets tests tamper with
//! messages matching a predicate: fail them, hold them back, delay,
//! duplicate, or corrupt them — and latch a test task until a matching
//! message is sent. This is the seam the integration suite uses for
//! deterministic fault injection.

use crate::transport::{GossipError, Transport, TransportData, TransportListener};
use async_trait::async_trait;
use rand::RngCore;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

/// Matches messages with a certain property.
pub type MessagePredicate = Arc<dyn Fn(&TransportData) -> bool + Send + Sync>;

enum TamperKind {
    /// Matching messages error back to the sender without being sent.
    Fail,
    /// Matching messages are held until `stop_tampering` releases them.
    Pause { held: Mutex<Vec<TransportData>> },
    /// Matching messages are sent after a fixed delay.
    Delay { duration: Duration },
    /// Matching messages are sent twice.
    Duplicate,
    /// Matching messages have their payload bytes randomized.
    Corrupt,
}

/// An active tamper; remove it with [`TamperingTransport::stop_tampering`].
pub struct OngoingTamper {
    predicate: MessagePredicate,
    kind: TamperKind,
}

/// Latches a test task until a matching message is sent.
pub struct LatchingTamper {
    predicate: MessagePredicate,
    notify: Notify,
}

impl LatchingTamper {
    /// Park until the next matching message.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// The decorator itself. Construct over the nested transport, then hand
/// it to the node under test in place of the real one.
pub struct TamperingTransport {
    nested: Arc<dyn Transport>,
    ongoing: RwLock<Vec<Arc<OngoingTamper>>>,
    latches: RwLock<Vec<Arc<LatchingTamper>>>,
}

impl TamperingTransport {
    pub fn new(nested: Arc<dyn Transport>) -> Self {
        Self { nested, ongoing: RwLock::new(vec![]), latches: RwLock::new(vec![]) }
    }

    /// Fail matching messages with a transport error.
    pub fn fail(&self, predicate: MessagePredicate) -> Arc<OngoingTamper> {
        self.add(OngoingTamper { predicate, kind: TamperKind::Fail })
    }

    /// Hold matching messages until the tamper is stopped.
    pub fn pause(&self, predicate: MessagePredicate) -> Arc<OngoingTamper> {
        self.add(OngoingTamper { predicate, kind: TamperKind::Pause { held: Mutex::new(vec![]) } })
    }

    /// Delay matching messages by `duration`.
    pub fn delay(&self, duration: Duration, predicate: MessagePredicate) -> Arc<OngoingTamper> {
        self.add(OngoingTamper { predicate, kind: TamperKind::Delay { duration } })
    }

    /// Send matching messages twice.
    pub fn duplicate(&self, predicate: MessagePredicate) -> Arc<OngoingTamper> {
        self.add(OngoingTamper { predicate, kind: TamperKind::Duplicate })
    }

    /// Randomize the payload bytes of matching messages.
    pub fn corrupt(&self, predicate: MessagePredicate) -> Arc<OngoingTamper> {
        self.add(OngoingTamper { predicate, kind: TamperKind::Corrupt })
    }

    /// Create an inactive latch on matching messages.
    pub fn latch_on(&self, predicate: MessagePredicate) -> Arc<LatchingTamper> {
        let latch = Arc::new(LatchingTamper { predicate, notify: Notify::new() });
        self.latches.write().unwrap_or_else(|e| e.into_inner()).push(latch.clone());
        latch
    }

    /// Remove a tamper; paused messages are released to the nested
    /// transport in their original order.
    pub async fn stop_tampering(&self, tamper: &Arc<OngoingTamper>) {
        {
            let mut ongoing = self.ongoing.write().unwrap_or_else(|e| e.into_inner());
            ongoing.retain(|t| !Arc::ptr_eq(t, tamper));
        }
        if let TamperKind::Pause { held } = &tamper.kind {
            let released = std::mem::take(&mut *held.lock().unwrap_or_else(|e| e.into_inner()));
            for data in released {
                let _ = self.nested.send(data).await;
            }
        }
    }

    fn add(&self, tamper: OngoingTamper) -> Arc<OngoingTamper> {
        let tamper = Arc::new(tamper);
        self.ongoing.write().unwrap_or_else(|e| e.into_inner()).push(tamper.clone());
        tamper
    }

    fn signal_latches(&self, data: &TransportData) {
        let latches = self.latches.read().unwrap_or_else(|e| e.into_inner());
        for latch in latches.iter() {
            if (latch.predicate)(data) {
                // notify_one stores a permit, so a latch armed after the
                // send still falls through.
                latch.notify.notify_one();
            }
        }
    }

    /// Apply the first matching tamper. `None` means the message was
    /// consumed (paused) or refused (failed).
    async fn apply_tampers(&self, mut data: TransportData) -> Result<Option<TransportData>, GossipError> {
        let matching = {
            let ongoing = self.ongoing.read().unwrap_or_else(|e| e.into_inner());
            ongoing.iter().find(|t| (t.predicate)(&data)).cloned()
        };
        let Some(tamper) = matching else { return Ok(Some(data)) };

        match &tamper.kind {
            TamperKind::Fail => Err(GossipError::Tampered),
            TamperKind::Pause { held } => {
                held.lock().unwrap_or_else(|e| e.into_inner()).push(data);
                Ok(None)
            }
            TamperKind::Delay { duration } => {
                tokio::time::sleep(*duration).await;
                Ok(Some(data))
            }
            TamperKind::Duplicate => {
                self.nested.send(data.clone()).await?;
                Ok(Some(data))
            }
            TamperKind::Corrupt => {
                let mut rng = rand::thread_rng();
                for payload in &mut data.payloads {
                    rng.fill_bytes(payload);
                }
                Ok(Some(data))
            }
        }
    }
}

#[async_trait]
impl Transport for TamperingTransport {
    async fn send(&self, data: TransportData) -> Result<(), GossipError> {
        self.signal_latches(&data);
        match self.apply_tampers(data).await? {
            Some(data) => self.nested.send(data).await,
            None => Ok(()),
        }
    }

    fn register_listener(&self, listener: Arc<dyn TransportListener>) {
        self.nested.register_listener(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryTransportHub;
    use shared_types::NodeAddress;
    use tokio::sync::Mutex as AsyncMutex;

    struct Recorder {
        received: AsyncMutex<Vec<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl TransportListener for Recorder {
        async fn on_transport_message_received(&self, payloads: Vec<Vec<u8>>) {
            self.received.lock().await.push(payloads);
        }
    }

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::from_bytes([n; 20])
    }

    fn everything() -> MessagePredicate {
        Arc::new(|_| true)
    }

    async fn two_node_setup() -> (TamperingTransport, Arc<Recorder>) {
        let hub = InMemoryTransportHub::new();
        let a = hub.transport_for(addr(1));
        let b = hub.transport_for(addr(2));
        let recorder = Arc::new(Recorder { received: AsyncMutex::new(vec![]) });
        b.register_listener(recorder.clone());
        a.register_listener(Arc::new(Recorder { received: AsyncMutex::new(vec![]) }));
        (TamperingTransport::new(Arc::new(a)), recorder)
    }

    fn message() -> TransportData {
        TransportData::to_list(addr(1), vec![addr(2)], vec![vec![1, 2, 3]])
    }

    #[tokio::test]
    async fn test_fail_returns_error_without_sending() {
        let (tampering, recorder) = two_node_setup().await;
        tampering.fail(everything());

        assert!(matches!(tampering.send(message()).await, Err(GossipError::Tampered)));
        assert!(recorder.received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_pause_holds_until_stopped() {
        let (tampering, recorder) = two_node_setup().await;
        let tamper = tampering.pause(everything());

        tampering.send(message()).await.unwrap();
        assert!(recorder.received.lock().await.is_empty());

        tampering.stop_tampering(&tamper).await;
        assert_eq!(recorder.received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sends_twice() {
        let (tampering, recorder) = two_node_setup().await;
        tampering.duplicate(everything());

        tampering.send(message()).await.unwrap();
        assert_eq!(recorder.received.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_alters_payload_size_preserved() {
        let (tampering, recorder) = two_node_setup().await;
        tampering.corrupt(everything());

        tampering.send(message()).await.unwrap();
        let received = recorder.received.lock().await;
        assert_eq!(received[0][0].len(), 3);
    }

    #[tokio::test]
    async fn test_stopped_tamper_no_longer_applies() {
        let (tampering, recorder) = two_node_setup().await;
        let tamper = tampering.fail(everything());
        tampering.stop_tampering(&tamper).await;

        tampering.send(message()).await.unwrap();
        assert_eq!(recorder.received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_latch_wakes_on_matching_send() {
        let (tampering, _recorder) = two_node_setup().await;
        let tampering = Arc::new(tampering);
        let latch = tampering.latch_on(everything());

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::task::yield_now().await;

        tampering.send(message()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
