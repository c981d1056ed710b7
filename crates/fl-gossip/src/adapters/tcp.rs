//! # TCP Direct Transport
//!
//! The production transport: every peer gets one bounded outgoing queue
//! drained by a long-running sender task that writes framed messages
//! over a dedicated connection. On transport errors the connection is
//! closed and re-dialed with backoff; the queue keeps filling meanwhile
//! and drops messages beyond its budget. A server task accepts incoming
//! connections, decodes frames, and hands payloads to the registered
//! listener. Periodic empty frames serve as keep-alives.
//!
//! ## Frame format
//!
//! ```text
//! num_payloads: u32 BE
//! per payload:  len: u32 BE | bytes | zero-pad to 4
//! ```

use crate::transport::{
    GossipError, RecipientMode, Transport, TransportData, TransportListener,
};
use async_trait::async_trait;
use shared_types::NodeAddress;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

const MAX_PAYLOADS_IN_MESSAGE: u32 = 100_000;
const MAX_PAYLOAD_SIZE_BYTES: u32 = 20 * 1024 * 1024;

/// Transport tunables plus the static peer topology.
#[derive(Clone, Debug)]
pub struct DirectTransportConfig {
    pub node_address: NodeAddress,
    pub listen_port: u16,
    /// Peer address → `host:port` endpoint.
    pub peers: HashMap<NodeAddress, String>,
    pub keep_alive_interval: Duration,
    pub connection_retry_backoff: Duration,
    pub send_queue_max_bytes: usize,
    pub send_queue_max_messages: usize,
}

type ListenerSlot = Arc<RwLock<Option<Arc<dyn TransportListener>>>>;

struct PeerQueue {
    tx: mpsc::Sender<Vec<Vec<u8>>>,
    queued_bytes: Arc<AtomicUsize>,
    max_bytes: usize,
}

impl PeerQueue {
    /// Non-blocking enqueue; messages beyond the byte or message budget
    /// are dropped with a warning rather than stalling the caller.
    fn enqueue(&self, peer: NodeAddress, payloads: Vec<Vec<u8>>) {
        let size: usize = payloads.iter().map(Vec::len).sum();
        if self.queued_bytes.load(Ordering::Relaxed) + size > self.max_bytes {
            warn!(%peer, size, "send queue byte budget exceeded, dropping message");
            return;
        }
        self.queued_bytes.fetch_add(size, Ordering::Relaxed);
        if self.tx.try_send(payloads).is_err() {
            self.queued_bytes.fetch_sub(size, Ordering::Relaxed);
            warn!(%peer, "send queue full, dropping message");
        }
    }
}

/// TCP transport adapter. Start with [`DirectTransport::start`].
pub struct DirectTransport {
    node_address: NodeAddress,
    queues: HashMap<NodeAddress, PeerQueue>,
    listener: ListenerSlot,
    listen_port: u16,
}

impl DirectTransport {
    /// Bind the server socket, dial every peer, and return the running
    /// transport. `shutdown` flipping to `true` stops every task.
    pub async fn start(
        config: DirectTransportConfig,
        shutdown: watch::Receiver<bool>,
    ) -> io::Result<Arc<Self>> {
        let listener_slot: ListenerSlot = Arc::new(RwLock::new(None));

        let server = TcpListener::bind(("0.0.0.0", config.listen_port)).await?;
        let listen_port = server.local_addr()?.port();
        tokio::spawn(server_loop(server, listener_slot.clone(), shutdown.clone()));

        let mut queues = HashMap::new();
        for (peer, endpoint) in &config.peers {
            if *peer == config.node_address {
                continue;
            }
            let (tx, rx) = mpsc::channel(config.send_queue_max_messages);
            let queued_bytes = Arc::new(AtomicUsize::new(0));
            queues.insert(
                *peer,
                PeerQueue {
                    tx,
                    queued_bytes: queued_bytes.clone(),
                    max_bytes: config.send_queue_max_bytes,
                },
            );
            tokio::spawn(client_loop(
                *peer,
                endpoint.clone(),
                rx,
                queued_bytes,
                config.keep_alive_interval,
                config.connection_retry_backoff,
                shutdown.clone(),
            ));
        }

        Ok(Arc::new(Self {
            node_address: config.node_address,
            queues,
            listener: listener_slot,
            listen_port,
        }))
    }

    /// The actually bound server port (useful when configured as 0).
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }
}

#[async_trait]
impl Transport for DirectTransport {
    async fn send(&self, data: TransportData) -> Result<(), GossipError> {
        match data.recipient_mode {
            RecipientMode::Broadcast => {
                for (peer, queue) in &self.queues {
                    queue.enqueue(*peer, data.payloads.clone());
                }
                Ok(())
            }
            RecipientMode::List => {
                for peer in &data.recipient_node_addresses {
                    let queue = self
                        .queues
                        .get(peer)
                        .ok_or(GossipError::UnknownRecipient(*peer))?;
                    queue.enqueue(*peer, data.payloads.clone());
                }
                Ok(())
            }
            RecipientMode::AllButList => {
                for (peer, queue) in &self.queues {
                    if !data.recipient_node_addresses.contains(peer) {
                        queue.enqueue(*peer, data.payloads.clone());
                    }
                }
                Ok(())
            }
        }
    }

    fn register_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.write().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }
}

async fn client_loop(
    peer: NodeAddress,
    endpoint: String,
    mut rx: mpsc::Receiver<Vec<Vec<u8>>>,
    queued_bytes: Arc<AtomicUsize>,
    keep_alive_interval: Duration,
    retry_backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        let mut stream = match TcpStream::connect(&endpoint).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(%peer, %endpoint, error = %e, "peer connect failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(retry_backoff) => continue,
                    _ = shutdown.changed() => return,
                }
            }
        };
        debug!(%peer, %endpoint, "peer connection established");

        let mut keep_alive = tokio::time::interval(keep_alive_interval);
        keep_alive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                message = rx.recv() => {
                    let Some(payloads) = message else { return };
                    let size: usize = payloads.iter().map(Vec::len).sum();
                    queued_bytes.fetch_sub(size, Ordering::Relaxed);
                    if let Err(e) = write_frame(&mut stream, &payloads).await {
                        warn!(%peer, error = %e, "peer send failed, reconnecting");
                        break;
                    }
                }
                _ = keep_alive.tick() => {
                    if let Err(e) = write_frame(&mut stream, &[]).await {
                        warn!(%peer, error = %e, "keep-alive failed, reconnecting");
                        break;
                    }
                }
            }
        }
    }
}

async fn server_loop(
    server: TcpListener,
    listener: ListenerSlot,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            accepted = server.accept() => {
                match accepted {
                    Ok((stream, remote)) => {
                        debug!(%remote, "incoming gossip connection");
                        tokio::spawn(connection_loop(stream, listener.clone(), shutdown.clone()));
                    }
                    Err(e) => warn!(error = %e, "gossip accept failed"),
                }
            }
        }
    }
}

async fn connection_loop(
    mut stream: TcpStream,
    listener: ListenerSlot,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            frame = read_frame(&mut stream) => {
                match frame {
                    Ok(payloads) => {
                        if payloads.is_empty() {
                            continue; // keep-alive
                        }
                        let registered =
                            listener.read().unwrap_or_else(|e| e.into_inner()).clone();
                        match registered {
                            Some(l) => l.on_transport_message_received(payloads).await,
                            None => debug!("frame received before listener registration, dropped"),
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "gossip connection closed");
                        return;
                    }
                }
            }
        }
    }
}

fn padding_len(len: u32) -> usize {
    ((4 - len % 4) % 4) as usize
}

/// Serialize one frame into a buffer and write it out.
async fn write_frame(stream: &mut TcpStream, payloads: &[Vec<u8>]) -> io::Result<()> {
    let mut buf = Vec::with_capacity(4 + payloads.iter().map(|p| p.len() + 8).sum::<usize>());
    buf.extend_from_slice(&(payloads.len() as u32).to_be_bytes());
    for payload in payloads {
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf.extend(std::iter::repeat(0u8).take(padding_len(payload.len() as u32)));
    }
    stream.write_all(&buf).await?;
    stream.flush().await
}

/// Read one frame, enforcing the payload count and size ceilings.
async fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<Vec<u8>>> {
    let num_payloads = read_u32(stream).await?;
    if num_payloads > MAX_PAYLOADS_IN_MESSAGE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "payload count exceeds limit"));
    }
    let mut payloads = Vec::with_capacity(num_payloads as usize);
    for _ in 0..num_payloads {
        let len = read_u32(stream).await?;
        if len > MAX_PAYLOAD_SIZE_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "payload size exceeds limit"));
        }
        let mut payload = vec![0u8; len as usize];
        stream.read_exact(&mut payload).await?;
        let mut pad = [0u8; 3];
        stream.read_exact(&mut pad[..padding_len(len)]).await?;
        payloads.push(payload);
    }
    Ok(payloads)
}

async fn read_u32(stream: &mut TcpStream) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Recorder {
        received: Mutex<Vec<Vec<Vec<u8>>>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self { received: Mutex::new(vec![]) })
        }
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

    #[test]
    fn test_padding_len() {
        assert_eq!(padding_len(0), 0);
        assert_eq!(padding_len(1), 3);
        assert_eq!(padding_len(2), 2);
        assert_eq!(padding_len(3), 1);
        assert_eq!(padding_len(4), 0);
    }

    #[tokio::test]
    async fn test_two_transports_exchange_frames() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        // Start the receiver first on an ephemeral port.
        let receiver_cfg = DirectTransportConfig {
            node_address: addr(2),
            listen_port: 0,
            peers: HashMap::new(),
            keep_alive_interval: Duration::from_millis(50),
            connection_retry_backoff: Duration::from_millis(20),
            send_queue_max_bytes: 1 << 20,
            send_queue_max_messages: 16,
        };
        let receiver = DirectTransport::start(receiver_cfg, shutdown_rx.clone()).await.unwrap();
        let recorder = Recorder::new();
        receiver.register_listener(recorder.clone());

        let sender_cfg = DirectTransportConfig {
            node_address: addr(1),
            listen_port: 0,
            peers: HashMap::from([(addr(2), format!("127.0.0.1:{}", receiver.listen_port()))]),
            keep_alive_interval: Duration::from_millis(50),
            connection_retry_backoff: Duration::from_millis(20),
            send_queue_max_bytes: 1 << 20,
            send_queue_max_messages: 16,
        };
        let sender = DirectTransport::start(sender_cfg, shutdown_rx).await.unwrap();

        sender
            .send(TransportData::to_list(addr(1), vec![addr(2)], vec![b"hello".to_vec(), b"world".to_vec()]))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if !recorder.received.lock().await.is_empty() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "frame never arrived");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let received = recorder.received.lock().await;
        assert_eq!(received[0], vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_fails() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let cfg = DirectTransportConfig {
            node_address: addr(1),
            listen_port: 0,
            peers: HashMap::new(),
            keep_alive_interval: Duration::from_secs(1),
            connection_retry_backoff: Duration::from_millis(20),
            send_queue_max_bytes: 1 << 20,
            send_queue_max_messages: 16,
        };
        let transport = DirectTransport::start(cfg, shutdown_rx).await.unwrap();
        let err = transport
            .send(TransportData::to_list(addr(1), vec![addr(7)], vec![vec![1]]))
            .await
            .unwrap_err();
        assert!(matches!(err, GossipError::UnknownRecipient(_)));
    }
}
