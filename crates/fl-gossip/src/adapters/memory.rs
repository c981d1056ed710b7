//! # In-Memory Transport
//!
//! A process-local hub connecting every node of an in-process network.
//! Delivery is inline and in send order, which preserves the per-peer
//! FIFO guarantee the seam promises. Used by the development network
//! and the integration suite.

use crate::transport::{
    GossipError, RecipientMode, Transport, TransportData, TransportListener,
};
use async_trait::async_trait;
use shared_types::NodeAddress;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared registry of every node attached to the hub.
#[derive(Default)]
pub struct InMemoryTransportHub {
    listeners: RwLock<HashMap<NodeAddress, Arc<dyn TransportListener>>>,
}

impl InMemoryTransportHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the transport endpoint for one node.
    pub fn transport_for(self: &Arc<Self>, node_address: NodeAddress) -> InMemoryTransport {
        InMemoryTransport { hub: self.clone(), node_address }
    }

    fn resolve(&self, data: &TransportData) -> Vec<Arc<dyn TransportListener>> {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        match data.recipient_mode {
            RecipientMode::Broadcast => listeners
                .iter()
                .filter(|(address, _)| **address != data.sender_node_address)
                .map(|(_, listener)| listener.clone())
                .collect(),
            RecipientMode::List => data
                .recipient_node_addresses
                .iter()
                .filter_map(|address| listeners.get(address).cloned())
                .collect(),
            RecipientMode::AllButList => listeners
                .iter()
                .filter(|(address, _)| {
                    **address != data.sender_node_address
                        && !data.recipient_node_addresses.contains(address)
                })
                .map(|(_, listener)| listener.clone())
                .collect(),
        }
    }
}

/// One node's endpoint on the hub.
pub struct InMemoryTransport {
    hub: Arc<InMemoryTransportHub>,
    node_address: NodeAddress,
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, data: TransportData) -> Result<(), GossipError> {
        if data.recipient_mode == RecipientMode::List {
            let known = self.hub.listeners.read().unwrap_or_else(|e| e.into_inner());
            for address in &data.recipient_node_addresses {
                if !known.contains_key(address) {
                    return Err(GossipError::UnknownRecipient(*address));
                }
            }
        }
        let recipients = self.hub.resolve(&data);
        for listener in recipients {
            listener.on_transport_message_received(data.payloads.clone()).await;
        }
        Ok(())
    }

    fn register_listener(&self, listener: Arc<dyn TransportListener>) {
        self.hub
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(self.node_address, listener);
    }
}
