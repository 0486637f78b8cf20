// libs/flow-cell/src/services/feed.rs
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::TelehealthFlow;

pub type FlowSender = broadcast::Sender<TelehealthFlow>;
pub type FlowReceiver = broadcast::Receiver<TelehealthFlow>;

/// Per-flow broadcast channels plus a global channel for monitoring
/// consumers. The orchestrator publishes after every committed write; the
/// feed is read-only to everyone else.
pub struct FlowChangeFeed {
    channels: Arc<RwLock<HashMap<Uuid, FlowSender>>>,
    global_sender: FlowSender,
}

impl FlowChangeFeed {
    pub fn new() -> Self {
        let (global_sender, _) = broadcast::channel(1000);

        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            global_sender,
        }
    }

    /// Subscribe to changes of one flow. Re-subscribing to the same flow
    /// joins the existing channel rather than replacing it.
    pub async fn subscribe(&self, flow_id: Uuid) -> FlowReceiver {
        let mut channels = self.channels.write().await;
        // Dropped receivers leave the sender behind; a flow that is never
        // written again would otherwise keep its entry forever.
        channels.retain(|_, sender| sender.receiver_count() > 0);

        let sender = channels.entry(flow_id).or_insert_with(|| {
            let (sender, _) = broadcast::channel(100);
            sender
        });

        debug!("Subscribed to flow channel {}", flow_id);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> FlowReceiver {
        self.global_sender.subscribe()
    }

    /// Publish a committed flow record to its channel and the global channel,
    /// pruning the per-flow channel once nobody listens.
    pub async fn publish(&self, flow: &TelehealthFlow) {
        {
            let mut channels = self.channels.write().await;
            let delivered = match channels.get(&flow.id) {
                Some(sender) if sender.receiver_count() > 0 => {
                    sender.send(flow.clone()).is_ok()
                }
                Some(_) => false,
                None => true,
            };
            if !delivered {
                channels.remove(&flow.id);
                debug!("Pruned idle flow channel {}", flow.id);
            }
        }

        // Global channel delivery is best-effort.
        let _ = self.global_sender.send(flow.clone());

        debug!(
            "Published flow {} update with status {}",
            flow.id, flow.current_status
        );
    }

    pub async fn active_channels(&self) -> Vec<Uuid> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }
}

impl Default for FlowChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for FlowChangeFeed {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            global_sender: self.global_sender.clone(),
        }
    }
}
