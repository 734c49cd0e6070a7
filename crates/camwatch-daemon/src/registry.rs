//! Connection registry for notification fan-out.
//!
//! The registry maps connection ids to outbound message channels. RPC
//! replies go out through `unicast`; camera status transitions go out
//! through `broadcast`, which serializes the notification once and hands
//! the same text to every registered connection. A send failure means the
//! reader side already dropped the channel, so the connection is pruned
//! without interrupting delivery to the others.

use std::collections::HashMap;

use camwatch_rpc::protocol::{self, Notification};
use chrono::Utc;
use serde_json::json;
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use camwatch_core::CameraRecord;

use crate::connection::ConnectionId;

/// Outbound channel for one connection, drained by its send task.
pub type OutboundSender = mpsc::UnboundedSender<WsMessage>;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    senders: RwLock<HashMap<ConnectionId, OutboundSender>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.senders.read().await.len()
    }

    /// Add a connection and send its joining burst: a `server_welcome`
    /// notification followed by one `camera_status_update` per known
    /// device, connected or not. The burst goes to this connection only.
    pub async fn register(
        &self,
        id: ConnectionId,
        sender: OutboundSender,
        devices: &[CameraRecord],
        methods: &[&str],
    ) {
        let welcome = Notification::new(
            protocol::SERVER_WELCOME,
            Some(json!({
                "server": "camwatch",
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": Utc::now(),
                "availableMethods": methods,
            })),
        );
        send_notification(&sender, &id, &welcome);

        for record in devices {
            let notification = Notification::new(
                protocol::CAMERA_STATUS_UPDATE,
                Some(record.notification_params()),
            );
            send_notification(&sender, &id, &notification);
        }

        self.senders.write().await.insert(id.clone(), sender);
        debug!("connection registered: {id}");
    }

    /// Remove a connection. Idempotent; called on close, transport error,
    /// and broadcast failure alike.
    pub async fn unregister(&self, id: &ConnectionId) {
        if self.senders.write().await.remove(id).is_some() {
            debug!("connection unregistered: {id}");
        }
    }

    /// Deliver one frame to one connection.
    pub async fn unicast(&self, id: &ConnectionId, text: String) {
        let senders = self.senders.read().await;
        if let Some(sender) = senders.get(id) {
            if let Err(e) = sender.send(WsMessage::text(text)) {
                warn!("unicast to {id} failed: {e}");
            }
        }
    }

    /// Queue a close frame behind any pending notifications on every
    /// connection, then drop the senders. Each send task drains its
    /// queue in order, so pending notifications flush before the close
    /// frame goes out.
    pub async fn close_all(&self) {
        let mut senders = self.senders.write().await;
        for (id, sender) in senders.drain() {
            debug!("closing connection {id}");
            let _ = sender.send(WsMessage::Close(None));
        }
    }

    /// Serialize once, deliver to every connection. Dead connections are
    /// unregistered after the sweep.
    pub async fn broadcast(&self, notification: &Notification) {
        let text = match serde_json::to_string(notification) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize {} notification: {e}", notification.method);
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let senders = self.senders.read().await;
            for (id, sender) in senders.iter() {
                if sender.send(WsMessage::text(text.clone())).is_err() {
                    dead.push(id.clone());
                }
            }
        }

        for id in dead {
            warn!("dropping dead connection {id} during broadcast");
            self.unregister(&id).await;
        }
    }
}

fn send_notification(sender: &OutboundSender, id: &ConnectionId, notification: &Notification) {
    match serde_json::to_string(notification) {
        Ok(text) => {
            if let Err(e) = sender.send(WsMessage::text(text)) {
                warn!("failed to send {} to {id}: {e}", notification.method);
            }
        }
        Err(e) => warn!("failed to serialize {}: {e}", notification.method),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camwatch_core::{CameraCapabilities, CameraStatus};
    use serde_json::Value;

    fn records() -> Vec<CameraRecord> {
        vec![
            CameraRecord::disconnected("/dev/video0"),
            CameraRecord {
                device: "/dev/video1".to_string(),
                status: CameraStatus::Connected,
                capabilities: Some(CameraCapabilities::fallback()),
                last_changed_at: Utc::now(),
            },
        ]
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let WsMessage::Text(text) = msg {
                out.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_register_sends_welcome_then_burst() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .register(ConnectionId::new(), tx, &records(), &["ping", "echo"])
            .await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["method"], protocol::SERVER_WELCOME);
        assert_eq!(frames[0]["params"]["server"], "camwatch");
        assert_eq!(frames[0]["params"]["availableMethods"][0], "ping");
        assert_eq!(frames[1]["method"], protocol::CAMERA_STATUS_UPDATE);
        assert_eq!(frames[1]["params"]["device"], "/dev/video0");
        assert_eq!(frames[1]["params"]["status"], "DISCONNECTED");
        assert!(frames[1]["params"].get("resolution").is_none());
        assert_eq!(frames[2]["params"]["device"], "/dev/video1");
        assert_eq!(frames[2]["params"]["resolution"], "640x480");
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_connections() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(ConnectionId::new(), tx_a, &[], &[]).await;
        registry.register(ConnectionId::new(), tx_b, &[], &[]).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        let notification = Notification::new(
            protocol::CAMERA_STATUS_UPDATE,
            Some(json!({"status": "CONNECTED", "device": "/dev/video0"})),
        );
        registry.broadcast(&notification).await;

        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_connection_but_delivers_to_rest() {
        let registry = ConnectionRegistry::new();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        registry
            .register(ConnectionId::from("dead"), tx_dead, &[], &[])
            .await;
        registry
            .register(ConnectionId::from("live"), tx_live, &[], &[])
            .await;
        drain(&mut rx_live);
        drop(rx_dead);

        let notification = Notification::new(protocol::CAMERA_STATUS_UPDATE, Some(json!({})));
        registry.broadcast(&notification).await;

        assert_eq!(drain(&mut rx_live).len(), 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_close_all_flushes_pending_before_close_frame() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(ConnectionId::new(), tx, &[], &[]).await;
        drain(&mut rx);

        let notification = Notification::new(
            protocol::CAMERA_STATUS_UPDATE,
            Some(json!({"status": "DISCONNECTED", "device": "/dev/video0"})),
        );
        registry.broadcast(&notification).await;
        registry.close_all().await;

        // Pending notification first, close frame behind it.
        assert!(matches!(rx.try_recv(), Ok(WsMessage::Text(_))));
        assert!(matches!(rx.try_recv(), Ok(WsMessage::Close(None))));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        registry.register(id.clone(), tx, &[], &[]).await;
        registry.unregister(&id).await;
        registry.unregister(&id).await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_unicast_to_unknown_connection_is_a_noop() {
        let registry = ConnectionRegistry::new();
        registry
            .unicast(&ConnectionId::from("ghost"), "{}".to_string())
            .await;
    }
}
