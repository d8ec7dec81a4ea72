use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use waifu_types::events::GatewayEvent;
use waifu_types::models::UserId;

/// Fans gateway events out to every connected bridge.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events; every bridge receives every event
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Connected bridges: conn_id -> identified user
    bridges: RwLock<HashMap<Uuid, UserId>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                bridges: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected bridges.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register an identified bridge connection. Returns its conn_id.
    pub async fn bridge_online(&self, user_id: UserId) -> Uuid {
        let conn_id = Uuid::new_v4();
        self.inner.bridges.write().await.insert(conn_id, user_id);
        conn_id
    }

    pub async fn bridge_offline(&self, conn_id: Uuid) {
        self.inner.bridges.write().await.remove(&conn_id);
    }

    pub async fn bridge_count(&self) -> usize {
        self.inner.bridges.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.broadcast(GatewayEvent::Ready { user_id: 1 });
        match rx.recv().await.unwrap() {
            GatewayEvent::Ready { user_id } => assert_eq!(user_id, 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn bridges_are_tracked_per_connection() {
        let dispatcher = Dispatcher::new();
        let a = dispatcher.bridge_online(1).await;
        let _b = dispatcher.bridge_online(1).await;
        assert_eq!(dispatcher.bridge_count().await, 2);

        dispatcher.bridge_offline(a).await;
        assert_eq!(dispatcher.bridge_count().await, 1);
    }
}
