//! Active connection registry.
//!
//! Tracks connected peers for the health endpoint.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

pub type ConnectionId = String;

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            peer,
            connected_at: Utc::now(),
        }
    }
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, info: ConnectionInfo) {
        let mut w = self.connections.write().await;
        w.insert(info.id.clone(), info);
    }

    pub async fn unregister(&self, id: &str) -> Option<ConnectionInfo> {
        let mut w = self.connections.write().await;
        w.remove(id)
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Active connections, oldest first.
    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let r = self.connections.read().await;
        let mut all: Vec<_> = r.values().cloned().collect();
        all.sort_by_key(|c| c.connected_at);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let a = ConnectionInfo::new("127.0.0.1:5000".parse().unwrap());
        let b = ConnectionInfo::new("127.0.0.1:5001".parse().unwrap());
        let a_id = a.id.clone();

        registry.register(a).await;
        registry.register(b).await;
        assert_eq!(registry.count().await, 2);

        let removed = registry.unregister(&a_id).await.unwrap();
        assert_eq!(removed.peer.port(), 5000);
        assert!(registry.unregister(&a_id).await.is_none());
        assert_eq!(registry.list().await.len(), 1);
    }
}
