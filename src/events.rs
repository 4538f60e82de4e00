//! Cache-invalidation event bus.
//!
//! When a pipeline run completes, downstream caches (document list, chart
//! list, graph data, collection metadata) must be refreshed for the owning
//! collection. The monitor emits these signals exactly once per job; the
//! consumer side is whoever renders the data.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Which cached dataset a signal invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    Documents,
    Charts,
    Graph,
    Collections,
}

/// One invalidation signal, scoped to a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInvalidation {
    pub scope: CacheScope,
    pub collection_id: String,
}

/// Broadcast bus carrying invalidation signals.
///
/// Emission never fails: if no subscriber is attached the signal is dropped,
/// which is fine, there is no cache to refresh.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CacheInvalidation>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn emit(&self, scope: CacheScope, collection_id: &str) {
        let event = CacheInvalidation {
            scope,
            collection_id: collection_id.to_string(),
        };
        debug!("Cache invalidation: {:?} for {}", scope, collection_id);
        let _ = self.tx.send(event);
    }

    /// Emit the full set of signals produced by a completed ingestion run.
    pub fn emit_job_completed(&self, collection_id: &str) {
        for scope in [
            CacheScope::Documents,
            CacheScope::Charts,
            CacheScope::Graph,
            CacheScope::Collections,
        ] {
            self.emit(scope, collection_id);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheInvalidation> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscriber_is_ok() {
        let bus = EventBus::new();
        bus.emit(CacheScope::Documents, "col-1");
    }

    #[tokio::test]
    async fn test_job_completed_emits_all_scopes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit_job_completed("col-9");

        let mut scopes = Vec::new();
        for _ in 0..4 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.collection_id, "col-9");
            scopes.push(event.scope);
        }
        assert_eq!(
            scopes,
            vec![
                CacheScope::Documents,
                CacheScope::Charts,
                CacheScope::Graph,
                CacheScope::Collections
            ]
        );
    }
}
