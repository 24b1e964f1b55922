// Key-value storage for attribution records

pub mod records;

pub use records::{
    AttributionRecordStore, Collector, EnrichmentSet, Event, EventRef, ResponseKind,
    ResponseSpec, Session, SessionKind, SessionRef, TempToken, TrackingRecord,
};

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Logical partitions of the backing key-value service.
///
/// All values are UTF-8 JSON except `PayloadTemplates`, which holds raw
/// script source bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Collectors,
    TrackingRecords,
    TempTokens,
    Events,
    Sessions,
    ReputationCache,
    MetadataCache,
    PayloadTemplates,
    AuthTokens,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Collectors => "collectors",
            Partition::TrackingRecords => "tracking-records",
            Partition::TempTokens => "temp-tokens",
            Partition::Events => "events",
            Partition::Sessions => "sessions",
            Partition::ReputationCache => "reputation-cache",
            Partition::MetadataCache => "metadata-cache",
            Partition::PayloadTemplates => "payload-templates",
            Partition::AuthTokens => "auth-tokens",
        }
    }
}

/// Eventually-consistent external key-value service.
///
/// No compare-and-swap is assumed: appends implemented on top of this trait
/// are read-modify-write and can lose a concurrent write (last write wins).
/// Swapping in a backend with stronger guarantees happens here.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, partition: Partition, key: &str) -> Result<Option<String>>;
    async fn put(&self, partition: Partition, key: &str, value: String) -> Result<()>;
}

/// In-process store used by tests and single-node deployments.
pub struct MemoryStore {
    data: RwLock<HashMap<(Partition, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys held in a partition.
    pub fn len(&self, partition: Partition) -> usize {
        self.data
            .read()
            .expect("store lock poisoned")
            .keys()
            .filter(|(p, _)| *p == partition)
            .count()
    }

    pub fn is_empty(&self, partition: Partition) -> bool {
        self.len(partition) == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, partition: Partition, key: &str) -> Result<Option<String>> {
        let data = self
            .data
            .read()
            .map_err(|e| Error::Store(format!("lock poisoned: {}", e)))?;
        Ok(data.get(&(partition, key.to_string())).cloned())
    }

    async fn put(&self, partition: Partition, key: &str, value: String) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| Error::Store(format!("lock poisoned: {}", e)))?;
        data.insert((partition, key.to_string()), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_put_get() {
        let store = MemoryStore::new();
        store
            .put(Partition::Collectors, "c1", "{\"cid\":\"c1\"}".to_string())
            .await
            .unwrap();

        let value = store.get(Partition::Collectors, "c1").await.unwrap();
        assert_eq!(value.unwrap(), "{\"cid\":\"c1\"}");

        let miss = store.get(Partition::Collectors, "c2").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_partitions_are_namespaced() {
        let store = MemoryStore::new();
        store
            .put(Partition::Events, "k", "event".to_string())
            .await
            .unwrap();
        store
            .put(Partition::Sessions, "k", "session".to_string())
            .await
            .unwrap();

        assert_eq!(
            store.get(Partition::Events, "k").await.unwrap().unwrap(),
            "event"
        );
        assert_eq!(
            store.get(Partition::Sessions, "k").await.unwrap().unwrap(),
            "session"
        );
        assert_eq!(store.len(Partition::Events), 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        store
            .put(Partition::Events, "k", "first".to_string())
            .await
            .unwrap();
        store
            .put(Partition::Events, "k", "second".to_string())
            .await
            .unwrap();
        assert_eq!(
            store.get(Partition::Events, "k").await.unwrap().unwrap(),
            "second"
        );
    }
}
