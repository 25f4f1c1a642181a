use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::AppResult;

use super::{KvStore, Namespace, Partition};

type Key = (String, Partition);

/// Process-local store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryKvStore {
    partitions: RwLock<HashMap<Key, HashMap<String, Value>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key_of(ns: Namespace<'_>) -> Key {
    (ns.scope.to_string(), ns.partition)
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, ns: Namespace<'_>, key: &str) -> AppResult<Option<Value>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&key_of(ns))
            .and_then(|p| p.get(key))
            .cloned())
    }

    async fn set(&self, ns: Namespace<'_>, key: &str, value: Value) -> AppResult<()> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(key_of(ns))
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn iterate(&self, ns: Namespace<'_>) -> AppResult<Vec<(String, Value)>> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(&key_of(ns))
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn remove(&self, ns: Namespace<'_>, key: &str) -> AppResult<()> {
        let mut partitions = self.partitions.write().await;
        if let Some(p) = partitions.get_mut(&key_of(ns)) {
            p.remove(key);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
