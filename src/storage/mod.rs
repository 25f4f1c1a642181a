// Key-value storage used in offline mode (filesystem / in-memory backends)

pub mod fs;
pub mod memory;

pub use fs::FileKvStore;
pub use memory::MemoryKvStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::AppResult;

/// Named partition of the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Drivers,
    Vehicles,
    Inspections,
}

impl Partition {
    pub fn name(&self) -> &'static str {
        match self {
            Partition::Drivers => "drivers",
            Partition::Vehicles => "vehicles",
            Partition::Inspections => "inspections",
        }
    }
}

/// A partition within one user's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace<'a> {
    pub scope: &'a str,
    pub partition: Partition,
}

impl<'a> Namespace<'a> {
    pub fn new(scope: &'a str, partition: Partition) -> Self {
        Self { scope, partition }
    }
}

/// Backend-independent key-value interface (filesystem / memory).
///
/// Keys are opaque strings. `iterate` returns entries in no particular
/// order; callers sort.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, ns: Namespace<'_>, key: &str) -> AppResult<Option<Value>>;

    async fn set(&self, ns: Namespace<'_>, key: &str, value: Value) -> AppResult<()>;

    async fn iterate(&self, ns: Namespace<'_>) -> AppResult<Vec<(String, Value)>>;

    /// Removing a missing key is not an error.
    async fn remove(&self, ns: Namespace<'_>, key: &str) -> AppResult<()>;

    /// Backend name for logging.
    fn backend(&self) -> &'static str;
}

/// Typed access on top of any [`KvStore`].
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn KvStore,
    ns: Namespace<'_>,
    key: &str,
) -> AppResult<Option<T>> {
    match store.get(ns, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn set_as<T: Serialize>(
    store: &dyn KvStore,
    ns: Namespace<'_>,
    key: &str,
    value: &T,
) -> AppResult<()> {
    store.set(ns, key, serde_json::to_value(value)?).await
}

pub async fn iterate_as<T: DeserializeOwned>(
    store: &dyn KvStore,
    ns: Namespace<'_>,
) -> AppResult<Vec<T>> {
    store
        .iterate(ns)
        .await?
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value).map_err(Into::into))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AppError;

    /// Memory store that refuses every write to one partition.
    pub(crate) struct RejectingStore {
        inner: MemoryKvStore,
        rejected: Partition,
    }

    impl RejectingStore {
        pub(crate) fn new(rejected: Partition) -> Self {
            Self {
                inner: MemoryKvStore::new(),
                rejected,
            }
        }
    }

    #[async_trait::async_trait]
    impl KvStore for RejectingStore {
        async fn get(&self, ns: Namespace<'_>, key: &str) -> AppResult<Option<Value>> {
            self.inner.get(ns, key).await
        }

        async fn set(&self, ns: Namespace<'_>, key: &str, value: Value) -> AppResult<()> {
            if ns.partition == self.rejected {
                return Err(AppError::Storage("write rejected".to_string()));
            }
            self.inner.set(ns, key, value).await
        }

        async fn iterate(&self, ns: Namespace<'_>) -> AppResult<Vec<(String, Value)>> {
            self.inner.iterate(ns).await
        }

        async fn remove(&self, ns: Namespace<'_>, key: &str) -> AppResult<()> {
            self.inner.remove(ns, key).await
        }

        fn backend(&self) -> &'static str {
            "rejecting"
        }
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(Partition::Drivers.name(), "drivers");
        assert_eq!(Partition::Vehicles.name(), "vehicles");
        assert_eq!(Partition::Inspections.name(), "inspections");
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Entry {
            name: String,
        }

        let store = MemoryKvStore::new();
        let ns = Namespace::new("u1", Partition::Drivers);
        let entry = Entry {
            name: "Jane".to_string(),
        };
        set_as(&store, ns, "k1", &entry).await.unwrap();
        assert_eq!(get_as::<Entry>(&store, ns, "k1").await.unwrap(), Some(entry));
        assert_eq!(get_as::<Entry>(&store, ns, "missing").await.unwrap(), None);
        assert_eq!(iterate_as::<Entry>(&store, ns).await.unwrap().len(), 1);
    }
}
