//! Registries over vehicles, drivers and inspections.
//!
//! Each trait has a local implementation (any [`KvStore`]) and a cloud
//! implementation (Postgres). [`Backend`] picks one set at startup.

pub mod cloud;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::config::{Config, StorageMode};
use crate::db::{create_pool, UserContext};
use crate::error::AppResult;
use crate::models::{normalize_registration, Driver, DriverPatch, InspectionRecord, NewDriver, Vehicle};
use crate::storage::{FileKvStore, KvStore, MemoryKvStore};

pub use cloud::{PgDriverRegistry, PgInspectionStore, PgVehicleRegistry};
pub use local::{LocalDriverRegistry, LocalInspectionStore, LocalVehicleRegistry};

#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    /// Creates the entry or overwrites make/model/mileage of an existing one,
    /// keeping its `created_at`.
    async fn upsert(
        &self,
        ctx: &UserContext,
        registration: &str,
        make: &str,
        model: &str,
        mileage: u32,
    ) -> AppResult<Vehicle>;

    async fn get(&self, ctx: &UserContext, registration: &str) -> AppResult<Option<Vehicle>>;

    /// All vehicles, ordered by registration.
    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<Vehicle>>;

    /// Vehicles whose registration contains the normalized query. An empty
    /// query returns the full list.
    async fn search(&self, ctx: &UserContext, query: &str) -> AppResult<Vec<Vehicle>> {
        let all = self.list(ctx).await?;
        Ok(filter_by_registration(all, query))
    }

    async fn remove(&self, ctx: &UserContext, registration: &str) -> AppResult<()>;

    /// Records a new odometer reading. `None` if the vehicle is unknown.
    async fn set_mileage(
        &self,
        ctx: &UserContext,
        registration: &str,
        mileage: u32,
    ) -> AppResult<Option<Vehicle>>;
}

#[async_trait]
pub trait DriverRegistry: Send + Sync {
    async fn add(&self, ctx: &UserContext, driver: NewDriver) -> AppResult<Driver>;

    /// All drivers, ordered by name (case-insensitive).
    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<Driver>>;

    async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<Option<Driver>>;

    async fn update(&self, ctx: &UserContext, id: &str, patch: DriverPatch) -> AppResult<Driver>;

    async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait InspectionStore: Send + Sync {
    /// Persists a record. Saving an id that already exists keeps the stored
    /// content; only `synced` can move from false to true. Returns what is
    /// stored afterwards.
    async fn save(&self, ctx: &UserContext, record: &InspectionRecord)
        -> AppResult<InspectionRecord>;

    /// All records, newest first.
    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<InspectionRecord>>;

    async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<Option<InspectionRecord>>;

    async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()>;

    async fn mark_synced(&self, ctx: &UserContext, id: &str) -> AppResult<InspectionRecord>;
}

pub(crate) fn filter_by_registration(vehicles: Vec<Vehicle>, query: &str) -> Vec<Vehicle> {
    let query = normalize_registration(query);
    if query.is_empty() {
        return vehicles;
    }
    vehicles
        .into_iter()
        .filter(|v| v.registration.contains(&query))
        .collect()
}

/// The registries for the storage mode selected at startup.
#[derive(Clone)]
pub struct Backend {
    pub mode: StorageMode,
    pub vehicles: Arc<dyn VehicleRegistry>,
    pub drivers: Arc<dyn DriverRegistry>,
    pub inspections: Arc<dyn InspectionStore>,
}

impl Backend {
    pub fn local(store: Arc<dyn KvStore>) -> Self {
        Self::with_store(StorageMode::Local, store)
    }

    pub fn memory() -> Self {
        Self::with_store(StorageMode::Memory, Arc::new(MemoryKvStore::new()))
    }

    fn with_store(mode: StorageMode, store: Arc<dyn KvStore>) -> Self {
        Self {
            mode,
            vehicles: Arc::new(LocalVehicleRegistry::new(store.clone())),
            drivers: Arc::new(LocalDriverRegistry::new(store.clone())),
            inspections: Arc::new(LocalInspectionStore::new(store)),
        }
    }

    pub fn cloud(pool: PgPool) -> Self {
        Self {
            mode: StorageMode::Cloud,
            vehicles: Arc::new(PgVehicleRegistry::new(pool.clone())),
            drivers: Arc::new(PgDriverRegistry::new(pool.clone())),
            inspections: Arc::new(PgInspectionStore::new(pool)),
        }
    }

    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let backend = match config.storage_mode {
            StorageMode::Local => {
                tracing::info!("Local storage enabled: dir={}", config.data_dir.display());
                Self::local(Arc::new(FileKvStore::new(config.data_dir.clone())))
            }
            StorageMode::Memory => {
                tracing::info!("In-memory storage enabled, nothing will be persisted");
                Self::memory()
            }
            StorageMode::Cloud => {
                tracing::info!("Cloud storage enabled, connecting to database...");
                let pool = create_pool(config.require_database_url()?).await?;
                Self::cloud(pool)
            }
        };
        Ok(backend)
    }
}
