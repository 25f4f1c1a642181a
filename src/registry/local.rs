use std::sync::Arc;

use async_trait::async_trait;

use crate::db::UserContext;
use crate::error::{AppError, AppResult};
use crate::models::driver::sort_by_name;
use crate::models::{normalize_registration, Driver, DriverPatch, InspectionRecord, NewDriver, Vehicle};
use crate::storage::{get_as, iterate_as, set_as, KvStore, Namespace, Partition};

use super::{DriverRegistry, InspectionStore, VehicleRegistry};

fn ns(ctx: &UserContext, partition: Partition) -> Namespace<'_> {
    Namespace::new(ctx.scope(), partition)
}

pub struct LocalVehicleRegistry {
    store: Arc<dyn KvStore>,
}

impl LocalVehicleRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VehicleRegistry for LocalVehicleRegistry {
    async fn upsert(
        &self,
        ctx: &UserContext,
        registration: &str,
        make: &str,
        model: &str,
        mileage: u32,
    ) -> AppResult<Vehicle> {
        let key = normalize_registration(registration);
        if key.is_empty() {
            return Err(AppError::validation("vehicle registration required"));
        }
        let ns = ns(ctx, Partition::Vehicles);
        let existing: Option<Vehicle> = get_as(self.store.as_ref(), ns, &key).await?;
        let vehicle = Vehicle::upserted(existing.as_ref(), &key, make, model, mileage);
        set_as(self.store.as_ref(), ns, &key, &vehicle).await?;

        tracing::info!(
            "Vehicle upserted: backend={}, registration={}, created={}",
            self.store.backend(),
            key,
            existing.is_none()
        );
        Ok(vehicle)
    }

    async fn get(&self, ctx: &UserContext, registration: &str) -> AppResult<Option<Vehicle>> {
        let key = normalize_registration(registration);
        get_as(self.store.as_ref(), ns(ctx, Partition::Vehicles), &key).await
    }

    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<Vehicle>> {
        let mut vehicles: Vec<Vehicle> =
            iterate_as(self.store.as_ref(), ns(ctx, Partition::Vehicles)).await?;
        vehicles.sort_by(|a, b| a.registration.cmp(&b.registration));
        Ok(vehicles)
    }

    async fn remove(&self, ctx: &UserContext, registration: &str) -> AppResult<()> {
        let key = normalize_registration(registration);
        self.store
            .remove(ns(ctx, Partition::Vehicles), &key)
            .await?;
        tracing::info!("Vehicle removed: registration={}", key);
        Ok(())
    }

    async fn set_mileage(
        &self,
        ctx: &UserContext,
        registration: &str,
        mileage: u32,
    ) -> AppResult<Option<Vehicle>> {
        let key = normalize_registration(registration);
        let ns = ns(ctx, Partition::Vehicles);
        let Some(mut vehicle) = get_as::<Vehicle>(self.store.as_ref(), ns, &key).await? else {
            return Ok(None);
        };
        vehicle.mileage = mileage;
        vehicle.updated_at = chrono::Utc::now().max(vehicle.updated_at);
        set_as(self.store.as_ref(), ns, &key, &vehicle).await?;
        Ok(Some(vehicle))
    }
}

pub struct LocalDriverRegistry {
    store: Arc<dyn KvStore>,
}

impl LocalDriverRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DriverRegistry for LocalDriverRegistry {
    async fn add(&self, ctx: &UserContext, driver: NewDriver) -> AppResult<Driver> {
        let driver = Driver::create(driver)?;
        set_as(
            self.store.as_ref(),
            ns(ctx, Partition::Drivers),
            &driver.id,
            &driver,
        )
        .await?;
        tracing::info!("Driver added: id={}", driver.id);
        Ok(driver)
    }

    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<Driver>> {
        let mut drivers: Vec<Driver> =
            iterate_as(self.store.as_ref(), ns(ctx, Partition::Drivers)).await?;
        sort_by_name(&mut drivers);
        Ok(drivers)
    }

    async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<Option<Driver>> {
        get_as(self.store.as_ref(), ns(ctx, Partition::Drivers), id).await
    }

    async fn update(&self, ctx: &UserContext, id: &str, patch: DriverPatch) -> AppResult<Driver> {
        let ns = ns(ctx, Partition::Drivers);
        let mut driver: Driver = get_as(self.store.as_ref(), ns, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("driver {}", id)))?;
        driver.apply(patch)?;
        set_as(self.store.as_ref(), ns, id, &driver).await?;
        tracing::info!("Driver updated: id={}", id);
        Ok(driver)
    }

    async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()> {
        self.store.remove(ns(ctx, Partition::Drivers), id).await?;
        tracing::info!("Driver removed: id={}", id);
        Ok(())
    }
}

pub struct LocalInspectionStore {
    store: Arc<dyn KvStore>,
}

impl LocalInspectionStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InspectionStore for LocalInspectionStore {
    async fn save(
        &self,
        ctx: &UserContext,
        record: &InspectionRecord,
    ) -> AppResult<InspectionRecord> {
        let ns = ns(ctx, Partition::Inspections);
        let stored = match get_as::<InspectionRecord>(self.store.as_ref(), ns, &record.id).await? {
            Some(mut existing) => {
                if record.synced && existing.mark_synced() {
                    set_as(self.store.as_ref(), ns, &existing.id, &existing).await?;
                }
                tracing::debug!("Inspection already stored: id={}", existing.id);
                existing
            }
            None => {
                set_as(self.store.as_ref(), ns, &record.id, record).await?;
                tracing::info!(
                    "Inspection saved: backend={}, id={}, registration={}",
                    self.store.backend(),
                    record.id,
                    record.vehicle.registration
                );
                record.clone()
            }
        };
        Ok(stored)
    }

    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<InspectionRecord>> {
        let mut records: Vec<InspectionRecord> =
            iterate_as(self.store.as_ref(), ns(ctx, Partition::Inspections)).await?;
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<Option<InspectionRecord>> {
        get_as(self.store.as_ref(), ns(ctx, Partition::Inspections), id).await
    }

    async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()> {
        self.store
            .remove(ns(ctx, Partition::Inspections), id)
            .await?;
        tracing::info!("Inspection removed: id={}", id);
        Ok(())
    }

    async fn mark_synced(&self, ctx: &UserContext, id: &str) -> AppResult<InspectionRecord> {
        let ns = ns(ctx, Partition::Inspections);
        let mut record: InspectionRecord = get_as(self.store.as_ref(), ns, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("inspection {}", id)))?;
        if record.mark_synced() {
            set_as(self.store.as_ref(), ns, id, &record).await?;
            tracing::info!("Inspection marked synced: id={}", id);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checklist::{build_initial, tests::two_by_two};
    use crate::models::{InspectionDraft, InspectionType, VehicleSnapshot};
    use crate::storage::{FileKvStore, MemoryKvStore};

    fn memory() -> Arc<dyn KvStore> {
        Arc::new(MemoryKvStore::new())
    }

    fn record(registration: &str) -> InspectionRecord {
        InspectionRecord::create(InspectionDraft {
            inspection_type: InspectionType::Initial,
            vehicle: VehicleSnapshot::new(registration, "Toyota", "Corolla", 50000).unwrap(),
            checklist: build_initial(&two_by_two()),
            general_comments: None,
            inspector_name: None,
            driver_id: None,
            driver_name: None,
            signature_data_url: None,
        })
    }

    #[tokio::test]
    async fn test_vehicle_upsert_then_get() {
        let registry = LocalVehicleRegistry::new(memory());
        let ctx = UserContext::anonymous();

        let saved = registry
            .upsert(&ctx, " abc123 ", "Toyota", "Corolla", 50000)
            .await
            .unwrap();
        assert_eq!(saved.registration, "ABC123");

        let got = registry.get(&ctx, "abc123").await.unwrap().unwrap();
        assert_eq!(got.make, "Toyota");
        assert_eq!(got.model, "Corolla");
        assert_eq!(got.mileage, 50000);
        assert!(got.created_at <= got.updated_at);
    }

    #[tokio::test]
    async fn test_vehicle_upsert_twice_keeps_created_at() {
        let registry = LocalVehicleRegistry::new(memory());
        let ctx = UserContext::anonymous();

        let first = registry
            .upsert(&ctx, "ABC123", "Toyota", "Corolla", 50000)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = registry
            .upsert(&ctx, "abc123", "Toyota", "Corolla", 52000)
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(registry.list(&ctx).await.unwrap().len(), 1);
        assert_eq!(registry.get(&ctx, "ABC123").await.unwrap().unwrap().mileage, 52000);
    }

    #[tokio::test]
    async fn test_vehicle_upsert_rejects_blank_registration() {
        let registry = LocalVehicleRegistry::new(memory());
        let err = registry
            .upsert(&UserContext::anonymous(), "  ", "Toyota", "Corolla", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_vehicle_list_search_and_remove() {
        let registry = LocalVehicleRegistry::new(memory());
        let ctx = UserContext::anonymous();
        for reg in ["XYZ789", "ABC123", "ABD999"] {
            registry.upsert(&ctx, reg, "Make", "Model", 1).await.unwrap();
        }

        let list = registry.list(&ctx).await.unwrap();
        let regs: Vec<&str> = list.iter().map(|v| v.registration.as_str()).collect();
        assert_eq!(regs, vec!["ABC123", "ABD999", "XYZ789"]);

        assert_eq!(registry.search(&ctx, "").await.unwrap(), list);
        let hits = registry.search(&ctx, "ab").await.unwrap();
        assert_eq!(hits.len(), 2);

        registry.remove(&ctx, "NOPE000").await.unwrap();
        assert_eq!(registry.list(&ctx).await.unwrap(), list);

        registry.remove(&ctx, "abd999").await.unwrap();
        assert_eq!(registry.list(&ctx).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_vehicle_set_mileage() {
        let registry = LocalVehicleRegistry::new(memory());
        let ctx = UserContext::anonymous();
        assert!(registry.set_mileage(&ctx, "ABC123", 10).await.unwrap().is_none());

        registry.upsert(&ctx, "ABC123", "Toyota", "Corolla", 5).await.unwrap();
        let v = registry.set_mileage(&ctx, "abc123", 10).await.unwrap().unwrap();
        assert_eq!(v.mileage, 10);
        assert_eq!(v.make, "Toyota");
    }

    #[tokio::test]
    async fn test_vehicles_are_scoped_per_user() {
        let registry = LocalVehicleRegistry::new(memory());
        let alice = UserContext::new("alice", None);
        let bob = UserContext::new("bob", None);
        registry.upsert(&alice, "ABC123", "Toyota", "Corolla", 1).await.unwrap();
        assert!(registry.get(&bob, "ABC123").await.unwrap().is_none());
        assert!(registry.list(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_driver_crud() {
        let registry = LocalDriverRegistry::new(memory());
        let ctx = UserContext::anonymous();

        let zoe = registry
            .add(&ctx, NewDriver { name: "zoe".to_string(), ..Default::default() })
            .await
            .unwrap();
        let adam = registry
            .add(&ctx, NewDriver { name: "Adam".to_string(), ..Default::default() })
            .await
            .unwrap();

        let names: Vec<String> = registry
            .list(&ctx)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Adam", "zoe"]);

        let updated = registry
            .update(
                &ctx,
                &zoe.id,
                DriverPatch { phone: Some("555".to_string()), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("555"));
        assert_eq!(updated.created_at, zoe.created_at);

        registry.remove(&ctx, &adam.id).await.unwrap();
        assert!(registry.get(&ctx, &adam.id).await.unwrap().is_none());
        assert_eq!(registry.list(&ctx).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_driver_errors() {
        let registry = LocalDriverRegistry::new(memory());
        let ctx = UserContext::anonymous();

        let err = registry
            .add(&ctx, NewDriver { name: " ".to_string(), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = registry
            .update(&ctx, "missing", DriverPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(registry.list(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inspection_save_list_and_sync() {
        let store = LocalInspectionStore::new(memory());
        let ctx = UserContext::anonymous();

        let older = record("AAA111");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = record("BBB222");
        store.save(&ctx, &older).await.unwrap();
        store.save(&ctx, &newer).await.unwrap();

        let list = store.list(&ctx).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, newer.id);
        assert!(list.iter().all(|r| !r.synced));

        let synced = store.mark_synced(&ctx, &older.id).await.unwrap();
        assert!(synced.synced);
        // saving the unsynced copy again cannot revert the flag
        let stored = store.save(&ctx, &older).await.unwrap();
        assert!(stored.synced);
        assert!(store.get(&ctx, &older.id).await.unwrap().unwrap().synced);

        let err = store.mark_synced(&ctx, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inspection_save_does_not_overwrite_content() {
        let store = LocalInspectionStore::new(memory());
        let ctx = UserContext::anonymous();
        let original = record("AAA111");
        store.save(&ctx, &original).await.unwrap();

        let mut altered = original.clone();
        altered.vehicle.mileage = 1;
        let stored = store.save(&ctx, &altered).await.unwrap();
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn test_inspections_survive_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = UserContext::anonymous();
        let saved = record("ABC123");
        {
            let store = LocalInspectionStore::new(Arc::new(FileKvStore::new(dir.path())));
            store.save(&ctx, &saved).await.unwrap();
        }
        let store = LocalInspectionStore::new(Arc::new(FileKvStore::new(dir.path())));
        let list = store.list(&ctx).await.unwrap();
        assert_eq!(list, vec![saved]);

        store.remove(&ctx, &list[0].id).await.unwrap();
        store.remove(&ctx, &list[0].id).await.unwrap();
        assert!(store.list(&ctx).await.unwrap().is_empty());
    }
}
