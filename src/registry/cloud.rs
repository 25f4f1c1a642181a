use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::UserContext;
use crate::error::{AppError, AppResult};
use crate::models::driver::{sort_by_name, DriverRow};
use crate::models::inspection::InspectionRow;
use crate::models::vehicle::VehicleRow;
use crate::models::{normalize_registration, Driver, DriverPatch, InspectionRecord, NewDriver, Vehicle};

use super::{DriverRegistry, InspectionStore, VehicleRegistry};

const VEHICLE_COLUMNS: &str = "registration, make, model, mileage, created_at, updated_at";

const DRIVER_COLUMNS: &str = "id, name, license, phone, created_at, updated_at";

const INSPECTION_COLUMNS: &str = r#"
    id, checklist::text AS checklist, inspection_type, vehicle_registration, vehicle_make,
    vehicle_model, vehicle_mileage, driver_id, driver_name, general_comments, inspector_name,
    signature_data_url, synced, created_at
"#;

pub struct PgVehicleRegistry {
    pool: PgPool,
}

impl PgVehicleRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VehicleRegistry for PgVehicleRegistry {
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

        // created_at is only set on insert, so an update keeps it
        let row = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            INSERT INTO vehicles (registration, make, model, mileage, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (user_id, registration) DO UPDATE
                SET make = EXCLUDED.make,
                    model = EXCLUDED.model,
                    mileage = EXCLUDED.mileage,
                    updated_at = GREATEST(NOW(), vehicles.updated_at)
            RETURNING {}
            "#,
            VEHICLE_COLUMNS
        ))
        .bind(&key)
        .bind(make.trim())
        .bind(model.trim())
        .bind(i64::from(mileage))
        .bind(&ctx.user_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Vehicle upserted: backend=postgres, registration={}", key);
        row.try_into()
    }

    async fn get(&self, ctx: &UserContext, registration: &str) -> AppResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM vehicles WHERE registration = $1 AND user_id = $2",
            VEHICLE_COLUMNS
        ))
        .bind(normalize_registration(registration))
        .bind(&ctx.user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Vehicle::try_from).transpose()
    }

    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<Vehicle>> {
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM vehicles WHERE user_id = $1 ORDER BY registration",
            VEHICLE_COLUMNS
        ))
        .bind(&ctx.user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Vehicle::try_from).collect()
    }

    async fn search(&self, ctx: &UserContext, query: &str) -> AppResult<Vec<Vehicle>> {
        let query = normalize_registration(query);
        if query.is_empty() {
            return self.list(ctx).await;
        }
        let rows = sqlx::query_as::<_, VehicleRow>(&format!(
            "SELECT {} FROM vehicles WHERE user_id = $1 AND strpos(registration, $2) > 0 ORDER BY registration",
            VEHICLE_COLUMNS
        ))
        .bind(&ctx.user_id)
        .bind(&query)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Vehicle::try_from).collect()
    }

    async fn remove(&self, ctx: &UserContext, registration: &str) -> AppResult<()> {
        let key = normalize_registration(registration);
        let result = sqlx::query("DELETE FROM vehicles WHERE registration = $1 AND user_id = $2")
            .bind(&key)
            .bind(&ctx.user_id)
            .execute(&self.pool)
            .await?;
        tracing::info!(
            "Vehicle removed: registration={}, rows={}",
            key,
            result.rows_affected()
        );
        Ok(())
    }

    async fn set_mileage(
        &self,
        ctx: &UserContext,
        registration: &str,
        mileage: u32,
    ) -> AppResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(&format!(
            r#"
            UPDATE vehicles SET mileage = $1, updated_at = GREATEST(NOW(), updated_at)
            WHERE registration = $2 AND user_id = $3
            RETURNING {}
            "#,
            VEHICLE_COLUMNS
        ))
        .bind(i64::from(mileage))
        .bind(normalize_registration(registration))
        .bind(&ctx.user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Vehicle::try_from).transpose()
    }
}

pub struct PgDriverRegistry {
    pool: PgPool,
}

impl PgDriverRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriverRegistry for PgDriverRegistry {
    async fn add(&self, ctx: &UserContext, driver: NewDriver) -> AppResult<Driver> {
        let driver = Driver::create(driver)?;
        sqlx::query(
            r#"
            INSERT INTO drivers (id, name, license, phone, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&driver.id)
        .bind(&driver.name)
        .bind(&driver.license)
        .bind(&driver.phone)
        .bind(&ctx.user_id)
        .bind(driver.created_at)
        .bind(driver.updated_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Driver added: backend=postgres, id={}", driver.id);
        Ok(driver)
    }

    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<Driver>> {
        let rows = sqlx::query_as::<_, DriverRow>(&format!(
            "SELECT {} FROM drivers WHERE user_id = $1",
            DRIVER_COLUMNS
        ))
        .bind(&ctx.user_id)
        .fetch_all(&self.pool)
        .await?;
        // sorted here so both backends order names the same way
        let mut drivers: Vec<Driver> = rows.into_iter().map(Driver::from).collect();
        sort_by_name(&mut drivers);
        Ok(drivers)
    }

    async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<Option<Driver>> {
        let row = sqlx::query_as::<_, DriverRow>(&format!(
            "SELECT {} FROM drivers WHERE id = $1 AND user_id = $2",
            DRIVER_COLUMNS
        ))
        .bind(id)
        .bind(&ctx.user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Driver::from))
    }

    async fn update(&self, ctx: &UserContext, id: &str, patch: DriverPatch) -> AppResult<Driver> {
        let mut driver = self
            .get(ctx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("driver {}", id)))?;
        driver.apply(patch)?;

        let result = sqlx::query(
            r#"
            UPDATE drivers SET name = $1, license = $2, phone = $3, updated_at = $4
            WHERE id = $5 AND user_id = $6
            "#,
        )
        .bind(&driver.name)
        .bind(&driver.license)
        .bind(&driver.phone)
        .bind(driver.updated_at)
        .bind(id)
        .bind(&ctx.user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("driver {}", id)));
        }
        tracing::info!("Driver updated: backend=postgres, id={}", id);
        Ok(driver)
    }

    async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM drivers WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(&ctx.user_id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Driver removed: backend=postgres, id={}", id);
        Ok(())
    }
}

pub struct PgInspectionStore {
    pool: PgPool,
}

impl PgInspectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InspectionStore for PgInspectionStore {
    async fn save(
        &self,
        ctx: &UserContext,
        record: &InspectionRecord,
    ) -> AppResult<InspectionRecord> {
        let checklist = serde_json::to_string(&record.checklist)?;

        // An existing row keeps its content; only synced may flip to true.
        let row = sqlx::query_as::<_, InspectionRow>(&format!(
            r#"
            INSERT INTO inspections (
                id, checklist, inspection_type,
                vehicle_registration, vehicle_make, vehicle_model, vehicle_mileage,
                driver_id, driver_name, general_comments, inspector_name,
                signature_data_url, synced, user_id, created_at, updated_at
            ) VALUES (
                $1, $2::json, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW()
            )
            ON CONFLICT (id) DO UPDATE
                SET synced = inspections.synced OR EXCLUDED.synced,
                    updated_at = NOW()
                WHERE inspections.user_id = EXCLUDED.user_id
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        ))
        .bind(&record.id)
        .bind(&checklist)
        .bind(record.inspection_type.as_str())
        .bind(&record.vehicle.registration)
        .bind(&record.vehicle.make)
        .bind(&record.vehicle.model)
        .bind(i64::from(record.vehicle.mileage))
        .bind(&record.driver_id)
        .bind(&record.driver_name)
        .bind(&record.general_comments)
        .bind(&record.inspector_name)
        .bind(&record.signature_data_url)
        .bind(record.synced)
        .bind(&ctx.user_id)
        .bind(record.created_at)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| {
            AppError::Storage(format!("inspection id {} belongs to another user", record.id))
        })?;
        tracing::info!(
            "Inspection saved: backend=postgres, id={}, registration={}",
            record.id,
            record.vehicle.registration
        );
        row.try_into()
    }

    async fn list(&self, ctx: &UserContext) -> AppResult<Vec<InspectionRecord>> {
        let rows = sqlx::query_as::<_, InspectionRow>(&format!(
            "SELECT {} FROM inspections WHERE user_id = $1 ORDER BY created_at DESC, id",
            INSPECTION_COLUMNS
        ))
        .bind(&ctx.user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(InspectionRecord::try_from).collect()
    }

    async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<Option<InspectionRecord>> {
        let row = sqlx::query_as::<_, InspectionRow>(&format!(
            "SELECT {} FROM inspections WHERE id = $1 AND user_id = $2",
            INSPECTION_COLUMNS
        ))
        .bind(id)
        .bind(&ctx.user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(InspectionRecord::try_from).transpose()
    }

    async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM inspections WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(&ctx.user_id)
            .execute(&self.pool)
            .await?;
        tracing::info!("Inspection removed: backend=postgres, id={}", id);
        Ok(())
    }

    async fn mark_synced(&self, ctx: &UserContext, id: &str) -> AppResult<InspectionRecord> {
        let row = sqlx::query_as::<_, InspectionRow>(&format!(
            r#"
            UPDATE inspections SET synced = TRUE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        ))
        .bind(id)
        .bind(&ctx.user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("inspection {}", id)))?;
        row.try_into()
    }
}
