use sqlx::PgPool;

use crate::error::AppResult;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS vehicles (
        registration TEXT NOT NULL,
        make TEXT NOT NULL,
        model TEXT NOT NULL,
        mileage BIGINT NOT NULL DEFAULT 0,
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (user_id, registration)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS drivers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        license TEXT,
        phone TEXT,
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inspections (
        id TEXT PRIMARY KEY,
        -- json rather than jsonb: jsonb reorders object keys
        checklist JSON NOT NULL,
        inspection_type TEXT NOT NULL CHECK (inspection_type IN ('Initial', 'Second', 'Final')),
        vehicle_registration TEXT NOT NULL,
        vehicle_make TEXT NOT NULL,
        vehicle_model TEXT NOT NULL,
        vehicle_mileage BIGINT NOT NULL DEFAULT 0,
        driver_id TEXT,
        driver_name TEXT,
        general_comments TEXT,
        inspector_name TEXT,
        signature_data_url TEXT,
        synced BOOLEAN NOT NULL DEFAULT FALSE,
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_drivers_user ON drivers (user_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_inspections_user ON inspections (user_id, created_at DESC)",
];

/// Creates the vehicles/drivers/inspections tables when they are missing.
pub async fn ensure_schema(pool: &PgPool) -> AppResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Schema ensured ({} statements)", SCHEMA.len());
    Ok(())
}
