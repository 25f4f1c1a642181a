use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Canonical registry key: trimmed and uppercased.
pub fn normalize_registration(registration: &str) -> String {
    registration.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub registration: String,
    pub make: String,
    pub model: String,
    /// Last known odometer reading.
    pub mileage: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn new(registration: &str, make: &str, model: &str, mileage: u32) -> Self {
        let now = Utc::now();
        Self {
            registration: normalize_registration(registration),
            make: make.trim().to_string(),
            model: model.trim().to_string(),
            mileage,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an upsert on top of an existing entry: keeps `created_at`,
    /// overwrites everything else.
    pub fn upserted(
        existing: Option<&Vehicle>,
        registration: &str,
        make: &str,
        model: &str,
        mileage: u32,
    ) -> Self {
        let mut vehicle = Vehicle::new(registration, make, model, mileage);
        if let Some(existing) = existing {
            vehicle.created_at = existing.created_at;
            if vehicle.updated_at < existing.updated_at {
                vehicle.updated_at = existing.updated_at;
            }
        }
        vehicle
    }
}

/// Row of the `vehicles` table.
#[derive(Debug, Clone, FromRow)]
pub struct VehicleRow {
    pub registration: String,
    pub make: String,
    pub model: String,
    pub mileage: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<VehicleRow> for Vehicle {
    type Error = AppError;

    fn try_from(row: VehicleRow) -> AppResult<Self> {
        Ok(Vehicle {
            mileage: mileage_from_db(row.mileage)?,
            registration: row.registration,
            make: row.make,
            model: row.model,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn mileage_from_db(value: i64) -> AppResult<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::Storage(format!("mileage out of range in database: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_registration() {
        assert_eq!(normalize_registration("  abc 123 "), "ABC 123");
        assert_eq!(normalize_registration(""), "");
    }

    #[test]
    fn test_upserted_preserves_created_at() {
        let original = Vehicle::new("abc123", "Toyota", "Corolla", 50000);
        let updated = Vehicle::upserted(Some(&original), "ABC123", "Toyota", "Yaris", 51000);
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at >= original.updated_at);
        assert_eq!(updated.model, "Yaris");
        assert_eq!(updated.mileage, 51000);
    }

    #[test]
    fn test_row_with_negative_mileage_is_rejected() {
        let row = VehicleRow {
            registration: "ABC123".to_string(),
            make: "Toyota".to_string(),
            model: "Corolla".to_string(),
            mileage: -1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(Vehicle::try_from(row), Err(AppError::Storage(_))));
    }
}
