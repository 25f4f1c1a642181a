use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

use super::checklist::ChecklistTree;
use super::vehicle::{mileage_from_db, normalize_registration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InspectionType {
    Initial,
    Second,
    Final,
}

impl InspectionType {
    pub const ALL: [InspectionType; 3] = [
        InspectionType::Initial,
        InspectionType::Second,
        InspectionType::Final,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionType::Initial => "Initial",
            InspectionType::Second => "Second",
            InspectionType::Final => "Final",
        }
    }
}

impl fmt::Display for InspectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InspectionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::validation(format!("unknown inspection type: {}", s)))
    }
}

/// Vehicle as it was when the inspection was saved; later registry edits
/// do not touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub registration: String,
    pub make: String,
    pub model: String,
    pub mileage: u32,
}

impl VehicleSnapshot {
    pub fn new(registration: &str, make: &str, model: &str, mileage: u32) -> AppResult<Self> {
        let snapshot = Self {
            registration: normalize_registration(registration),
            make: make.trim().to_string(),
            model: model.trim().to_string(),
            mileage,
        };
        let mut missing = Vec::new();
        if snapshot.make.is_empty() {
            missing.push("make");
        }
        if snapshot.model.is_empty() {
            missing.push("model");
        }
        if snapshot.registration.is_empty() {
            missing.push("registration");
        }
        if !missing.is_empty() {
            return Err(AppError::validation(format!(
                "vehicle {} required",
                missing.join(", ")
            )));
        }
        Ok(snapshot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub inspection_type: InspectionType,
    pub vehicle: VehicleSnapshot,
    pub checklist: ChecklistTree,
    #[serde(default)]
    pub general_comments: Option<String>,
    #[serde(default)]
    pub inspector_name: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    /// Name at save time, kept even if the driver is later renamed or removed.
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub signature_data_url: Option<String>,
    #[serde(default)]
    pub synced: bool,
}

/// Everything needed to create a record except the generated id/timestamp.
#[derive(Debug, Clone)]
pub struct InspectionDraft {
    pub inspection_type: InspectionType,
    pub vehicle: VehicleSnapshot,
    pub checklist: ChecklistTree,
    pub general_comments: Option<String>,
    pub inspector_name: Option<String>,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub signature_data_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl InspectionRecord {
    pub fn create(draft: InspectionDraft) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            inspection_type: draft.inspection_type,
            vehicle: draft.vehicle,
            checklist: draft.checklist,
            general_comments: non_blank(draft.general_comments),
            inspector_name: non_blank(draft.inspector_name),
            driver_id: non_blank(draft.driver_id),
            driver_name: non_blank(draft.driver_name),
            signature_data_url: non_blank(draft.signature_data_url),
            synced: false,
        }
    }

    /// Flips `synced` to true. Returns false if it already was.
    pub fn mark_synced(&mut self) -> bool {
        if self.synced {
            return false;
        }
        self.synced = true;
        true
    }
}

/// Row of the `inspections` table. The checklist is selected as text so
/// its key order survives.
#[derive(Debug, Clone, FromRow)]
pub struct InspectionRow {
    pub id: String,
    pub checklist: String,
    pub inspection_type: String,
    pub vehicle_registration: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub vehicle_mileage: i64,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub general_comments: Option<String>,
    pub inspector_name: Option<String>,
    pub signature_data_url: Option<String>,
    pub synced: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InspectionRow> for InspectionRecord {
    type Error = AppError;

    fn try_from(row: InspectionRow) -> AppResult<Self> {
        let checklist: ChecklistTree = serde_json::from_str(&row.checklist)?;
        let inspection_type = row
            .inspection_type
            .parse()
            .map_err(|_| AppError::Storage(format!("bad inspection_type: {}", row.inspection_type)))?;
        Ok(InspectionRecord {
            id: row.id,
            created_at: row.created_at,
            inspection_type,
            vehicle: VehicleSnapshot {
                registration: row.vehicle_registration,
                make: row.vehicle_make,
                model: row.vehicle_model,
                mileage: mileage_from_db(row.vehicle_mileage)?,
            },
            checklist,
            general_comments: row.general_comments,
            inspector_name: row.inspector_name,
            driver_id: row.driver_id,
            driver_name: row.driver_name,
            signature_data_url: row.signature_data_url,
            synced: row.synced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checklist::{build_initial, tests::two_by_two};

    fn draft() -> InspectionDraft {
        InspectionDraft {
            inspection_type: InspectionType::Initial,
            vehicle: VehicleSnapshot::new("abc123", "Toyota", "Corolla", 50000).unwrap(),
            checklist: build_initial(&two_by_two()),
            general_comments: Some("  ".to_string()),
            inspector_name: None,
            driver_id: None,
            driver_name: Some("Jane Doe".to_string()),
            signature_data_url: None,
        }
    }

    #[test]
    fn test_inspection_type_parse() {
        assert_eq!("initial".parse::<InspectionType>().unwrap(), InspectionType::Initial);
        assert_eq!("Final".parse::<InspectionType>().unwrap(), InspectionType::Final);
        assert!(matches!(
            "Weekly".parse::<InspectionType>(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_snapshot_requires_vehicle_fields() {
        let err = VehicleSnapshot::new(" ", "Toyota", "", 0).unwrap_err();
        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("model"));
                assert!(msg.contains("registration"));
                assert!(!msg.contains("make"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_create_record() {
        let record = InspectionRecord::create(draft());
        assert!(!record.synced);
        assert_eq!(record.vehicle.registration, "ABC123");
        assert_eq!(record.general_comments, None);
        assert_eq!(record.driver_name.as_deref(), Some("Jane Doe"));
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
    }

    #[test]
    fn test_mark_synced_is_one_way() {
        let mut record = InspectionRecord::create(draft());
        assert!(record.mark_synced());
        assert!(record.synced);
        assert!(!record.mark_synced());
        assert!(record.synced);
    }

    #[test]
    fn test_record_json_shape() {
        let record = InspectionRecord::create(draft());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["inspectionType"], "Initial");
        assert_eq!(value["vehicle"]["mileage"], 50000);
        assert_eq!(value["synced"], false);
        assert_eq!(value["checklist"]["tyres"]["front_left"]["status"], "unset");

        let back: InspectionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
