use serde::{Deserialize, Serialize};

use crate::db::UserContext;
use crate::error::{AppError, AppResult};
use crate::models::{
    build_initial, normalize_registration, ChecklistDefinition, ChecklistTree, InspectionDraft,
    InspectionRecord, InspectionType, Vehicle, VehicleSnapshot,
};
use crate::models::checklist::conforms_to;
use crate::registry::Backend;

/// Distance after which the next inspection should include a service.
pub const SERVICE_INTERVAL: u32 = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInput {
    #[serde(default)]
    pub registration: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    /// Odometer reading as typed; a number is accepted too.
    #[serde(default, deserialize_with = "mileage_text")]
    pub mileage: String,
}

/// Raw input of the inspection form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionForm {
    pub vehicle: VehicleInput,
    /// Defaults to the first type offered by the checklist definition.
    #[serde(default)]
    pub inspection_type: Option<String>,
    /// A fresh all-unset tree is used when absent.
    #[serde(default)]
    pub checklist: Option<ChecklistTree>,
    #[serde(default)]
    pub general_comments: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub signature_data_url: Option<String>,
}

fn mileage_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
        Null(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null(()) => String::new(),
    })
}

/// Empty input counts as zero.
pub fn parse_mileage(input: &str) -> AppResult<u32> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<u32>()
        .map_err(|_| AppError::validation(format!("mileage must be a whole number, got {:?}", trimmed)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReminder {
    pub registration: String,
    pub last_known: u32,
    pub current: u32,
}

impl ServiceReminder {
    pub fn distance(&self) -> u32 {
        self.current.saturating_sub(self.last_known)
    }
}

/// Form workflow: validation, driver lookup, vehicle upsert, record save.
pub struct InspectionService {
    backend: Backend,
    definition: ChecklistDefinition,
}

impl InspectionService {
    pub fn new(backend: Backend, definition: ChecklistDefinition) -> Self {
        Self {
            backend,
            definition,
        }
    }

    pub fn definition(&self) -> &ChecklistDefinition {
        &self.definition
    }

    pub fn new_checklist(&self) -> ChecklistTree {
        build_initial(&self.definition)
    }

    fn inspection_type(&self, requested: Option<&str>) -> AppResult<InspectionType> {
        let offered = self.definition.inspection_types();
        let Some(requested) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
            return offered
                .first()
                .copied()
                .ok_or_else(|| AppError::validation("no inspection types configured"));
        };
        let parsed: InspectionType = requested.parse()?;
        if !offered.contains(&parsed) {
            return Err(AppError::validation(format!(
                "inspection type {} is not offered by this checklist",
                parsed
            )));
        }
        Ok(parsed)
    }

    /// Validates the form and builds an unsaved record. Nothing is written.
    pub async fn build_record(
        &self,
        ctx: &UserContext,
        form: InspectionForm,
    ) -> AppResult<InspectionRecord> {
        let vehicle = &form.vehicle;
        let mileage = parse_mileage(&vehicle.mileage)?;
        let snapshot =
            VehicleSnapshot::new(&vehicle.registration, &vehicle.make, &vehicle.model, mileage)?;
        let inspection_type = self.inspection_type(form.inspection_type.as_deref())?;

        let checklist = match form.checklist {
            Some(tree) => {
                if !conforms_to(&tree, &self.definition) {
                    return Err(AppError::validation(
                        "checklist does not match the checklist definition",
                    ));
                }
                tree
            }
            None => self.new_checklist(),
        };

        let driver_id = form
            .driver_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let driver_name = match &driver_id {
            Some(id) => {
                let driver = self
                    .backend
                    .drivers
                    .get(ctx, id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("driver {}", id)))?;
                Some(driver.name)
            }
            None => None,
        };

        Ok(InspectionRecord::create(InspectionDraft {
            inspection_type,
            vehicle: snapshot,
            checklist,
            general_comments: form.general_comments,
            inspector_name: ctx.display_name.clone(),
            driver_id,
            driver_name,
            signature_data_url: form.signature_data_url,
        }))
    }

    /// Saves the form: upserts the vehicle with the entered mileage, then
    /// persists the record. If the record cannot be written the vehicle is
    /// put back the way it was.
    pub async fn save(&self, ctx: &UserContext, form: InspectionForm) -> AppResult<InspectionRecord> {
        let mut record = self.build_record(ctx, form).await?;
        let vehicle = &record.vehicle;
        let previous = self.backend.vehicles.get(ctx, &vehicle.registration).await?;
        self.backend
            .vehicles
            .upsert(
                ctx,
                &vehicle.registration,
                &vehicle.make,
                &vehicle.model,
                vehicle.mileage,
            )
            .await?;

        if self.backend.mode.is_durable() {
            record.mark_synced();
        }
        let stored = match self.backend.inspections.save(ctx, &record).await {
            Ok(stored) => stored,
            Err(e) => {
                self.restore_vehicle(ctx, &record.vehicle.registration, previous)
                    .await;
                return Err(e);
            }
        };

        tracing::info!(
            "Inspection saved: id={}, registration={}, type={}, synced={}",
            stored.id,
            stored.vehicle.registration,
            stored.inspection_type,
            stored.synced
        );
        Ok(stored)
    }

    async fn restore_vehicle(
        &self,
        ctx: &UserContext,
        registration: &str,
        previous: Option<Vehicle>,
    ) {
        let restored = match &previous {
            Some(v) => self
                .backend
                .vehicles
                .upsert(ctx, &v.registration, &v.make, &v.model, v.mileage)
                .await
                .map(|_| ()),
            None => self.backend.vehicles.remove(ctx, registration).await,
        };
        match restored {
            Ok(()) => tracing::info!(
                "Vehicle restored after failed save: registration={}, existed={}",
                registration,
                previous.is_some()
            ),
            Err(e) => tracing::error!(
                "Vehicle could not be restored after failed save: registration={}, error={}",
                registration,
                e
            ),
        }
    }

    /// Reminder when `mileage` is at least [`SERVICE_INTERVAL`] past the last
    /// known reading of a registered vehicle.
    pub async fn service_due(
        &self,
        ctx: &UserContext,
        registration: &str,
        mileage: u32,
    ) -> AppResult<Option<ServiceReminder>> {
        let registration = normalize_registration(registration);
        let Some(vehicle) = self.backend.vehicles.get(ctx, &registration).await? else {
            return Ok(None);
        };
        let last_known = vehicle.mileage;
        if last_known == 0 || mileage.saturating_sub(last_known) < SERVICE_INTERVAL {
            return Ok(None);
        }
        Ok(Some(ServiceReminder {
            registration,
            last_known,
            current: mileage,
        }))
    }

    pub async fn list(&self, ctx: &UserContext) -> AppResult<Vec<InspectionRecord>> {
        self.backend.inspections.list(ctx).await
    }

    pub async fn get(&self, ctx: &UserContext, id: &str) -> AppResult<InspectionRecord> {
        self.backend
            .inspections
            .get(ctx, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("inspection {}", id)))
    }

    pub async fn remove(&self, ctx: &UserContext, id: &str) -> AppResult<()> {
        self.backend.inspections.remove(ctx, id).await
    }
}
