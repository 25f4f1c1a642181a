use serde::Serialize;

use crate::db::UserContext;
use crate::error::AppResult;
use crate::models::InspectionRecord;
use crate::registry::Backend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pushed: Vec<String>,
    pub failed: Vec<SyncFailure>,
    pub already_synced: usize,
}

/// Copies locally created records to the durable backend.
pub struct SyncService {
    local: Backend,
    remote: Backend,
}

impl SyncService {
    pub fn new(local: Backend, remote: Backend) -> Self {
        Self { local, remote }
    }

    /// One attempt per unsynced record, oldest first so the remote vehicle
    /// ends up with the latest mileage. A failed record stays unsynced and is
    /// listed in the report; the run continues with the next one.
    pub async fn push_unsynced(&self, ctx: &UserContext) -> AppResult<SyncReport> {
        let records = self.local.inspections.list(ctx).await?;
        let mut report = SyncReport::default();

        for record in records.into_iter().rev() {
            if record.synced {
                report.already_synced += 1;
                continue;
            }
            match self.push_one(ctx, &record).await {
                Ok(()) => report.pushed.push(record.id),
                Err(e) => {
                    tracing::warn!("Inspection sync failed: id={}, error={}", record.id, e);
                    report.failed.push(SyncFailure {
                        id: record.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Sync finished: pushed={}, failed={}, already_synced={}",
            report.pushed.len(),
            report.failed.len(),
            report.already_synced
        );
        Ok(report)
    }

    async fn push_one(&self, ctx: &UserContext, record: &InspectionRecord) -> AppResult<()> {
        let vehicle = &record.vehicle;
        self.remote
            .vehicles
            .upsert(
                ctx,
                &vehicle.registration,
                &vehicle.make,
                &vehicle.model,
                vehicle.mileage,
            )
            .await?;

        let mut remote_copy = record.clone();
        remote_copy.mark_synced();
        self.remote.inspections.save(ctx, &remote_copy).await?;
        self.local.inspections.mark_synced(ctx, &record.id).await?;
        tracing::debug!("Inspection pushed: id={}", record.id);
        Ok(())
    }
}
