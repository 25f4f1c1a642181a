pub mod export_service;
pub mod inspection_service;
pub mod sync_service;

pub use export_service::ExportService;
pub use inspection_service::{
    parse_mileage, InspectionForm, InspectionService, ServiceReminder, VehicleInput,
    SERVICE_INTERVAL,
};
pub use sync_service::{SyncFailure, SyncReport, SyncService};
