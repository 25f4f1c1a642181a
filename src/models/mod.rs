pub mod checklist;
pub mod driver;
pub mod inspection;
pub mod vehicle;

pub use checklist::{
    build_initial, update_item, ChecklistDefinition, ChecklistTree, ItemPatch, ItemState,
    ItemStatus,
};
pub use driver::{Driver, DriverPatch, NewDriver};
pub use inspection::{InspectionDraft, InspectionRecord, InspectionType, VehicleSnapshot};
pub use vehicle::{normalize_registration, Vehicle};
