//! Inspection report export.
//!
//! [`layout`] turns a record into positioned pages, [`pdf`] writes them out,
//! [`filename`] names the result.

pub mod filename;
pub mod layout;
pub mod pdf;
pub mod signature;

use crate::error::AppResult;
use crate::models::InspectionRecord;

pub use filename::export_filename;
pub use layout::{layout, Document, LayoutOptions};

/// A rendered report, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

pub fn export_pdf(record: &InspectionRecord, options: &LayoutOptions) -> AppResult<ExportedDocument> {
    let document = layout(record, options);
    let bytes = pdf::render(&document)?;
    Ok(ExportedDocument {
        filename: export_filename(record),
        bytes,
        page_count: document.page_count(),
    })
}
