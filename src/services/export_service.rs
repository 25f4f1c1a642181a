use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::export::{export_pdf, LayoutOptions};
use crate::models::InspectionRecord;

pub struct ExportService {
    options: LayoutOptions,
}

impl ExportService {
    pub fn new(options: LayoutOptions) -> Self {
        Self { options }
    }

    /// Renders `record` and writes it into `dir` under its export filename.
    /// The file only appears once fully written.
    pub async fn export(&self, record: &InspectionRecord, dir: &Path) -> AppResult<PathBuf> {
        let document = export_pdf(record, &self.options)?;

        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::Export(format!("failed to create {}: {}", dir.display(), e))
        })?;
        let path = dir.join(&document.filename);
        let tmp = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp, &document.bytes)
            .await
            .map_err(|e| AppError::Export(format!("failed to write {}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Export(format!(
                "failed to write {}: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            "Inspection exported: id={}, path={}, pages={}, size={}",
            record.id,
            path.display(),
            document.page_count,
            document.bytes.len()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::layout::tests::record_with;

    #[tokio::test]
    async fn test_export_writes_named_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let record = record_with(2, 4);

        let path = ExportService::new(LayoutOptions::default())
            .export(&record, &out)
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_JANEDOE_SAMINSPECTOR_ABC123.pdf"));
        let bytes = tokio::fs::read(&path).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let leftovers: Vec<_> = std::fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_export_into_unwritable_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = ExportService::new(LayoutOptions::default())
            .export(&record_with(1, 1), &blocker.join("sub"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Export(_)));
    }
}
