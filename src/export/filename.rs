use std::sync::LazyLock;

use regex::Regex;

use crate::models::InspectionRecord;

const UNKNOWN: &str = "UNKNOWN";

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Path separators and characters most filesystems reject.
static RE_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|]"#).unwrap());

fn component(value: Option<&str>) -> String {
    let cleaned = value
        .map(|v| RE_WHITESPACE.replace_all(v, "").to_uppercase())
        .map(|v| RE_UNSAFE.replace_all(&v, "-").into_owned())
        .unwrap_or_default();
    if cleaned.is_empty() {
        UNKNOWN.to_string()
    } else {
        cleaned
    }
}

/// `<YYYYMMDD>_<DRIVER>_<INSPECTOR>_<REGISTRATION>.pdf`, date taken from the
/// UTC calendar day of `created_at`.
pub fn export_filename(record: &InspectionRecord) -> String {
    format!(
        "{}_{}_{}_{}.pdf",
        record.created_at.format("%Y%m%d"),
        component(record.driver_name.as_deref()),
        component(record.inspector_name.as_deref()),
        component(Some(&record.vehicle.registration)),
    )
}
