use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted by `DriverRegistry::add`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDriver {
    pub name: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Partial update; `None` leaves the field untouched, an empty string clears
/// `license`/`phone`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Driver {
    /// Builds a new driver with a generated id. Fails if the name is blank.
    pub fn create(input: NewDriver) -> AppResult<Self> {
        let name = validate_name(&input.name)?;
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            license: optional_field(input.license),
            phone: optional_field(input.phone),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, patch: DriverPatch) -> AppResult<()> {
        if let Some(name) = patch.name {
            self.name = validate_name(&name)?;
        }
        if let Some(license) = patch.license {
            self.license = optional_field(Some(license));
        }
        if let Some(phone) = patch.phone {
            self.phone = optional_field(Some(phone));
        }
        let now = Utc::now();
        self.updated_at = if now > self.updated_at { now } else { self.updated_at };
        Ok(())
    }
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("driver name is required"));
    }
    Ok(name.to_string())
}

fn optional_field(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Case-insensitive name ordering with a byte-wise tie break, so "alice"
/// sorts next to "Alice" and the order stays total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn sort_by_name(drivers: &mut [Driver]) {
    drivers.sort_by(|a, b| compare_names(&a.name, &b.name).then_with(|| a.id.cmp(&b.id)));
}

/// Row of the `drivers` table.
#[derive(Debug, Clone, FromRow)]
pub struct DriverRow {
    pub id: String,
    pub name: String,
    pub license: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DriverRow> for Driver {
    fn from(row: DriverRow) -> Self {
        Driver {
            id: row.id,
            name: row.name,
            license: row.license,
            phone: row.phone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_trims_and_validates() {
        let driver = Driver::create(NewDriver {
            name: "  Jane Doe ".to_string(),
            license: Some(" ".to_string()),
            phone: Some("555-0100".to_string()),
        })
        .unwrap();
        assert_eq!(driver.name, "Jane Doe");
        assert_eq!(driver.license, None);
        assert_eq!(driver.phone.as_deref(), Some("555-0100"));
        assert_eq!(driver.created_at, driver.updated_at);

        let err = Driver::create(NewDriver {
            name: "   ".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_apply_patch() {
        let mut driver = Driver::create(NewDriver {
            name: "Jane".to_string(),
            license: Some("L-1".to_string()),
            phone: None,
        })
        .unwrap();
        let created = driver.created_at;

        driver
            .apply(DriverPatch {
                license: Some(String::new()),
                phone: Some("555".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(driver.name, "Jane");
        assert_eq!(driver.license, None);
        assert_eq!(driver.phone.as_deref(), Some("555"));
        assert_eq!(driver.created_at, created);
        assert!(driver.updated_at >= created);

        let err = driver
            .apply(DriverPatch {
                name: Some(" ".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_compare_names_ignores_case() {
        let mut names = vec!["bob", "Alice", "alice", "Carol"];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(names, vec!["Alice", "alice", "bob", "Carol"]);
    }
}
