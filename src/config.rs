use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::db::DEFAULT_USER_ID;
use crate::error::{AppError, AppResult};

/// Where registries and inspections are persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// JSON files under `DATA_DIR` (offline mode).
    Local,
    /// Process memory only; nothing survives a restart.
    Memory,
    /// Postgres, scoped by user id.
    Cloud,
}

impl StorageMode {
    /// Records written here count as synced.
    pub fn is_durable(&self) -> bool {
        matches!(self, StorageMode::Cloud)
    }
}

impl FromStr for StorageMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "offline" => Ok(StorageMode::Local),
            "memory" => Ok(StorageMode::Memory),
            "cloud" | "postgres" => Ok(StorageMode::Cloud),
            other => Err(AppError::Config(format!("unknown STORAGE_MODE: {}", other))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub storage_mode: StorageMode,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub user_id: String,
    pub inspector_name: Option<String>,
    pub checklist_path: Option<PathBuf>,
    pub export_dir: PathBuf,
    pub display_timezone: Tz,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let storage_mode = match env::var("STORAGE_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => StorageMode::Local,
        };

        let display_timezone = match env::var("DISPLAY_TIMEZONE") {
            Ok(value) => value
                .parse::<Tz>()
                .map_err(|e| AppError::Config(format!("invalid DISPLAY_TIMEZONE: {}", e)))?,
            Err(_) => Tz::UTC,
        };

        let config = Config {
            storage_mode,
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            database_url: non_empty_var("DATABASE_URL"),
            user_id: non_empty_var("USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            inspector_name: non_empty_var("INSPECTOR_NAME"),
            checklist_path: non_empty_var("CHECKLIST_PATH").map(PathBuf::from),
            export_dir: env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./exports")),
            display_timezone,
        };

        if config.storage_mode == StorageMode::Cloud && config.database_url.is_none() {
            return Err(AppError::Config(
                "DATABASE_URL is required when STORAGE_MODE=cloud".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn require_database_url(&self) -> AppResult<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
