use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{AppError, AppResult};

use super::{KvStore, Namespace};

const EXTENSION: &str = "json";

/// One JSON file per key under `<root>/<scope>/<partition>/`.
///
/// Keys and scopes are percent-encoded so arbitrary strings map to safe
/// file names.
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self, ns: Namespace<'_>) -> PathBuf {
        self.root
            .join(encode_segment(ns.scope))
            .join(ns.partition.name())
    }

    fn path(&self, ns: Namespace<'_>, key: &str) -> PathBuf {
        self.dir(ns)
            .join(format!("{}.{}", encode_segment(key), EXTENSION))
    }
}

// Dots are encoded too so "." and ".." can never name a directory.
fn encode_segment(raw: &str) -> String {
    urlencoding::encode(raw).replace('.', "%2E")
}

fn storage_err(action: &str, path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::Storage(format!("{} {} failed: {}", action, path.display(), e))
}

#[async_trait::async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, ns: Namespace<'_>, key: &str) -> AppResult<Option<Value>> {
        let path = self.path(ns, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!("kv get: path={}", path.display());
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_err("read", &path, e)),
        }
    }

    async fn set(&self, ns: Namespace<'_>, key: &str, value: Value) -> AppResult<()> {
        let dir = self.dir(ns);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_err("create", &dir, e))?;

        let path = self.path(ns, key);
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        let bytes = serde_json::to_vec_pretty(&value)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_err("write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_err("rename", &path, e))?;

        tracing::debug!("kv set: path={}, size={}", path.display(), bytes.len());
        Ok(())
    }

    async fn iterate(&self, ns: Namespace<'_>) -> AppResult<Vec<(String, Value)>> {
        let dir = self.dir(ns);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err("list", &dir, e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("list", &dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = urlencoding::decode(stem)
                .map_err(|e| storage_err("decode key of", &path, e))?
                .into_owned();
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| storage_err("read", &path, e))?;
            out.push((key, serde_json::from_slice(&bytes)?));
        }
        Ok(out)
    }

    async fn remove(&self, ns: Namespace<'_>, key: &str) -> AppResult<()> {
        let path = self.path(ns, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("kv remove: path={}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err("remove", &path, e)),
        }
    }

    fn backend(&self) -> &'static str {
        "fs"
    }
}
