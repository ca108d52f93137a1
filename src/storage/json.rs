//! JSON file grant source

use crate::auth::Grant;
use crate::storage::{GrantSource, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Grants read from a JSON array on disk
///
/// ```json
/// [{"role": "editor", "route": "/articles/{id}", "method": "PUT",
///   "from": "2024-01-01T00:00:00Z", "to": "2030-01-01T00:00:00Z"}]
/// ```
#[derive(Debug, Clone)]
pub struct JsonGrantFile {
    path: PathBuf,
}

impl JsonGrantFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl GrantSource for JsonGrantFile {
    async fn load_grants(&self) -> Result<Vec<Grant>, StorageError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| StorageError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let grants: Vec<Grant> =
            serde_json::from_slice(&raw).map_err(|e| StorageError::Serialization(e.to_string()))?;

        debug!(path = %self.path.display(), count = grants.len(), "Read grant file");
        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::GrantTable;
    use chrono::Utc;

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        std::fs::write(
            &path,
            r#"[
                {"role": "editor", "route": "/articles/{id}", "method": "PUT",
                 "from": "2000-01-01T00:00:00Z", "to": "2999-01-01T00:00:00Z"},
                {"role": "viewer", "route": "/articles/{id}", "method": "GET",
                 "from": "2000-01-01T00:00:00Z", "to": "2001-01-01T00:00:00Z"}
            ]"#,
        )
        .unwrap();

        let source = JsonGrantFile::new(&path);
        let table = GrantTable::new();
        let snapshot = table.reload_from(&source).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(table.valid("editor", "/articles/{id}", "PUT", Utc::now()));
        assert!(!table.valid("viewer", "/articles/{id}", "GET", Utc::now()));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        std::fs::write(&path, "not json").unwrap();

        let now = Utc::now();
        let table = GrantTable::new();
        table.load([Grant::new(
            "editor",
            "/a",
            "GET",
            now - chrono::Duration::hours(1),
            now + chrono::Duration::hours(1),
        )]);

        let err = table.reload_from(&JsonGrantFile::new(&path)).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(table.valid("editor", "/a", "GET", now));

        let missing = JsonGrantFile::new(dir.path().join("missing.json"));
        assert!(matches!(missing.load_grants().await, Err(StorageError::Io { .. })));
    }
}
