// backupclerk/src/mirror/manifest.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;

use super::WrittenFile;
use crate::errors::{ClerkError, Result};
use crate::remote::BackupRecord;

/// Per-instance index of downloaded backups, keyed by backup id.
///
/// Only an index: whether a backup is present locally is decided by its
/// file name alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub database_name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub sha256: String,
    pub downloaded_at: DateTime<Utc>,
}

impl Manifest {
    /// Reads the manifest at `path`; a missing file is an empty manifest.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            ClerkError::Config(format!("manifest path {} has no parent", path.display()))
        })?;
        tokio::fs::create_dir_all(parent).await?;

        let body = serde_json::to_vec_pretty(self)?;
        let mut partial = tempfile::Builder::new()
            .prefix(".manifest-")
            .tempfile_in(parent)?;
        partial.write_all(&body)?;
        partial.as_file().sync_all()?;
        partial.persist(path).map_err(|e| ClerkError::Io(e.error))?;
        Ok(())
    }

    pub fn record(&mut self, backup: &BackupRecord, file_name: &str, written: &WrittenFile) {
        self.entries.insert(
            backup.id.clone(),
            ManifestEntry {
                file_name: file_name.to_string(),
                database_name: backup.database_name.clone(),
                created_at: backup.created_at,
                size_bytes: written.bytes,
                sha256: written.sha256.clone(),
                downloaded_at: Utc::now(),
            },
        );
    }

    /// Drops entries whose file is not in `present`; returns how many went.
    pub fn retain_files(&mut self, present: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| present.contains(&entry.file_name));
        before - self.entries.len()
    }

    pub fn backup_for_file(&self, file_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.file_name == file_name)
            .map(|(id, _)| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::backup;
    use std::path::PathBuf;

    fn written(bytes: u64) -> WrittenFile {
        WrittenFile {
            path: PathBuf::from("unused"),
            bytes,
            sha256: "ab".repeat(32),
        }
    }

    #[tokio::test]
    async fn test_missing_manifest_loads_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let manifest = Manifest::load(&dir.path().join("absent.json")).await?;
        assert!(manifest.entries.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".manifests").join("fr-par__abc123.json");
        let record = backup("b-1", "db1", "2023-01-01T00:00:00Z");
        let mut manifest = Manifest::default();
        manifest.record(&record, "db1_2023-01-01T00:00:00Z", &written(12));

        manifest.save(&path).await?;
        let loaded = Manifest::load(&path).await?;

        assert_eq!(loaded, manifest);
        assert_eq!(loaded.entries["b-1"].size_bytes, 12);
        assert_eq!(loaded.backup_for_file("db1_2023-01-01T00:00:00Z"), Some("b-1"));
        // Only the manifest itself, no temp files.
        assert_eq!(std::fs::read_dir(path.parent().unwrap())?.count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ nope")?;
        assert!(Manifest::load(&path).await.is_err());
        Ok(())
    }

    #[test]
    fn test_retain_files_prunes_missing_entries() {
        let mut manifest = Manifest::default();
        manifest.record(
            &backup("b-1", "db1", "2023-01-01T00:00:00Z"),
            "db1_2023-01-01T00:00:00Z",
            &written(1),
        );
        manifest.record(
            &backup("b-2", "db1", "2023-01-02T00:00:00Z"),
            "db1_2023-01-02T00:00:00Z",
            &written(1),
        );

        let present: HashSet<String> = ["db1_2023-01-02T00:00:00Z".to_string()].into();
        let removed = manifest.retain_files(&present);

        assert_eq!(removed, 1);
        assert!(manifest.entries.contains_key("b-2"));
        assert!(!manifest.entries.contains_key("b-1"));
    }
}
