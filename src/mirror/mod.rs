// backupclerk/src/mirror/mod.rs
pub(crate) mod manifest;

use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::InstanceRef;
use crate::errors::{ClerkError, Result};
use crate::remote::BackupRecord;

pub use manifest::Manifest;

/// Prefix of in-progress downloads. Leftovers match no backup name and are
/// swept by the next deletion pass.
pub const PARTIAL_PREFIX: &str = ".partial-";
const MANIFEST_DIR: &str = ".manifests";
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Deterministic local name of a backup: `<database>_<RFC3339 creation time>`.
///
/// Two backups of the same database created in the same second map to the
/// same name.
pub fn backup_file_name(backup: &BackupRecord) -> String {
    format!(
        "{}_{}",
        backup.database_name.replace('/', "_"),
        backup.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// On-disk mirror: `<root>/<instance as configured>/<backup file>`.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MirrorStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn instance_dir(&self, instance: &InstanceRef) -> PathBuf {
        self.root.join(&instance.raw)
    }

    pub fn manifest_path(&self, instance: &InstanceRef) -> PathBuf {
        self.root
            .join(MANIFEST_DIR)
            .join(format!("{}.json", instance.raw.replace('/', "__")))
    }

    pub async fn ensure_root(&self) -> Result<()> {
        create_private_dir(&self.root).await
    }

    pub async fn ensure_instance_dir(&self, instance: &InstanceRef) -> Result<PathBuf> {
        let dir = self.instance_dir(instance);
        create_private_dir(&dir).await?;
        Ok(dir)
    }

    /// Whether `dir/file_name` exists. An error while checking counts as
    /// present so that nothing is re-downloaded on uncertainty.
    pub async fn contains(&self, dir: &Path, file_name: &str) -> bool {
        let path = dir.join(file_name);
        match tokio::fs::try_exists(&path).await {
            Ok(exists) => exists,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not check local backup, assuming present");
                true
            }
        }
    }

    /// Files directly inside `dir`; subdirectories are skipped.
    pub fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => {}
                Ok(entry) => files.push(entry.into_path()),
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "could not read local backup entry");
                }
            }
        }
        files
    }

    pub async fn remove(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    /// Streams `reader` into `dir/file_name`.
    ///
    /// Bytes land in a hidden temp file next to the target, which is synced
    /// and renamed into place only once the stream ended cleanly. On error,
    /// or if this future is dropped, the temp file is removed and the final
    /// name is never created.
    pub async fn write_atomically<R>(
        &self,
        dir: &Path,
        file_name: &str,
        reader: &mut R,
    ) -> Result<WrittenFile>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let final_path = dir.join(file_name);
        let partial = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(dir)?;
        let mut file = tokio::fs::File::from_std(partial.as_file().try_clone()?);

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut bytes: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            bytes += n as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        partial
            .persist(&final_path)
            .map_err(|e| ClerkError::Io(e.error))?;

        Ok(WrittenFile {
            path: final_path,
            bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

async fn create_private_dir(path: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(path).await?;
    Ok(())
}
