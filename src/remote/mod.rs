// backupclerk/src/remote/mod.rs
pub(crate) mod scaleway;
pub(crate) mod types;

use tokio::io::AsyncRead;

use crate::errors::Result;

pub use scaleway::ScalewayClient;
pub use types::{BackupPage, BackupRecord, BackupStatus};

/// Streaming body of an exported backup.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// The provider's backup API as seen by the sync engine.
pub trait BackupService {
    async fn list_backups(
        &self,
        instance_id: &str,
        region: &str,
        page: u32,
        page_size: u32,
    ) -> Result<BackupPage>;

    /// Asks the provider to prepare a backup for download. The returned
    /// record usually has no download URL yet.
    async fn request_export(&self, backup_id: &str, region: &str) -> Result<BackupRecord>;

    async fn backup_status(&self, backup_id: &str, region: &str) -> Result<BackupRecord>;

    /// Opens a byte stream on a download URL. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<ByteReader>;
}
