// backupclerk/src/export/mod.rs
pub(crate) mod poller;

use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{ClerkError, Result};
use crate::mirror::{MirrorStore, WrittenFile};
use crate::remote::{BackupRecord, BackupService};

pub use poller::wait_for_download_url;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// One hour of status checks at the default interval.
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 360;

/// How long and how often to wait for an export to become downloadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each pending check; 1 keeps it fixed.
    pub backoff_factor: u32,
    /// Status checks allowed before giving up; `None` waits forever.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: DEFAULT_POLL_INTERVAL,
            max_interval: DEFAULT_POLL_INTERVAL,
            backoff_factor: 1,
            max_attempts: Some(DEFAULT_POLL_MAX_ATTEMPTS),
        }
    }
}

impl PollPolicy {
    /// Delay to sleep after the `checks`-th pending status check (1-based).
    pub fn delay_after(&self, checks: u32) -> Duration {
        let exponent = checks.saturating_sub(1);
        let multiplier = self.backoff_factor.max(1).saturating_pow(exponent);
        self.interval
            .saturating_mul(multiplier)
            .min(self.max_interval.max(self.interval))
    }
}

/// Exports `backup`, waits for it, and streams it into `dir/file_name`.
pub async fn download_backup<S: BackupService>(
    service: &S,
    store: &MirrorStore,
    dir: &Path,
    backup: &BackupRecord,
    file_name: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<WrittenFile> {
    info!(
        backup_id = %backup.id,
        file = %file_name,
        expected_bytes = backup.size,
        "archiving backup"
    );
    let url = wait_for_download_url(service, backup, policy, cancel).await?;

    let mut body = service.fetch(&url).await?;
    tokio::select! {
        written = store.write_atomically(dir, file_name, &mut body) => written,
        _ = cancel.cancelled() => Err(ClerkError::Cancelled(format!(
            "download of backup {} interrupted",
            backup.id
        ))),
    }
}
