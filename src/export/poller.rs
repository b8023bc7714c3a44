// backupclerk/src/export/poller.rs
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PollPolicy;
use crate::errors::{ClerkError, Result};
use crate::remote::{BackupRecord, BackupService, BackupStatus};

/// Requests an export of `backup` and polls its status until the provider
/// hands out a download URL.
///
/// Fails when the provider reports an error state, when the status-check
/// budget of `policy` runs out, or when `cancel` fires during a wait.
pub async fn wait_for_download_url<S: BackupService>(
    service: &S,
    backup: &BackupRecord,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    let exported = service.request_export(&backup.id, &backup.region).await?;
    if let Some(url) = exported.download_url {
        return Ok(url);
    }

    let mut checks: u32 = 0;
    loop {
        let current = service
            .backup_status(&exported.id, &exported.region)
            .await?;
        checks += 1;

        if let Some(url) = current.download_url {
            info!(
                backup_id = %backup.id,
                checks,
                expires_at = ?current.download_url_expires_at,
                "export ready"
            );
            return Ok(url);
        }
        if current.status == BackupStatus::Error {
            return Err(ClerkError::Export {
                backup_id: backup.id.clone(),
                message: "provider reported the backup in error state".to_string(),
            });
        }
        if policy.max_attempts.is_some_and(|max| checks >= max) {
            return Err(ClerkError::ExportTimeout {
                backup_id: backup.id.clone(),
                attempts: checks,
            });
        }

        let delay = policy.delay_after(checks);
        debug!(
            backup_id = %backup.id,
            status = ?current.status,
            delay_secs = delay.as_secs(),
            "backup not ready, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ClerkError::Cancelled(format!(
                    "stopped waiting for export of backup {}",
                    backup.id
                )));
            }
            _ = sleep(delay) => {}
        }
    }
}
