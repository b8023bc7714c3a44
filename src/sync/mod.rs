// backupclerk/src/sync/mod.rs
pub(crate) mod logic;

use anyhow::Result;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{InstanceRef, SyncConfig};
use crate::mirror::MirrorStore;
use crate::remote::BackupService;

pub use logic::Reconciler;

/// Totals for one pass over every configured instance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub instances_synced: usize,
    pub instances_skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub cancelled: bool,
}

/// Reconciles every configured instance once.
///
/// Failures stay local to the identifier or instance that caused them;
/// cancellation is honoured between instances.
pub async fn run_pass<S: BackupService>(
    service: &S,
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> PassSummary {
    let pass_id = Uuid::new_v4();
    let span = info_span!("sync_pass", %pass_id);
    async {
        let mut summary = PassSummary::default();
        let store = MirrorStore::new(&config.backup_dir);
        if let Err(err) = store.ensure_root().await {
            warn!(root = %store.root().display(), error = %err, "could not create backup root");
        }
        let reconciler = Reconciler::new(service, &store, config.page_size, config.poll);

        for raw in &config.instances {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let instance = match InstanceRef::parse(raw, config.default_region.as_deref()) {
                Ok(instance) => instance,
                Err(err) => {
                    error!(identifier = %raw, error = %err, "could not get id and region, skipping");
                    summary.instances_skipped += 1;
                    continue;
                }
            };

            match reconciler.reconcile_instance(&instance, cancel).await {
                Ok(report) => {
                    info!(
                        instance = %instance,
                        listed = report.listed,
                        downloaded = report.downloaded,
                        failed = report.failed,
                        deleted = report.deleted,
                        "instance reconciled"
                    );
                    summary.instances_synced += 1;
                    summary.downloaded += report.downloaded;
                    summary.failed += report.failed;
                    summary.deleted += report.deleted;
                    if report.cancelled {
                        summary.cancelled = true;
                        break;
                    }
                }
                Err(err) => {
                    let err = format!("{:#}", err);
                    error!(instance = %instance, error = %err, "skipping instance this cycle");
                    summary.instances_skipped += 1;
                }
            }
        }
        summary
    }
    .instrument(span)
    .await
}

/// Single pass, for the `once` command.
pub async fn run_once<S: BackupService>(
    service: &S,
    config: &SyncConfig,
    cancel: &CancellationToken,
) -> Result<PassSummary> {
    let summary = run_pass(service, config, cancel).await;
    info!(?summary, "pass finished");
    Ok(summary)
}

/// Runs a pass every `config.interval` until `cancel` fires.
pub async fn run_sync_flow<S: BackupService>(
    service: &S,
    config: &SyncConfig,
    cancel: CancellationToken,
) -> Result<()> {
    info!(
        instances = config.instances.len(),
        root = %config.backup_dir.display(),
        "🚀 the clerk is heading to work"
    );
    loop {
        let summary = run_pass(service, config, &cancel).await;
        if summary.cancelled || cancel.is_cancelled() {
            break;
        }
        info!(
            ?summary,
            next_in_secs = config.interval.as_secs(),
            "the clerk is done archiving"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(config.interval) => {}
        }
    }
    info!("the clerk is going home");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::PollPolicy;
    use crate::test_support::{FakeService, hourly_backups};
    use std::path::Path;
    use std::time::Duration;

    fn sync_config(root: &Path, instances: &[&str]) -> SyncConfig {
        SyncConfig {
            backup_dir: root.join("backups"),
            instances: instances.iter().map(|s| s.to_string()).collect(),
            default_region: Some("nl-ams".to_string()),
            interval: Duration::from_secs(3600),
            page_size: 10,
            poll: PollPolicy::default(),
        }
    }

    #[tokio::test]
    async fn test_unparseable_identifier_is_skipped() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let service = FakeService::new()
            .with_backups("abc123", hourly_backups(2))
            .with_backups("12345", hourly_backups(1));
        let config = sync_config(root.path(), &["a/b/c", "fr-par/abc123", "12345"]);

        let summary = run_pass(&service, &config, &CancellationToken::new()).await;

        assert_eq!(summary.instances_skipped, 1);
        assert_eq!(summary.instances_synced, 2);
        assert_eq!(summary.downloaded, 3);
        assert!(root.path().join("backups/fr-par/abc123/db1_2023-01-01T01:00:00Z").is_file());
        assert!(root.path().join("backups/12345/db1_2023-01-01T00:00:00Z").is_file());
        assert!(!root.path().join("backups/a").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_failure_is_isolated_to_its_instance() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let service = FakeService::new()
            .with_backups("big", hourly_backups(12))
            .with_backups("small", hourly_backups(1));
        service.fail_list_page(2);
        let config = sync_config(root.path(), &["fr-par/big", "fr-par/small"]);

        let summary = run_pass(&service, &config, &CancellationToken::new()).await;

        assert_eq!(summary.instances_skipped, 1);
        assert_eq!(summary.instances_synced, 1);
        assert!(root.path().join("backups/fr-par/small/db1_2023-01-01T00:00:00Z").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_pass_stops_between_instances() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let service = FakeService::new().with_backups("abc123", hourly_backups(1));
        let config = sync_config(root.path(), &["fr-par/abc123"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = run_pass(&service, &config, &cancel).await;

        assert!(summary.cancelled);
        assert!(service.list_calls().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_repeats_hourly_until_cancelled() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let service = FakeService::new();
        let config = sync_config(root.path(), &["fr-par/abc123"]);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        let (result, _) = tokio::join!(
            run_sync_flow(&service, &config, cancel),
            async move {
                sleep(Duration::from_secs(2 * 3600 + 60)).await;
                canceller.cancel();
            }
        );

        result?;
        // Passes at 0h, 1h and 2h.
        assert_eq!(service.list_calls().len(), 3);
        Ok(())
    }
}
