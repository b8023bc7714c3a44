// backupclerk/src/sync/logic.rs
use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::enumerate_backups;
use crate::config::InstanceRef;
use crate::export::{PollPolicy, download_backup};
use crate::mirror::{Manifest, MirrorStore, backup_file_name};
use crate::remote::BackupService;

/// Outcome of one reconciliation of one instance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub listed: usize,
    pub already_present: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    pub collisions: usize,
    pub cancelled: bool,
}

/// Aligns local mirror directories with the provider's backup catalog.
pub struct Reconciler<'a, S> {
    service: &'a S,
    store: &'a MirrorStore,
    page_size: u32,
    poll: PollPolicy,
}

impl<'a, S: BackupService> Reconciler<'a, S> {
    pub fn new(service: &'a S, store: &'a MirrorStore, page_size: u32, poll: PollPolicy) -> Self {
        Reconciler {
            service,
            store,
            page_size,
            poll,
        }
    }

    /// Downloads every listed backup missing locally, then deletes local
    /// files that match no listed backup.
    ///
    /// Returns `Err` only when the directory cannot be prepared or the
    /// listing fails; in both cases nothing is deleted. Individual download
    /// and delete failures are logged and counted in the report.
    pub async fn reconcile_instance(
        &self,
        instance: &InstanceRef,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport> {
        let dir = self
            .store
            .ensure_instance_dir(instance)
            .await
            .with_context(|| format!("Failed to create backup directory for {}", instance))?;

        let backups = enumerate_backups(self.service, instance, self.page_size).await?;
        let mut report = ReconcileReport {
            listed: backups.len(),
            ..ReconcileReport::default()
        };

        let manifest_path = self.store.manifest_path(instance);
        let mut manifest = match Manifest::load(&manifest_path).await {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(instance = %instance, error = %err, "manifest unreadable, starting a new one");
                Manifest::default()
            }
        };

        let mut expected: HashSet<String> = HashSet::with_capacity(backups.len());
        for backup in &backups {
            let file_name = backup_file_name(backup);
            if !expected.insert(file_name.clone()) {
                report.collisions += 1;
                warn!(
                    instance = %instance,
                    backup_id = %backup.id,
                    file = %file_name,
                    "another backup already maps to this file name, skipping"
                );
                continue;
            }
            if report.cancelled {
                continue;
            }
            if self.store.contains(&dir, &file_name).await {
                report.already_present += 1;
                continue;
            }
            if cancel.is_cancelled() {
                info!(instance = %instance, "shutdown requested, no further downloads this pass");
                report.cancelled = true;
                continue;
            }

            match download_backup(
                self.service,
                self.store,
                &dir,
                backup,
                &file_name,
                &self.poll,
                cancel,
            )
            .await
            {
                Ok(written) => {
                    info!(
                        instance = %instance,
                        path = %written.path.display(),
                        bytes = written.bytes,
                        "✅ backup archived"
                    );
                    manifest.record(backup, &file_name, &written);
                    report.downloaded += 1;
                }
                Err(err) if err.is_cancelled() => {
                    info!(instance = %instance, "shutdown requested, no further downloads this pass");
                    report.cancelled = true;
                }
                Err(err) => {
                    error!(
                        instance = %instance,
                        backup_id = %backup.id,
                        file = %file_name,
                        error = %err,
                        "unexpected error while archiving backup"
                    );
                    report.failed += 1;
                }
            }
        }

        for path in self.store.list_files(&dir) {
            let Some(name) = path.file_name() else {
                continue;
            };
            if name.to_str().is_some_and(|name| expected.contains(name)) {
                continue;
            }
            let name = name.to_string_lossy();
            match self.store.remove(&path).await {
                Ok(()) => {
                    info!(
                        instance = %instance,
                        file = %name,
                        backup_id = manifest.backup_for_file(&name).unwrap_or("unknown"),
                        "deleted backup no longer known remotely"
                    );
                    report.deleted += 1;
                }
                Err(err) => {
                    error!(instance = %instance, file = %name, error = %err, "could not delete local backup");
                    report.delete_failed += 1;
                }
            }
        }

        manifest.retain_files(&expected);
        if let Err(err) = manifest.save(&manifest_path).await {
            warn!(instance = %instance, error = %err, "could not save manifest");
        }

        Ok(report)
    }
}
