// backupclerk/src/catalog/mod.rs
use anyhow::{Context, Result};
use tracing::debug;

use crate::config::InstanceRef;
use crate::remote::{BackupRecord, BackupService};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Lists every backup the provider knows for `instance`, across all pages.
///
/// A failing page abandons the whole listing: callers must never act on a
/// partial view, since the deletion pass would remove files for backups that
/// simply were not fetched.
///
/// The total reported by the provider is taken from each fresh response and
/// is not cross-checked between pages.
pub async fn enumerate_backups<S: BackupService>(
    service: &S,
    instance: &InstanceRef,
    page_size: u32,
) -> Result<Vec<BackupRecord>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut backups = Vec::new();
    let mut pages_fetched: u32 = 0;
    let mut total_count = u64::MAX;

    while u64::from(pages_fetched) * u64::from(page_size) < total_count {
        let page = pages_fetched + 1;
        let listing = service
            .list_backups(&instance.id, &instance.region, page, page_size)
            .await
            .with_context(|| format!("Failed to list page {} of backups for {}", page, instance))?;

        debug!(
            instance = %instance,
            page,
            items = listing.items.len(),
            total_count = listing.total_count,
            "fetched backup page"
        );
        backups.extend(listing.items);
        total_count = listing.total_count;
        pages_fetched = page;
    }

    Ok(backups)
}
