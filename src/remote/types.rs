// backupclerk/src/remote/types.rs
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Lifecycle states reported by the provider for a database backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Creating,
    Ready,
    Restoring,
    Deleting,
    Error,
    Exporting,
    Locked,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Provider-side metadata describing one point-in-time backup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub database_name: String,
    pub created_at: DateTime<Utc>,
    pub region: String,
    #[serde(default)]
    pub status: BackupStatus,
    #[serde(default)]
    pub size: Option<u64>,
    /// Present only once an export has completed.
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub download_url_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPage {
    pub items: Vec<BackupRecord>,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListDatabaseBackupsResponse {
    #[serde(default)]
    pub database_backups: Vec<BackupRecord>,
    pub total_count: u64,
}

impl From<ListDatabaseBackupsResponse> for BackupPage {
    fn from(response: ListDatabaseBackupsResponse) -> Self {
        BackupPage {
            items: response.database_backups,
            total_count: response.total_count,
        }
    }
}
