// In-memory provider used by the engine tests.
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;

use crate::errors::{ClerkError, Result};
use crate::remote::{BackupPage, BackupRecord, BackupService, BackupStatus, ByteReader};

pub fn backup(id: &str, database_name: &str, created_at: &str) -> BackupRecord {
    let created_at: DateTime<Utc> = created_at.parse().expect("valid timestamp");
    BackupRecord {
        id: id.to_string(),
        database_name: database_name.to_string(),
        created_at,
        region: "fr-par".to_string(),
        status: BackupStatus::Ready,
        size: Some(42),
        download_url: None,
        download_url_expires_at: None,
    }
}

/// `count` backups of `db1` taken one hour apart from 2023-01-01T00:00:00Z.
pub fn hourly_backups(count: usize) -> Vec<BackupRecord> {
    let base: DateTime<Utc> = "2023-01-01T00:00:00Z".parse().expect("valid timestamp");
    (0..count)
        .map(|i| {
            let created_at = base + chrono::Duration::hours(i as i64);
            backup(
                &format!("b{i}"),
                "db1",
                &created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
        })
        .collect()
}

pub fn download_url(backup_id: &str) -> String {
    format!("https://s3.fr-par.example/exports/{backup_id}")
}

pub fn dump_contents(backup_id: &str) -> Vec<u8> {
    format!("-- dump of {backup_id}\n").into_bytes()
}

#[derive(Default)]
struct FakeState {
    backups: HashMap<String, Vec<BackupRecord>>,
    failing_list_pages: HashSet<u32>,
    pending_polls: HashMap<String, u32>,
    errored_exports: HashSet<String>,
    failing_fetches: HashSet<String>,
    list_calls: Vec<(String, u32)>,
    export_calls: Vec<String>,
    status_calls: Vec<String>,
    fetch_calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeService {
    state: Mutex<FakeState>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backups(self, instance_id: &str, backups: Vec<BackupRecord>) -> Self {
        self.set_backups(instance_id, backups);
        self
    }

    pub fn set_backups(&self, instance_id: &str, backups: Vec<BackupRecord>) {
        self.state
            .lock()
            .unwrap()
            .backups
            .insert(instance_id.to_string(), backups);
    }

    pub fn fail_list_page(&self, page: u32) {
        self.state.lock().unwrap().failing_list_pages.insert(page);
    }

    /// The next `polls` status queries for `backup_id` report no download URL.
    pub fn delay_export(&self, backup_id: &str, polls: u32) {
        self.state
            .lock()
            .unwrap()
            .pending_polls
            .insert(backup_id.to_string(), polls);
    }

    pub fn error_export(&self, backup_id: &str) {
        self.state
            .lock()
            .unwrap()
            .errored_exports
            .insert(backup_id.to_string());
    }

    pub fn fail_fetch(&self, backup_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_fetches
            .insert(download_url(backup_id));
    }

    pub fn list_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().list_calls.clone()
    }

    pub fn export_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().export_calls.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls.len()
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().fetch_calls.clone()
    }

    fn find(state: &FakeState, backup_id: &str) -> Result<BackupRecord> {
        state
            .backups
            .values()
            .flatten()
            .find(|b| b.id == backup_id)
            .cloned()
            .ok_or_else(|| ClerkError::Api {
                status: 404,
                message: format!("backup {backup_id} not found"),
            })
    }
}

impl BackupService for FakeService {
    async fn list_backups(
        &self,
        instance_id: &str,
        _region: &str,
        page: u32,
        page_size: u32,
    ) -> Result<BackupPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls.push((instance_id.to_string(), page));
        if state.failing_list_pages.contains(&page) {
            return Err(ClerkError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        let all = state.backups.get(instance_id).cloned().unwrap_or_default();
        let start = ((page - 1) * page_size) as usize;
        let items = all
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(BackupPage {
            items,
            total_count: all.len() as u64,
        })
    }

    async fn request_export(&self, backup_id: &str, _region: &str) -> Result<BackupRecord> {
        let mut state = self.state.lock().unwrap();
        state.export_calls.push(backup_id.to_string());
        let mut record = Self::find(&state, backup_id)?;
        record.status = BackupStatus::Exporting;
        record.download_url = None;
        Ok(record)
    }

    async fn backup_status(&self, backup_id: &str, _region: &str) -> Result<BackupRecord> {
        let mut state = self.state.lock().unwrap();
        state.status_calls.push(backup_id.to_string());
        let mut record = Self::find(&state, backup_id)?;

        if state.errored_exports.contains(backup_id) {
            record.status = BackupStatus::Error;
            return Ok(record);
        }
        match state.pending_polls.get_mut(backup_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                record.status = BackupStatus::Exporting;
                record.download_url = None;
            }
            _ => {
                record.status = BackupStatus::Ready;
                record.download_url = Some(download_url(backup_id));
            }
        }
        Ok(record)
    }

    async fn fetch(&self, url: &str) -> Result<ByteReader> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls.push(url.to_string());
        if state.failing_fetches.contains(url) {
            return Err(ClerkError::FetchStatus { status: 500 });
        }
        let backup_id = url.rsplit('/').next().unwrap_or_default();
        Ok(Box::new(Cursor::new(dump_contents(backup_id))))
    }
}
