// backupclerk/src/remote/scaleway.rs
use futures_util::TryStreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::io::StreamReader;
use url::Url;

use super::types::{BackupPage, BackupRecord, ListDatabaseBackupsResponse};
use super::{BackupService, ByteReader};
use crate::config::ApiConfig;
use crate::errors::{ClerkError, Result};

const AUTH_HEADER: &str = "X-Auth-Token";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const API_TIMEOUT: Duration = Duration::from_secs(60);
/// Longest silence tolerated between two reads of a response body.
const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for the Scaleway Managed Database (RDB v1) backup endpoints.
#[derive(Clone)]
pub struct ScalewayClient {
    http: Client,
    api_url: Url,
    secret_key: String,
}

impl ScalewayClient {
    pub fn new(api_config: &ApiConfig) -> Result<Self> {
        Self::with_read_timeout(api_config, READ_TIMEOUT)
    }

    fn with_read_timeout(api_config: &ApiConfig, read_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("backupclerk/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(read_timeout)
            .build()?;

        Ok(ScalewayClient {
            http,
            api_url: api_config.api_url.clone(),
            secret_key: api_config.secret_key.clone(),
        })
    }

    /// Builds `{api}/rdb/v1/regions/{region}/backups[/...]`.
    fn backups_url(&self, region: &str, extra: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ClerkError::Config(format!("API URL {} cannot be a base", self.api_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["rdb", "v1", "regions", region, "backups"])
                .extend(extra);
        }
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClerkError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl BackupService for ScalewayClient {
    async fn list_backups(
        &self,
        instance_id: &str,
        region: &str,
        page: u32,
        page_size: u32,
    ) -> Result<BackupPage> {
        let url = self.backups_url(region, &[])?;
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, &self.secret_key)
            .query(&[
                ("instance_id", instance_id.to_string()),
                ("page", page.to_string()),
                ("page_size", page_size.to_string()),
                ("order_by", "created_at_asc".to_string()),
            ])
            .timeout(API_TIMEOUT)
            .send()
            .await?;
        let listing: ListDatabaseBackupsResponse = Self::decode(response).await?;
        Ok(listing.into())
    }

    async fn request_export(&self, backup_id: &str, region: &str) -> Result<BackupRecord> {
        let url = self.backups_url(region, &[backup_id, "export"])?;
        let response = self
            .http
            .post(url)
            .header(AUTH_HEADER, &self.secret_key)
            .json(&serde_json::json!({}))
            .timeout(API_TIMEOUT)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn backup_status(&self, backup_id: &str, region: &str) -> Result<BackupRecord> {
        let url = self.backups_url(region, &[backup_id])?;
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, &self.secret_key)
            .timeout(API_TIMEOUT)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn fetch(&self, url: &str) -> Result<ByteReader> {
        let url = Url::parse(url)?;
        // Presigned object storage URL, no API token. A stalled body is cut
        // off by the client's read timeout.
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClerkError::FetchStatus {
                status: status.as_u16(),
            });
        }

        let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
        Ok(Box::new(StreamReader::new(body)))
    }
}
