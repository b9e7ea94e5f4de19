use crate::config::require_env;
use crate::error::{EtlError, Result};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, warn};

/// Object store adapter for a bucket HTTP API. Config via env:
/// - STORE_ENDPOINT (e.g. https://storage.example.com)
/// - STORE_BUCKET
/// - STORE_TOKEN (bearer token)
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: String,
}

impl HttpObjectStore {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: require_env("STORE_ENDPOINT")?.trim_end_matches('/').to_string(),
            bucket: require_env("STORE_BUCKET")?,
            token: require_env("STORE_TOKEN")?,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/object/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("upsert", "true")])
            .body(bytes.to_vec())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Storage(format!("upload of {key} failed: {status} - {body}")));
        }
        debug!("uploaded {} bytes to {}", bytes.len(), key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Storage(format!("cannot read {key}: {status}")));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .post(format!("{}/list/{}", self.endpoint, self.bucket))
            .bearer_auth(&self.token)
            .json(&json!({ "prefix": prefix }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Storage(format!("list of {prefix} failed: {status}")));
        }
        let mut keys: Vec<String> = response.json().await?;
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(EtlError::Storage(format!("delete of {key} failed: {status}")));
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        for key in self.list(prefix).await? {
            self.delete(&key).await?;
        }
        Ok(())
    }

    // The bucket API offers no server-side rename, so promotion is a
    // copy-then-delete sweep. The window where live holds a partial mix is
    // small but real; the fs backend is the one with the atomic swap.
    async fn promote(&self, run_prefix: &str, live_prefix: &str) -> Result<()> {
        let run = run_prefix.trim_end_matches('/');
        let live = live_prefix.trim_end_matches('/');
        let keys = self.list(run).await?;
        if keys.is_empty() {
            return Err(EtlError::Storage(format!(
                "run prefix {run_prefix} does not exist, nothing to promote"
            )));
        }
        warn!("promoting {} object(s) {} -> {} (copy, not atomic)", keys.len(), run, live);
        self.delete_prefix(live).await?;
        for key in &keys {
            let suffix = &key[run.len()..];
            let bytes = self.get(key).await?;
            self.put(&format!("{live}{suffix}"), &bytes).await?;
        }
        self.delete_prefix(run).await
    }

    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .query(&[("upsert", "false")])
            .body(bytes.to_vec())
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Ok(false);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Storage(format!("upload of {key} failed: {status} - {body}")));
        }
        Ok(true)
    }
}
