use crate::config::require_env;
use crate::error::{EtlError, Result};
use crate::types::DatasetProvider;
use async_trait::async_trait;
use tracing::info;

const DEFAULT_API_URL: &str = "https://www.kaggle.com/api/v1";

/// Dataset download client. Credentials come from the environment:
/// - KAGGLE_USERNAME
/// - KAGGLE_KEY
/// - KAGGLE_API_URL (optional override)
pub struct KaggleProvider {
    client: reqwest::Client,
    base_url: String,
    username: String,
    key: String,
}

impl KaggleProvider {
    pub fn from_env() -> Result<Self> {
        let username = require_env("KAGGLE_USERNAME")?;
        let key = require_env("KAGGLE_KEY")?;
        let base_url = std::env::var("KAGGLE_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Ok(Self { client: reqwest::Client::new(), base_url, username, key })
    }
}

#[async_trait]
impl DatasetProvider for KaggleProvider {
    async fn fetch_dataset(&self, slug: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/datasets/download/{}",
            self.base_url.trim_end_matches('/'),
            slug
        );
        info!("downloading dataset {}", slug);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.key))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EtlError::Api {
                message: format!("dataset download failed for {slug}: {}", response.status()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
