use crate::config::require_env;
use crate::error::{EtlError, Result};
use crate::types::{Extract, ExtractPublisher, PublishOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// BI server publishing client. Config via env:
/// - BI_SERVER_URL
/// - BI_USER
/// - BI_PASSWORD
/// - BI_SITE
pub struct HttpExtractPublisher {
    client: reqwest::Client,
    server_url: String,
    user: String,
    password: String,
    site: String,
}

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
}

#[derive(Deserialize)]
struct ProjectItem {
    id: String,
    name: String,
}

impl HttpExtractPublisher {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            server_url: require_env("BI_SERVER_URL")?.trim_end_matches('/').to_string(),
            user: require_env("BI_USER")?,
            password: require_env("BI_PASSWORD")?,
            site: require_env("BI_SITE")?,
        })
    }

    async fn sign_in(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/auth/signin", self.server_url))
            .json(&json!({
                "user": self.user,
                "password": self.password,
                "site": self.site,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Publish(format!("BI sign-in failed: {status}")));
        }
        let signed: SignInResponse = response.json().await?;
        Ok(signed.token)
    }

    async fn find_project(&self, token: &str, name: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/api/projects", self.server_url))
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Publish(format!("listing BI projects failed: {status}")));
        }
        let projects: Vec<ProjectItem> = response.json().await?;
        Ok(projects.into_iter().find(|p| p.name == name).map(|p| p.id))
    }

    /// The extract wire format is one text-typed column per source column,
    /// no type-specific encoding.
    fn encode_extract(extract: &Extract) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&extract.columns)?;
        for row in &extract.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| EtlError::Publish(format!("encoding extract failed: {e}")))
    }
}

#[async_trait]
impl ExtractPublisher for HttpExtractPublisher {
    async fn publish(
        &self,
        project: &str,
        name: &str,
        extract: &Extract,
    ) -> Result<PublishOutcome> {
        let token = self.sign_in().await?;
        let project_id = match self.find_project(&token, project).await? {
            Some(id) => id,
            None => return Ok(PublishOutcome::ProjectNotFound),
        };

        let body = Self::encode_extract(extract)?;
        let response = self
            .client
            .post(format!("{}/api/projects/{}/datasources", self.server_url, project_id))
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .query(&[("name", name), ("overwrite", "true")])
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Publish(format!(
                "publishing extract {name} failed: {status} - {body}"
            )));
        }
        info!("published extract {} to project {}", name, project);
        Ok(PublishOutcome::Published)
    }
}
