use crate::config::require_env;
use crate::error::{EtlError, Result};
use crate::types::{QueryResultPage, QueryService, QueryState, TableDef};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Interactive query service adapter. Config via env:
/// - QUERY_ENDPOINT
/// - QUERY_REGION
pub struct HttpQueryService {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    database: String,
}

#[derive(Deserialize)]
struct StartResponse {
    execution_id: String,
}

#[derive(Deserialize)]
struct StateResponse {
    state: String,
}

#[derive(Deserialize)]
struct PageResponse {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    next_token: Option<String>,
}

impl HttpQueryService {
    pub fn from_env(database: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: require_env("QUERY_ENDPOINT")?.trim_end_matches('/').to_string(),
            region: require_env("QUERY_REGION")?,
            database: database.to_string(),
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.database, table)
    }

    async fn check(&self, response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Query { message: format!("{action} failed: {status} - {body}") });
        }
        Ok(response)
    }
}

#[async_trait]
impl QueryService for HttpQueryService {
    async fn register_table(&self, table: &TableDef) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v1/tables", self.endpoint))
            .header("x-region", &self.region)
            .json(&json!({
                "database": self.database,
                "if_not_exists": true,
                "table": table,
            }))
            .send()
            .await?;
        self.check(response, &format!("registering table {}", table.name)).await?;
        Ok(())
    }

    async fn refresh_partitions(&self, table: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v1/tables/{}/refresh", self.endpoint, self.qualified(table)))
            .header("x-region", &self.region)
            .send()
            .await?;
        self.check(response, &format!("refreshing table {table}")).await?;
        Ok(())
    }

    async fn replace_table(&self, table: &TableDef) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/v1/tables/{}", self.endpoint, self.qualified(&table.name)))
            .header("x-region", &self.region)
            .json(&json!({
                "database": self.database,
                "table": table,
            }))
            .send()
            .await?;
        self.check(response, &format!("replacing table {}", table.name)).await?;
        Ok(())
    }

    async fn start_query(&self, sql: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/queries", self.endpoint))
            .header("x-region", &self.region)
            .json(&json!({ "database": self.database, "sql": sql }))
            .send()
            .await?;
        let response = self.check(response, "starting query").await?;
        let started: StartResponse = response.json().await?;
        Ok(started.execution_id)
    }

    async fn query_state(&self, execution_id: &str) -> Result<QueryState> {
        let response = self
            .client
            .get(format!("{}/v1/queries/{}", self.endpoint, execution_id))
            .header("x-region", &self.region)
            .send()
            .await?;
        let response = self.check(response, "polling query state").await?;
        let state: StateResponse = response.json().await?;
        match state.state.to_uppercase().as_str() {
            "QUEUED" => Ok(QueryState::Queued),
            "RUNNING" => Ok(QueryState::Running),
            "SUCCEEDED" => Ok(QueryState::Succeeded),
            "FAILED" => Ok(QueryState::Failed),
            "CANCELLED" => Ok(QueryState::Cancelled),
            other => Err(EtlError::Query { message: format!("unknown query state: {other}") }),
        }
    }

    async fn result_page(
        &self,
        execution_id: &str,
        page_token: Option<String>,
    ) -> Result<QueryResultPage> {
        let mut request = self
            .client
            .get(format!("{}/v1/queries/{}/results", self.endpoint, execution_id))
            .header("x-region", &self.region);
        if let Some(token) = &page_token {
            request = request.query(&[("page_token", token)]);
        }
        let response = self.check(request.send().await?, "fetching query results").await?;
        let page: PageResponse = response.json().await?;
        Ok(QueryResultPage {
            columns: page.columns,
            rows: page.rows,
            next_token: page.next_token,
        })
    }
}
